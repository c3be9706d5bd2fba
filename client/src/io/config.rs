//! Round configuration announced by the farm server.
//!
//! The server owns the team roster, the flag format and the flag timing. The
//! client refetches it every round through a [`ConfigProvider`]; tests use
//! scripted providers that never touch the network.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::core::flags::FlagFormat;
use crate::core::types::Roster;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("request to farm server failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("farm server answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid flag format {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid {field} {value}")]
    Timing { field: &'static str, value: f64 },
}

/// Raw `/api/get_config` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(rename = "FLAG_FORMAT")]
    pub flag_format: String,
    #[serde(rename = "FLAG_LIFETIME")]
    pub flag_lifetime_secs: f64,
    #[serde(rename = "SUBMIT_PERIOD")]
    pub submit_period_secs: f64,
    #[serde(rename = "TEAMS")]
    pub teams: Roster,
}

/// Validated configuration for one round.
#[derive(Debug, Clone)]
pub struct RoundConfig {
    pub flag_format: FlagFormat,
    pub flag_lifetime: Duration,
    pub submit_period: Duration,
    pub teams: Roster,
}

impl TryFrom<ServerConfig> for RoundConfig {
    type Error = ConfigError;

    fn try_from(raw: ServerConfig) -> Result<Self, Self::Error> {
        let flag_format =
            FlagFormat::new(&raw.flag_format).map_err(|source| ConfigError::Pattern {
                pattern: raw.flag_format.clone(),
                source,
            })?;
        Ok(Self {
            flag_format,
            flag_lifetime: seconds("FLAG_LIFETIME", raw.flag_lifetime_secs)?,
            submit_period: seconds("SUBMIT_PERIOD", raw.submit_period_secs)?,
            teams: raw.teams,
        })
    }
}

fn seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::Timing { field, value })
}

/// Parse a `/api/get_config` response body.
pub fn parse_round_config(body: &[u8]) -> Result<RoundConfig, ConfigError> {
    let raw: ServerConfig = serde_json::from_slice(body)?;
    RoundConfig::try_from(raw)
}

/// Source of per-round configuration.
pub trait ConfigProvider {
    fn get_config(&self) -> Result<RoundConfig, ConfigError>;
}

/// Last successfully fetched configuration.
///
/// A failed refresh falls back to the whole previous configuration (roster,
/// flag format and timing alike). Only the very first fetch has nothing to
/// fall back to.
#[derive(Debug, Default)]
pub struct ConfigCache {
    current: Option<Arc<RoundConfig>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Arc<RoundConfig>> {
        self.current.as_ref()
    }

    /// Fetch a fresh configuration, or reuse the last one if the fetch fails.
    pub fn refresh<P: ConfigProvider>(
        &mut self,
        provider: &P,
    ) -> Result<Arc<RoundConfig>, ConfigError> {
        match provider.get_config() {
            Ok(config) => {
                let config = Arc::new(config);
                self.current = Some(Arc::clone(&config));
                Ok(config)
            }
            Err(err) => {
                error!(err = %err, "can't get config from the server");
                match &self.current {
                    Some(previous) => {
                        warn!("using the old config");
                        Ok(Arc::clone(previous))
                    }
                    None => Err(err),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedConfigProvider, round_config};

    const BODY: &str = r#"{
        "FLAG_FORMAT": "[A-Z0-9]{31}=",
        "FLAG_LIFETIME": 300,
        "SUBMIT_PERIOD": 2.5,
        "SUBMIT_FLAG_LIMIT": 50,
        "TEAMS": {"Team #1": "10.0.0.1", "Team #2": "10.0.0.2"}
    }"#;

    #[test]
    fn parses_server_payload() {
        let config = parse_round_config(BODY.as_bytes()).expect("parse");
        assert_eq!(config.flag_format.as_str(), "[A-Z0-9]{31}=");
        assert_eq!(config.flag_lifetime, Duration::from_secs(300));
        assert_eq!(config.submit_period, Duration::from_millis(2500));
        assert_eq!(config.teams.len(), 2);
        assert_eq!(
            config.teams.get("Team #2").map(String::as_str),
            Some("10.0.0.2")
        );
    }

    #[test]
    fn rejects_bad_flag_format() {
        let body = BODY.replace("[A-Z0-9]{31}=", "[A-Z");
        let err = parse_round_config(body.as_bytes()).unwrap_err();
        assert!(matches!(err, ConfigError::Pattern { .. }), "{err}");
    }

    #[test]
    fn rejects_negative_timing() {
        let body = BODY.replace("300", "-1");
        let err = parse_round_config(body.as_bytes()).unwrap_err();
        assert!(matches!(err, ConfigError::Timing { field: "FLAG_LIFETIME", .. }), "{err}");
    }

    #[test]
    fn rejects_missing_teams() {
        let err = parse_round_config(br#"{"FLAG_FORMAT": "x"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "{err}");
    }

    #[test]
    fn first_refresh_failure_is_an_error() {
        let provider = ScriptedConfigProvider::new(vec![None]);
        let mut cache = ConfigCache::new();
        assert!(cache.refresh(&provider).is_err());
        assert!(cache.current().is_none());
    }

    #[test]
    fn later_refresh_failure_reuses_previous_config() {
        let first = round_config(r"FLAG\{\w+\}", &[("alpha", "10.0.0.1")]);
        let provider = ScriptedConfigProvider::new(vec![Some(first), None]);
        let mut cache = ConfigCache::new();

        let fresh = cache.refresh(&provider).expect("fresh");
        let stale = cache.refresh(&provider).expect("stale");
        assert!(Arc::ptr_eq(&fresh, &stale));
        assert_eq!(stale.teams.len(), 1);
    }

    #[test]
    fn successful_refresh_replaces_roster_wholesale() {
        let first = round_config("F", &[("alpha", "10.0.0.1"), ("beta", "10.0.0.2")]);
        let second = round_config("G", &[("gamma", "10.0.0.3")]);
        let provider = ScriptedConfigProvider::new(vec![Some(first), Some(second)]);
        let mut cache = ConfigCache::new();

        cache.refresh(&provider).expect("first");
        let config = cache.refresh(&provider).expect("second");
        let names: Vec<&str> = config.teams.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["gamma"]);
        assert_eq!(config.flag_format.as_str(), "G");
    }
}
