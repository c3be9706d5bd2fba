//! HTTP client for the farm server API.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use tracing::{debug, instrument};

use crate::core::types::FlagRecord;
use crate::io::collector::{Collector, DeliveryError, post_payload};
use crate::io::config::{ConfigError, ConfigProvider, RoundConfig, parse_round_config};

/// Upper bound for every request to the farm server.
pub const SERVER_TIMEOUT: Duration = Duration::from_secs(5);

/// Farm server endpoints for one sploit.
#[derive(Debug, Clone)]
pub struct FarmServer {
    client: Client,
    config_url: Url,
    post_url: Url,
    sploit_name: String,
}

impl FarmServer {
    /// `sploit_name` is sent along with every flag as the submitter id.
    pub fn new(server_url: &str, sploit_name: impl Into<String>) -> Result<Self> {
        let base =
            Url::parse(server_url).with_context(|| format!("parse server url {server_url}"))?;
        let config_url = base.join("/api/get_config").context("build config url")?;
        let post_url = base.join("/api/post_flags").context("build post url")?;
        let client = Client::builder()
            .timeout(SERVER_TIMEOUT)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            config_url,
            post_url,
            sploit_name: sploit_name.into(),
        })
    }

    pub fn sploit_name(&self) -> &str {
        &self.sploit_name
    }
}

/// Non-200 responses carry the server's explanation in the body.
fn unexpected_status(response: Response) -> (u16, String) {
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    (status, body)
}

impl ConfigProvider for FarmServer {
    #[instrument(skip_all, fields(url = %self.config_url))]
    fn get_config(&self) -> Result<RoundConfig, ConfigError> {
        let response = self.client.get(self.config_url.clone()).send()?;
        if response.status() != reqwest::StatusCode::OK {
            let (status, body) = unexpected_status(response);
            return Err(ConfigError::Status { status, body });
        }
        let body = response.bytes()?;
        let config = parse_round_config(&body)?;
        debug!(teams = config.teams.len(), "fetched config");
        Ok(config)
    }
}

impl Collector for FarmServer {
    #[instrument(skip_all, fields(url = %self.post_url, flags = batch.len()))]
    fn deliver(&self, batch: &[FlagRecord]) -> Result<(), DeliveryError> {
        let payload = post_payload(batch, &self.sploit_name);
        let response = self.client.post(self.post_url.clone()).json(&payload).send()?;
        if response.status() != reqwest::StatusCode::OK {
            let (status, body) = unexpected_status(response);
            return Err(DeliveryError::Status { status, body });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubServer;

    #[test]
    fn endpoints_replace_base_path() {
        let server = FarmServer::new("http://farm.example:5000/ui/", "x").expect("server");
        assert_eq!(server.config_url.as_str(), "http://farm.example:5000/api/get_config");
        assert_eq!(server.post_url.as_str(), "http://farm.example:5000/api/post_flags");
    }

    #[test]
    fn rejects_unparseable_url() {
        assert!(FarmServer::new("not a url", "x").is_err());
    }

    #[test]
    fn fetches_config_over_http() {
        let stub = StubServer::respond(
            200,
            concat!(
                r#"{"FLAG_FORMAT": "F\\w+", "FLAG_LIFETIME": 60, "SUBMIT_PERIOD": 2, "#,
                r#""TEAMS": {"alpha": "10.0.0.1"}}"#,
            ),
        );
        let server = FarmServer::new(&stub.url(), "sploit.py").expect("server");

        let config = server.get_config().expect("config");
        assert_eq!(config.teams.len(), 1);

        let request = stub.finish();
        assert!(request.starts_with("GET /api/get_config "), "{request}");
    }

    #[test]
    fn config_error_status_keeps_body() {
        let stub = StubServer::respond(500, "maintenance");
        let server = FarmServer::new(&stub.url(), "sploit.py").expect("server");

        let err = server.get_config().unwrap_err();
        match err {
            ConfigError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected error: {other}"),
        }
        stub.finish();
    }

    #[test]
    fn posts_flags_as_json() {
        let stub = StubServer::respond(200, "");
        let server = FarmServer::new(&stub.url(), "sploit.py").expect("server");

        server
            .deliver(&[FlagRecord::new("AAA=", "alpha")])
            .expect("deliver");

        let request = stub.finish();
        assert!(request.starts_with("POST /api/post_flags "), "{request}");
        assert!(
            request.ends_with(r#"[{"flag":"AAA=","sploit":"sploit.py","team":"alpha"}]"#),
            "{request}"
        );
    }

    #[test]
    fn rejected_delivery_is_an_error() {
        let stub = StubServer::respond(403, "bad team");
        let server = FarmServer::new(&stub.url(), "sploit.py").expect("server");

        let err = server.deliver(&[FlagRecord::new("AAA=", "alpha")]).unwrap_err();
        assert!(matches!(err, DeliveryError::Status { status: 403, .. }), "{err}");
        stub.finish();
    }
}
