//! Round loop: refresh config, pick targets, dispatch one instance per
//! target onto the worker pool, once per attack period.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{error, info, instrument, warn};

use crate::core::budget::{max_useful_attack_period, per_instance_deadline};
use crate::core::partition::{TargetMode, select_targets};
use crate::core::types::{InstanceStats, Roster, targets_from_roster};
use crate::delivery::POST_PERIOD;
use crate::farm::Farm;
use crate::io::config::{ConfigCache, ConfigProvider, RoundConfig};
use crate::pool::WorkerPool;
use crate::supervisor::{InstanceTask, run_instance};
use crate::ticker::Ticker;

/// Team names listed in the per-round log line before eliding the rest.
pub const PRINTED_TEAM_NAMES: usize = 5;

/// Process-level settings for one farm client run.
#[derive(Debug, Clone, PartialEq)]
pub struct FarmSettings {
    /// Absolute path of the sploit executable.
    pub sploit: PathBuf,
    /// Maximum number of concurrently running instances.
    pub pool_size: usize,
    /// Time between the starts of two rounds.
    pub attack_period: Duration,
    /// Output and flags are shown for rounds `1..=verbose_attacks`.
    pub verbose_attacks: u64,
    pub mode: TargetMode,
}

impl FarmSettings {
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(anyhow!("pool size must be > 0"));
        }
        if self.attack_period.is_zero() {
            return Err(anyhow!("attack period must be > 0"));
        }
        Ok(())
    }

    pub fn is_verbose(&self, round: u64) -> bool {
        round <= self.verbose_attacks
    }
}

/// Totals of a round loop that stopped without a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackSummary {
    pub rounds: u64,
    pub stats: InstanceStats,
}

/// Run rounds until shutdown.
///
/// Returns the first fatal error recorded on `farm` (first-round config or
/// launch failure, delivery loop crash). The worker pool is drained before
/// returning, so no instance outlives this call.
#[instrument(skip_all, fields(sploit = %settings.sploit.display(), pool_size = settings.pool_size))]
pub fn run_attacks<P: ConfigProvider>(
    farm: &Arc<Farm>,
    provider: &P,
    settings: &FarmSettings,
) -> Result<AttackSummary> {
    settings.validate()?;
    let pool = WorkerPool::new(settings.pool_size)?;
    let executable = Arc::new(settings.sploit.clone());
    let mut cache = ConfigCache::new();
    let mut rounds = 0;

    for round in Ticker::new(settings.attack_period, farm.signal()) {
        let config = match cache.refresh(provider) {
            Ok(config) => config,
            Err(err) => {
                // Only the first round has no previous config to fall back to.
                farm.fail(anyhow!(err).context("get config in the first attack"));
                break;
            }
        };

        let teams = select_targets(&config.teams, settings.mode);
        if teams.is_empty() {
            error!(
                "there are no teams to attack for this farm client, fix the TEAMS value \
                 in your server config or the usage of --distribute"
            );
            if round == 1 {
                farm.fail(anyhow!("no teams to attack in the first attack"));
                break;
            }
            continue;
        }
        if settings.is_verbose(round) {
            log_teams(&teams);
        }

        let Some(deadline) =
            per_instance_deadline(settings.attack_period, teams.len(), settings.pool_size)
        else {
            continue;
        };
        // Instances of earlier rounds still waiting for a worker.
        info!(round, queued = pool.queued(), "launching an attack");
        log_time_limit(farm, settings, &config, deadline, round);

        for target in targets_from_roster(&teams) {
            let task = InstanceTask {
                executable: Arc::clone(&executable),
                target,
                round,
                deadline,
                flag_format: config.flag_format.clone(),
                verbose: settings.is_verbose(round),
            };
            let farm = Arc::clone(farm);
            pool.submit(move || {
                run_instance(&farm, &task);
            })?;
        }
        rounds += 1;
    }

    pool.join();
    match farm.take_failure() {
        Some(err) => Err(err),
        None => Ok(AttackSummary {
            rounds,
            stats: farm.instances.stats(),
        }),
    }
}

fn log_teams(teams: &Roster) {
    let mut names: Vec<&str> = teams.keys().map(String::as_str).collect();
    if names.len() > PRINTED_TEAM_NAMES {
        names.truncate(PRINTED_TEAM_NAMES);
        names.push("...");
    }
    info!(count = teams.len(), teams = %names.join(", "), "sploit will be run on teams");
}

/// Longest attack period that still catches each round's flags, when the
/// configured one exceeds it.
pub fn attack_period_warning(attack_period: Duration, config: &RoundConfig) -> Option<Duration> {
    let limit = max_useful_attack_period(config.flag_lifetime, config.submit_period, POST_PERIOD);
    (attack_period >= limit).then_some(limit)
}

fn log_time_limit(
    farm: &Farm,
    settings: &FarmSettings,
    config: &RoundConfig,
    deadline: Duration,
    round: u64,
) {
    if round == 1
        && let Some(limit) = attack_period_warning(settings.attack_period, config)
    {
        warn!(
            "--attack-period should be < {:.1} sec, otherwise the sploit will not have time \
             to catch flags for each round before their expiration",
            limit.as_secs_f64()
        );
    }

    info!(
        "time limit for a sploit instance: {:.1} sec",
        deadline.as_secs_f64()
    );
    if let Some(percent) = farm.instances.stats().killed_percent() {
        info!("total {percent:.1}% of instances ran out of time");
    }
}
