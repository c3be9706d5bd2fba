//! `start-sploit`: run a sploit on all teams in a loop.
//!
//! Every `--attack-period` seconds the sploit is started once per team (with
//! the team address as its only argument). Flags it prints are posted to the
//! farm server in the background.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::{error, info, warn};

use farm_client::attack::{FarmSettings, run_attacks};
use farm_client::core::partition::{Distribute, TargetMode};
use farm_client::delivery::{POST_PERIOD, flush, spawn_post_loop};
use farm_client::exit_codes;
use farm_client::farm::Farm;
use farm_client::io::server::FarmServer;
use farm_client::io::sploit::check_sploit;
use farm_client::logging;

const DEFAULT_SERVER_URL: &str = "http://farm.kolambda.com:5000";

#[derive(Debug, Parser)]
#[command(
    name = "start-sploit",
    version,
    about = "Run a sploit on all teams in a loop"
)]
struct Cli {
    /// Sploit executable.
    sploit: PathBuf,

    /// Farm server URL.
    #[arg(long, default_value = DEFAULT_SERVER_URL)]
    server_url: String,

    /// Maximal number of concurrent sploit instances (too little will make time limits for
    /// sploits smaller, too big will eat all RAM on your computer).
    #[arg(long, default_value_t = 50)]
    pool_size: usize,

    /// Rerun the sploit on all teams each N seconds (too little will make time limits for
    /// sploits smaller, too big will miss flags from some rounds).
    #[arg(long, default_value_t = 120.0)]
    attack_period: f64,

    /// Sploits' outputs and found flags will be shown for the N first attacks.
    #[arg(short = 'v', long, default_value_t = 1)]
    verbose_attacks: u64,

    /// Run a single instance of the sploit instead of an instance per team.
    #[arg(long, conflicts_with = "distribute")]
    not_per_team: bool,

    /// Divide the team list to N parts (by address hash modulo N) and run the sploits only on
    /// Kth part of it (K >= 1).
    #[arg(long, value_name = "K/N")]
    distribute: Option<Distribute>,
}

impl Cli {
    fn settings(&self) -> Result<FarmSettings> {
        let attack_period = Duration::try_from_secs_f64(self.attack_period)
            .map_err(|_| anyhow!("invalid --attack-period {}", self.attack_period))?;
        let mode = match (self.not_per_team, self.distribute) {
            (true, _) => TargetMode::Shared,
            (false, Some(distribute)) => TargetMode::Distributed(distribute),
            (false, None) => TargetMode::PerTeam,
        };
        let sploit = std::path::absolute(&self.sploit)
            .with_context(|| format!("resolve {}", self.sploit.display()))?;
        let settings = FarmSettings {
            sploit,
            pool_size: self.pool_size,
            attack_period,
            verbose_attacks: self.verbose_attacks,
            mode,
        };
        settings.validate()?;
        Ok(settings)
    }
}

fn main() {
    logging::init();
    let code = match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            exit_codes::FATAL
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let settings = match cli.settings() {
        Ok(settings) => settings,
        Err(err) => {
            error!("{err:#}");
            return Ok(exit_codes::INVALID);
        }
    };
    if let Err(err) = check_sploit(&settings.sploit) {
        error!("{err}");
        return Ok(exit_codes::INVALID);
    }
    let server = match FarmServer::new(&cli.server_url, sploit_name(&settings.sploit)) {
        Ok(server) => server,
        Err(err) => {
            error!("{err:#}");
            return Ok(exit_codes::INVALID);
        }
    };

    info!(
        url = %cli.server_url,
        sploit = server.sploit_name(),
        "connecting to the farm server"
    );
    let farm = Arc::new(Farm::new());
    {
        let farm = Arc::clone(&farm);
        ctrlc::set_handler(move || {
            info!("got Ctrl+C, shutting down");
            farm.shutdown();
        })
        .context("install Ctrl+C handler")?;
    }

    let poster = spawn_post_loop(Arc::clone(&farm), server.clone(), POST_PERIOD)?;
    let result = run_attacks(&farm, &server, &settings);

    farm.shutdown();
    if poster.join().is_err() {
        error!("posting loop thread panicked");
    }
    let undelivered = flush(&farm.store, &server);
    if undelivered > 0 {
        warn!(undelivered, "some flags were never posted");
    }

    let result = result.and_then(|summary| match farm.take_failure() {
        Some(err) => Err(err),
        None => Ok(summary),
    });
    match result {
        Ok(summary) => {
            info!(
                rounds = summary.rounds,
                completed = summary.stats.completed,
                killed = summary.stats.killed,
                "farm client stopped"
            );
            Ok(exit_codes::OK)
        }
        Err(err) => {
            error!("{err:#}");
            Ok(exit_codes::FATAL)
        }
    }
}

/// Submitter id reported to the server: the sploit's file name.
fn sploit_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
