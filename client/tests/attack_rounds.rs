//! Round loop tests: config refresh, stale config reuse, and dedup across
//! rounds, driven through `run_attacks` with a scripted config source.
#![cfg(unix)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use farm_client::attack::{FarmSettings, run_attacks};
use farm_client::core::partition::TargetMode;
use farm_client::farm::Farm;
use farm_client::test_support::{ScriptedConfigProvider, SploitDir, round_config};

const PATTERN: &str = r"TOKEN\{[a-z]+\}";

fn settings(sploit: PathBuf, attack_period: Duration) -> FarmSettings {
    FarmSettings {
        sploit,
        pool_size: 4,
        attack_period,
        verbose_attacks: 1,
        mode: TargetMode::PerTeam,
    }
}

fn shutdown_after(farm: &Arc<Farm>, delay: Duration) -> thread::JoinHandle<()> {
    let farm = Arc::clone(farm);
    thread::spawn(move || {
        thread::sleep(delay);
        farm.shutdown();
    })
}

#[test]
fn first_config_failure_stops_before_any_dispatch() {
    let dir = SploitDir::new();
    let marker = dir.path().join("ran");
    let sploit = dir.script("sploit", &format!("touch '{}'\n", marker.display()));
    let farm = Arc::new(Farm::new());
    let provider = ScriptedConfigProvider::new(vec![None]);

    let err = run_attacks(&farm, &provider, &settings(sploit, Duration::from_secs(60)))
        .expect_err("first config failure is fatal");

    assert!(format!("{err:#}").contains("get config"));
    assert_eq!(provider.calls(), 1);
    assert!(!marker.exists());
    assert!(farm.is_shutting_down());
}

#[test]
fn empty_roster_in_first_round_is_fatal() {
    let dir = SploitDir::new();
    let sploit = dir.script("sploit", "exit 0\n");
    let farm = Arc::new(Farm::new());
    let provider = ScriptedConfigProvider::new(vec![Some(round_config(PATTERN, &[]))]);

    let err = run_attacks(&farm, &provider, &settings(sploit, Duration::from_secs(60)))
        .expect_err("no teams");

    assert!(err.to_string().contains("no teams"));
    assert_eq!(farm.instances.stats().finished(), 0);
}

#[test]
fn later_rounds_reuse_the_last_config_and_dedup_flags() {
    let dir = SploitDir::new();
    let log = dir.path().join("targets.log");
    let sploit = dir.script(
        "sploit",
        &format!("echo TOKEN{{same}}\necho \"$1\" >> '{}'\n", log.display()),
    );
    let farm = Arc::new(Farm::new());
    // Round 1 gets a config, every later refresh fails.
    let provider = ScriptedConfigProvider::new(vec![Some(round_config(
        PATTERN,
        &[("alpha", "10.0.0.1"), ("beta", "10.0.0.2")],
    ))]);

    let stopper = shutdown_after(&farm, Duration::from_millis(1000));
    let summary = run_attacks(
        &farm,
        &provider,
        &settings(sploit, Duration::from_millis(300)),
    )
    .expect("stale config is not fatal after round 1");
    stopper.join().expect("stopper thread");

    assert!(summary.rounds >= 2, "rounds: {}", summary.rounds);
    assert_eq!(provider.calls() as u64, summary.rounds);

    let launched = fs::read_to_string(&log).expect("target log");
    let lines: Vec<&str> = launched.lines().collect();
    assert!(lines.len() >= 4, "launches: {lines:?}");
    assert!(lines.contains(&"10.0.0.1"));
    assert!(lines.contains(&"10.0.0.2"));

    // One flag per team no matter how many rounds printed it.
    assert_eq!(farm.store.seen_size(), 2);
    assert_eq!(farm.store.pending_size(), 2);
    assert_eq!(farm.instances.live_count(), 0);
    assert!(farm.take_failure().is_none());
}

#[test]
fn shutdown_unblocks_workers_of_a_running_round() {
    let dir = SploitDir::new();
    let sploit = dir.script("sploit", "echo TOKEN{slow}\nsleep 30\n");
    let farm = Arc::new(Farm::new());
    let provider = ScriptedConfigProvider::new(vec![Some(round_config(
        PATTERN,
        &[("alpha", "10.0.0.1"), ("beta", "10.0.0.2"), ("gamma", "10.0.0.3")],
    ))]);

    let stopper = shutdown_after(&farm, Duration::from_millis(500));
    let start = Instant::now();
    let summary = run_attacks(&farm, &provider, &settings(sploit, Duration::from_secs(60)))
        .expect("run");
    stopper.join().expect("stopper thread");

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(summary.rounds, 1);
    assert_eq!(summary.stats.killed, 3);
    assert_eq!(farm.instances.live_count(), 0);
    assert_eq!(farm.store.seen_size(), 1);
}

#[test]
fn shared_mode_runs_one_instance_on_the_placeholder_address() {
    let dir = SploitDir::new();
    let log = dir.path().join("targets.log");
    let sploit = dir.script(
        "sploit",
        &format!("echo \"$1\" >> '{}'\n", log.display()),
    );
    let farm = Arc::new(Farm::new());
    let provider = ScriptedConfigProvider::new(vec![Some(round_config(
        PATTERN,
        &[("alpha", "10.0.0.1"), ("beta", "10.0.0.2")],
    ))]);
    let settings = FarmSettings {
        mode: TargetMode::Shared,
        ..settings(sploit, Duration::from_secs(60))
    };

    let stopper = shutdown_after(&farm, Duration::from_millis(500));
    let summary = run_attacks(&farm, &provider, &settings).expect("run");
    stopper.join().expect("stopper thread");

    assert_eq!(summary.rounds, 1);
    let launched = fs::read_to_string(&log).expect("target log");
    assert_eq!(launched.lines().collect::<Vec<_>>(), ["0.0.0.0"]);
}
