//! Background delivery loop tests: retry after a refused batch, crash
//! handling, and the final flush at shutdown.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use farm_client::core::types::FlagRecord;
use farm_client::delivery::{flush, spawn_post_loop};
use farm_client::farm::Farm;
use farm_client::io::collector::{Collector, DeliveryError};
use farm_client::test_support::RecordingCollector;

const PERIOD: Duration = Duration::from_millis(50);

struct PanickingCollector;

impl Collector for PanickingCollector {
    fn deliver(&self, _batch: &[FlagRecord]) -> Result<(), DeliveryError> {
        panic!("collector exploded");
    }
}

#[test]
fn refused_batch_is_retried_on_the_next_tick() {
    let farm = Arc::new(Farm::new());
    farm.store.add(["F1", "F2"], "alpha");
    farm.store.add(["F3"], "beta");
    let collector = Arc::new(RecordingCollector::new(vec![false]));

    let poster =
        spawn_post_loop(Arc::clone(&farm), Arc::clone(&collector), PERIOD).expect("spawn");
    let start = Instant::now();
    while farm.store.pending_size() > 0 && start.elapsed() < Duration::from_secs(5) {
        thread::sleep(Duration::from_millis(10));
    }
    farm.shutdown();
    poster.join().expect("poster thread");

    assert!(collector.attempts() >= 2);
    assert_eq!(
        collector.delivered(),
        vec![
            FlagRecord::new("F1", "alpha"),
            FlagRecord::new("F2", "alpha"),
            FlagRecord::new("F3", "beta"),
        ]
    );
    assert_eq!(farm.store.pending_size(), 0);
    assert!(farm.take_failure().is_none());
}

#[test]
fn crashed_loop_shuts_the_farm_down() {
    let farm = Arc::new(Farm::new());
    farm.store.add(["F1"], "alpha");

    let poster = spawn_post_loop(Arc::clone(&farm), PanickingCollector, PERIOD).expect("spawn");
    poster.join().expect("poster thread returns normally");

    assert!(farm.is_shutting_down());
    let err = farm.take_failure().expect("fatal error");
    assert!(err.to_string().contains("collector exploded"));
    // The batch stays queued for whoever runs next.
    assert_eq!(farm.store.pending_size(), 1);
}

#[test]
fn flush_after_shutdown_delivers_what_the_loop_missed() {
    let farm = Arc::new(Farm::new());
    let collector = Arc::new(RecordingCollector::new(Vec::new()));
    let poster =
        spawn_post_loop(Arc::clone(&farm), Arc::clone(&collector), Duration::from_secs(60))
            .expect("spawn");
    farm.shutdown();
    poster.join().expect("poster thread");

    // Harvesters may still add flags after the loop stopped.
    farm.store.add(["LATE"], "gamma");
    assert_eq!(flush(&farm.store, collector.as_ref()), 0);
    assert_eq!(collector.delivered(), vec![FlagRecord::new("LATE", "gamma")]);

    farm.store.add(["LOST"], "gamma");
    let refusing = RecordingCollector::new(vec![false]);
    assert_eq!(flush(&farm.store, &refusing), 1);
    assert_eq!(refusing.attempts(), 1);
}
