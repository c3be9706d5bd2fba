//! Round driver: numbered ticks at a fixed period.

use std::time::{Duration, Instant};

use crate::shutdown::ShutdownSignal;

/// Yields round numbers `1, 2, 3, …`, one per `period`.
///
/// The first round fires immediately. Each later round fires `period` after
/// the previous one was handed out: time the caller spent between two
/// `next()` calls is subtracted from the sleep, and a caller that overran
/// the period gets the next round at once. Shutdown interrupts the sleep and
/// ends the sequence for good.
#[derive(Debug)]
pub struct Ticker<'a> {
    period: Duration,
    shutdown: &'a ShutdownSignal,
    next_round: u64,
    last_tick: Option<Instant>,
}

impl<'a> Ticker<'a> {
    pub fn new(period: Duration, shutdown: &'a ShutdownSignal) -> Self {
        Self {
            period,
            shutdown,
            next_round: 1,
            last_tick: None,
        }
    }
}

impl Iterator for Ticker<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if let Some(last_tick) = self.last_tick {
            let remaining = self.period.saturating_sub(last_tick.elapsed());
            if !remaining.is_zero() && self.shutdown.wait_timeout(remaining) {
                return None;
            }
        }
        if self.shutdown.is_triggered() {
            return None;
        }

        self.last_tick = Some(Instant::now());
        let round = self.next_round;
        self.next_round += 1;
        Some(round)
    }
}
