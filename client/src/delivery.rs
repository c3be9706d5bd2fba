//! Delivery loop: ships queued flags to the collector in batches.
//!
//! Delivery is at-least-once. A batch is only removed from the store after
//! the collector accepted it; a failed attempt leaves the queue as it was,
//! and the next tick retries with the same (or a longer) batch.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{error, info, warn};

use crate::farm::Farm;
use crate::io::collector::Collector;
use crate::pool::panic_message;
use crate::store::FlagStore;
use crate::ticker::Ticker;

/// Time between delivery attempts.
pub const POST_PERIOD: Duration = Duration::from_secs(5);
/// Largest batch sent in one request.
pub const POST_FLAG_LIMIT: usize = 10_000;

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was pending.
    Idle,
    /// `delivered` flags were accepted and removed from the queue.
    Delivered { delivered: usize, remaining: usize },
    /// The collector refused or was unreachable; `pending` flags stay queued.
    Failed { pending: usize },
}

/// Deliver up to `limit` of the oldest pending flags.
pub fn post_tick<C: Collector + ?Sized>(
    store: &FlagStore,
    collector: &C,
    limit: usize,
) -> TickOutcome {
    let batch = store.peek_batch(limit);
    if batch.is_empty() {
        return TickOutcome::Idle;
    }

    match collector.deliver(&batch) {
        Ok(()) => {
            store.commit(batch.len());
            let remaining = store.pending_size();
            info!(
                delivered = batch.len(),
                remaining, "flags posted to the server"
            );
            TickOutcome::Delivered {
                delivered: batch.len(),
                remaining,
            }
        }
        Err(err) => {
            error!(err = %err, "can't post flags to the server");
            info!("the flags will be posted next time");
            TickOutcome::Failed {
                pending: store.pending_size(),
            }
        }
    }
}

/// Tick every `period` until shutdown.
///
/// A panic inside the loop would silently stop all future deliveries, so it
/// is turned into a fatal error that shuts the farm down.
pub fn run_post_loop<C: Collector + ?Sized>(farm: &Farm, collector: &C, period: Duration) {
    let result = catch_unwind(AssertUnwindSafe(|| {
        for _ in Ticker::new(period, farm.signal()) {
            post_tick(&farm.store, collector, POST_FLAG_LIMIT);
        }
    }));
    if let Err(panic) = result {
        farm.fail(anyhow!(
            "posting loop died: {}",
            panic_message(panic.as_ref())
        ));
    }
}

/// Run [`run_post_loop`] on its own thread.
pub fn spawn_post_loop<C>(farm: Arc<Farm>, collector: C, period: Duration) -> Result<JoinHandle<()>>
where
    C: Collector + Send + 'static,
{
    thread::Builder::new()
        .name("flag-poster".to_string())
        .spawn(move || run_post_loop(&farm, &collector, period))
        .context("spawn posting loop")
}

/// Deliver whatever is still queued after the farm has stopped.
///
/// Runs on the caller's thread; the posting loop must already be joined so
/// the store keeps a single consumer. Stops at the first failed attempt and
/// returns the number of flags left undelivered.
pub fn flush<C: Collector + ?Sized>(store: &FlagStore, collector: &C) -> usize {
    loop {
        match post_tick(store, collector, POST_FLAG_LIMIT) {
            TickOutcome::Idle => return 0,
            TickOutcome::Delivered { remaining: 0, .. } => return 0,
            TickOutcome::Delivered { .. } => {}
            TickOutcome::Failed { pending } => {
                warn!(pending, "flags left undelivered at shutdown");
                return pending;
            }
        }
    }
}
