//! Process-wide cancellation signal.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::sync::lock;

/// One-way flag that wakes every sleeper when set.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    triggered: Mutex<bool>,
    wakeup: Condvar,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Returns `true` for the call that actually set it.
    pub fn trigger(&self) -> bool {
        let mut triggered = lock(&self.triggered);
        let first = !*triggered;
        *triggered = true;
        self.wakeup.notify_all();
        first
    }

    pub fn is_triggered(&self) -> bool {
        *lock(&self.triggered)
    }

    /// Sleep for up to `timeout`, waking early on shutdown.
    ///
    /// Returns whether shutdown has been triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let triggered = lock(&self.triggered);
        let (triggered, _) = self
            .wakeup
            .wait_timeout_while(triggered, timeout, |triggered| !*triggered)
            .unwrap_or_else(PoisonError::into_inner);
        *triggered
    }
}
