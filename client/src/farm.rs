//! Shared scheduler context.

use std::sync::Mutex;

use anyhow::Error;
use tracing::{error, info};

use crate::shutdown::ShutdownSignal;
use crate::store::FlagStore;
use crate::supervisor::InstanceRegistry;
use crate::sync::lock;

/// State shared by the round loop, the workers, the harvesters and the
/// delivery loop. Built once per run and passed around behind an `Arc`.
#[derive(Debug, Default)]
pub struct Farm {
    pub store: FlagStore,
    pub instances: InstanceRegistry,
    shutdown: ShutdownSignal,
    fatal: Mutex<Option<Error>>,
}

impl Farm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Stop every loop and kill every live instance. Safe to call from any
    /// thread, any number of times.
    pub fn shutdown(&self) {
        if self.shutdown.trigger() {
            info!("shutting down");
        }
        let killed = self.instances.close_and_kill_all();
        if killed > 0 {
            info!(killed, "killed running sploit instances");
        }
    }

    /// Record an unrecoverable error and shut down.
    ///
    /// Only the first error is kept; later ones are logged.
    pub fn fail(&self, err: Error) {
        error!("fatal error: {err:#}");
        {
            let mut fatal = lock(&self.fatal);
            if fatal.is_none() {
                *fatal = Some(err);
            }
        }
        self.shutdown();
    }

    /// Take the first recorded fatal error, if any.
    pub fn take_failure(&self) -> Option<Error> {
        lock(&self.fatal).take()
    }
}
