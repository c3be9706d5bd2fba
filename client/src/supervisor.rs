//! Instance supervisor: launch, deadline, kill, and accounting for sploit
//! processes.
//!
//! Each worker owns the `Child` it launched and blocks in `wait_timeout`
//! without holding any lock. [`InstanceRegistry`] keeps only the kill handle
//! of every live instance. Deadline kills, shutdown kills and removal all
//! happen under the registry lock, so an instance is killed at most once and
//! counted exactly once when it leaves the registry.

use std::collections::HashMap;
use std::io::{self, PipeReader};
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use thiserror::Error;
use tracing::{debug, error, warn};
use wait_timeout::ChildExt;

use crate::core::flags::FlagFormat;
use crate::core::types::{InstanceOutcome, InstanceStats, Target};
use crate::farm::Farm;
use crate::harvest::run_harvester;
use crate::io::process::{LaunchError, ProcessGroup, spawn_sploit};
use crate::sync::lock;

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("wait for sploit: {0}")]
    Wait(#[source] io::Error),
    #[error("kill sploit: {0}")]
    Kill(#[source] io::Error),
}

#[derive(Debug)]
struct LiveInstance {
    group: ProcessGroup,
    target: Target,
    round: u64,
    started_at: Instant,
    killed: bool,
}

impl LiveInstance {
    /// Kill the instance's group unless it was killed already.
    fn kill(&mut self, id: u64) -> io::Result<bool> {
        if self.killed {
            return Ok(false);
        }
        self.group.kill()?;
        self.killed = true;
        debug!(id, team = %self.target.name, group = self.group.id(), "killed sploit");
        Ok(true)
    }
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    live: HashMap<u64, LiveInstance>,
    stats: InstanceStats,
    closed: bool,
}

/// An instance that was registered and is now running.
#[derive(Debug)]
pub struct LaunchedInstance {
    pub id: u64,
    pub child: Child,
    pub output: PipeReader,
}

/// Kill handles of every live sploit instance and the running totals.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    inner: Mutex<Registry>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch `executable` against `target` and register the process.
    ///
    /// Returns `Ok(None)` without spawning once the registry is closed.
    pub fn launch(
        &self,
        executable: &Path,
        target: &Target,
        round: u64,
    ) -> Result<Option<LaunchedInstance>, LaunchError> {
        let mut inner = lock(&self.inner);
        if inner.closed {
            return Ok(None);
        }

        let process = spawn_sploit(executable, &target.address)?;
        let id = inner.next_id;
        inner.next_id += 1;
        inner.live.insert(
            id,
            LiveInstance {
                group: process.group,
                target: target.clone(),
                round,
                started_at: Instant::now(),
                killed: false,
            },
        );
        Ok(Some(LaunchedInstance {
            id,
            child: process.child,
            output: process.output,
        }))
    }

    /// Kill instance `id` because its deadline passed.
    ///
    /// Returns `false` when shutdown got to it first or it is not registered.
    pub fn expire(&self, id: u64) -> io::Result<bool> {
        let mut inner = lock(&self.inner);
        match inner.live.get_mut(&id) {
            Some(instance) => instance.kill(id),
            None => Ok(false),
        }
    }

    /// Unregister instance `id` after its process was reaped and fold its
    /// outcome into the stats.
    ///
    /// Whatever the sploit left running in its group is killed so the output
    /// pipe can close.
    pub fn finish(&self, id: u64) -> Option<InstanceOutcome> {
        let mut inner = lock(&self.inner);
        let instance = inner.live.remove(&id)?;
        if let Err(err) = instance.group.kill() {
            warn!(id, err = %err, "failed to kill leftover sploit processes");
        }

        let outcome = if instance.killed {
            InstanceOutcome::Killed
        } else {
            InstanceOutcome::Completed
        };
        debug!(
            id,
            team = %instance.target.name,
            round = instance.round,
            runtime_ms = instance.started_at.elapsed().as_millis() as u64,
            ?outcome,
            "instance finished"
        );
        inner.stats.record(outcome);
        Some(outcome)
    }

    /// Kill and forget instance `id` without counting it.
    ///
    /// For instances whose state can no longer be observed. The caller still
    /// owns the `Child` and reaps it.
    pub fn discard(&self, id: u64) {
        let mut inner = lock(&self.inner);
        if let Some(mut instance) = inner.live.remove(&id)
            && let Err(err) = instance.kill(id)
        {
            warn!(id, err = %err, "failed to kill discarded instance");
        }
    }

    /// Refuse further launches and kill every live instance.
    ///
    /// Returns how many instances were killed by this call.
    pub fn close_and_kill_all(&self) -> usize {
        let mut inner = lock(&self.inner);
        inner.closed = true;

        let mut killed = 0;
        for (&id, instance) in &mut inner.live {
            match instance.kill(id) {
                Ok(true) => killed += 1,
                Ok(false) => {}
                Err(err) => warn!(
                    id,
                    team = %instance.target.name,
                    err = %err,
                    "failed to kill sploit"
                ),
            }
        }
        killed
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }

    pub fn live_count(&self) -> usize {
        lock(&self.inner).live.len()
    }

    pub fn stats(&self) -> InstanceStats {
        lock(&self.inner).stats
    }
}

/// One sploit run against one target, as queued on the worker pool.
#[derive(Debug, Clone)]
pub struct InstanceTask {
    pub executable: Arc<PathBuf>,
    pub target: Target,
    pub round: u64,
    pub deadline: Duration,
    pub flag_format: FlagFormat,
    /// Whether output and flags of this instance are shown.
    pub verbose: bool,
}

/// Run one instance to completion: launch, harvest, wait up to the
/// deadline, kill on expiry.
///
/// All failures stop here. A launch failure in round 1 is a configuration
/// problem that would repeat every round, so it shuts the farm down.
pub fn run_instance(farm: &Farm, task: &InstanceTask) -> Option<InstanceOutcome> {
    let target = &task.target;
    let launched = match farm.instances.launch(&task.executable, target, task.round) {
        Ok(Some(launched)) => launched,
        Ok(None) => return None,
        Err(err) => {
            error!(
                team = %target.name,
                address = %target.address,
                err = %err,
                "failed to run sploit"
            );
            if err.is_not_found() {
                error!(
                    "check your shebang (use #!/usr/bin/env ... for compatibility) \
                     and presence of the sploit file"
                );
            }
            if task.round == 1 {
                farm.fail(anyhow!(err).context("launch sploit in the first attack"));
            }
            return None;
        }
    };

    let LaunchedInstance {
        id,
        mut child,
        output,
    } = launched;

    thread::scope(|scope| {
        scope.spawn(|| {
            run_harvester(
                output,
                &target.name,
                &task.flag_format,
                &farm.store,
                task.verbose,
                || !farm.is_shutting_down(),
            );
        });
        supervise(farm, task, id, &mut child)
    })
}

fn supervise(
    farm: &Farm,
    task: &InstanceTask,
    id: u64,
    child: &mut Child,
) -> Option<InstanceOutcome> {
    match wait_or_kill(farm, id, child, task.deadline) {
        Ok(timed_out) => {
            if timed_out && task.verbose {
                warn!(
                    team = %task.target.name,
                    address = %task.target.address,
                    "sploit ran out of time"
                );
            }
            farm.instances.finish(id)
        }
        Err(err) => {
            error!(team = %task.target.name, err = %err, "failed to finish sploit");
            farm.instances.discard(id);
            if let Err(err) = child.kill().and_then(|()| child.wait().map(drop)) {
                warn!(id, err = %err, "failed to reap sploit");
            }
            None
        }
    }
}

/// Wait for the child up to `timeout`, killing its group on expiry.
///
/// Returns whether this call killed it. A child killed by shutdown while
/// waiting simply exits early.
fn wait_or_kill(
    farm: &Farm,
    id: u64,
    child: &mut Child,
    timeout: Duration,
) -> Result<bool, WaitError> {
    if child.wait_timeout(timeout).map_err(WaitError::Wait)?.is_some() {
        return Ok(false);
    }

    let killed = farm.instances.expire(id).map_err(WaitError::Kill)?;
    // The leader is also killed directly, for platforms without groups.
    child.kill().map_err(WaitError::Kill)?;
    child.wait().map_err(WaitError::Wait)?;
    Ok(killed)
}
