//! Fixed-size worker pool for sploit instances.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// `size` threads pulling jobs from one unbounded queue.
///
/// Each worker runs one job to completion before taking the next, so at most
/// `size` jobs run at once. A panicking job is logged and the worker moves
/// on. Dropping the pool closes the queue, lets the workers finish what is
/// already queued, and joins them.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(anyhow!("worker pool size must be > 0"));
        }
        let (sender, receiver) = channel::unbounded::<Job>();
        let workers = (0..size)
            .map(|index| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("sploit-worker-{index}"))
                    .spawn(move || worker_loop(&receiver))
                    .with_context(|| format!("spawn worker {index}"))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(size, "worker pool started");
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Queue `job` for the next free worker.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("worker pool is closed"))?;
        sender
            .send(Box::new(job))
            .map_err(|_| anyhow!("all workers have exited"))
    }

    /// Jobs waiting for a free worker.
    pub fn queued(&self) -> usize {
        self.sender.as_ref().map_or(0, Sender::len)
    }

    /// Close the queue and wait for every queued job to finish.
    pub fn join(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: &Receiver<Job>) {
    for job in receiver.iter() {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
            error!(panic = %panic_message(panic.as_ref()), "sploit task panicked");
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
