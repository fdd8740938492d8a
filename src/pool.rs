//! Worker thread pool
//!
//! A fixed-size set of threads that perform message-processing work on
//! behalf of the listener. The bootstrap's contract is narrow: start N
//! threads, submit work, stop and join them all. Scheduling beyond a
//! shared job queue is deliberately not this crate's concern.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Unit of work handed to the pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors from pool startup.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to spawn any worker threads")]
    NoWorkers,
}

/// Cloneable handle for submitting work to the pool.
#[derive(Clone)]
pub struct PoolHandle {
    sender: Sender<Job>,
}

impl PoolHandle {
    /// Submit a job; returns false when the pool has shut down.
    pub fn submit(&self, job: Job) -> bool {
        self.sender.send(job).is_ok()
    }
}

/// A running pool of worker threads.
pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
    sender: Sender<Job>,
}

struct WorkerHandle {
    id: usize,
    thread: JoinHandle<()>,
}

impl WorkerPool {
    /// Start `count` worker threads.
    ///
    /// A thread that fails to spawn is logged and skipped; the pool comes
    /// up with fewer workers. Failing to spawn any worker is an error.
    pub fn start(count: u32) -> Result<Self, PoolError> {
        let (sender, receiver) = channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(count as usize);
        for id in 0..count as usize {
            let receiver = Arc::clone(&receiver);
            let spawned = thread::Builder::new()
                .name(format!("ferry-worker-{id}"))
                .spawn(move || worker_loop(id, &receiver));
            match spawned {
                Ok(thread) => workers.push(WorkerHandle { id, thread }),
                Err(err) => warn!(worker = id, error = %err, "failed to spawn worker"),
            }
        }

        if workers.is_empty() {
            return Err(PoolError::NoWorkers);
        }

        info!(count = workers.len(), "worker pool started");
        Ok(Self { workers, sender })
    }

    /// Number of running workers.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            sender: self.sender.clone(),
        }
    }

    /// Stop the pool: close the job queue, let workers drain, join them.
    pub fn stop(self) {
        let Self { workers, sender } = self;
        drop(sender);
        for worker in workers {
            if worker.thread.join().is_err() {
                warn!(worker = worker.id, "worker panicked before shutdown");
            }
        }
        info!("worker pool stopped");
    }
}

fn worker_loop(id: usize, receiver: &Mutex<Receiver<Job>>) {
    debug!(worker = id, "worker started");
    loop {
        let job = match receiver.lock() {
            Ok(guard) => guard.recv(),
            Err(_) => break,
        };
        match job {
            Ok(job) => job(),
            Err(_) => break,
        }
    }
    debug!(worker = id, "worker exiting");
}
