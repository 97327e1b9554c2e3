//! Fixed-size worker pools for double-spend processing
//!
//! Each pool is a set of worker loops pulling boxed futures from one bounded
//! channel, so any free worker picks up the next task. Submission never
//! blocks; a full queue is reported to the caller.

use crate::doublespend::config::DoubleSpendConfig;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;

/// A unit of work run by a pool worker
pub type Task = BoxFuture<'static, ()>;

/// Pool errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("{0} pool queue is full")]
    QueueFull(String),
    #[error("{0} pool is shut down")]
    Closed(String),
}

#[derive(Clone)]
pub struct WorkerPool {
    name: Arc<str>,
    sender: mpsc::Sender<Task>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` workers on the current tokio runtime
    ///
    /// Returns `None` when `size` is zero: that class of work is disabled.
    pub fn new(name: &str, size: usize, capacity: usize) -> Option<Self> {
        if size == 0 {
            log::info!("{} pool disabled", name);
            return None;
        }

        let (sender, receiver) = mpsc::channel::<Task>(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        for worker in 0..size {
            let receiver = receiver.clone();
            let name = name.to_string();
            tokio::spawn(async move {
                loop {
                    let task = receiver.lock().await.recv().await;
                    let Some(task) = task else { break };
                    if AssertUnwindSafe(task).catch_unwind().await.is_err() {
                        log::error!("{} pool worker {} task panicked", name, worker);
                    }
                }
                log::debug!("{} pool worker {} stopped", name, worker);
            });
        }

        log::info!("{} pool started with {} workers", name, size);
        Some(Self {
            name: Arc::from(name),
            sender,
            size,
        })
    }

    /// Queue `task` for any free worker
    pub fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.sender.try_send(task.boxed()).map_err(|e| match e {
            TrySendError::Full(_) => PoolError::QueueFull(self.name.to_string()),
            TrySendError::Closed(_) => PoolError::Closed(self.name.to_string()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Tasks waiting for a worker
    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}

/// The fast pool handles newly detected double-spends; the slow pool keeps
/// unresponsive endpoints away from it
#[derive(Clone)]
pub struct WorkerPools {
    pub fast: Option<WorkerPool>,
    pub slow: Option<WorkerPool>,
}

impl WorkerPools {
    pub fn from_config(config: &DoubleSpendConfig) -> Self {
        Self {
            fast: WorkerPool::new("fast", config.fast_pool_threads, config.task_queue_capacity),
            slow: WorkerPool::new("slow", config.slow_pool_threads, config.task_queue_capacity),
        }
    }

    pub fn disabled() -> Self {
        Self {
            fast: None,
            slow: None,
        }
    }
}
