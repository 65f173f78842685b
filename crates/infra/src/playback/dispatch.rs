//! Bounded pool running synthesis jobs off the event path
//!
//! Jobs wait in a bounded queue. One dispatcher task pulls them and runs at
//! most `workers` at a time. When every worker is busy the dispatcher stops
//! pulling, the queue fills, and `submit` starts rejecting: callers are
//! never blocked.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Dispatch queue is full")]
    Saturated,

    #[error("Dispatch pool is shut down")]
    ShutDown,
}

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct DispatchPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    capacity: usize,
    workers: usize,
}

impl DispatchPool {
    /// Spawn the dispatcher on `runtime`. Zero sizes are raised to one.
    pub fn new(runtime: &Handle, workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);

        let dispatcher = runtime.spawn(dispatch(receiver, Arc::new(Semaphore::new(workers))));
        info!(workers, capacity, "Dispatch pool started");

        Self {
            sender: Mutex::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
            capacity,
            workers,
        }
    }

    /// Queue a job without waiting
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = lock(&self.sender);
        let sender = guard.as_ref().ok_or(DispatchError::ShutDown)?;

        sender.try_send(Box::pin(job)).map_err(|e| match e {
            TrySendError::Full(_) => DispatchError::Saturated,
            TrySendError::Closed(_) => DispatchError::ShutDown,
        })
    }

    /// Jobs waiting in the queue
    pub fn queued(&self) -> usize {
        lock(&self.sender)
            .as_ref()
            .map(|sender| sender.max_capacity() - sender.capacity())
            .unwrap_or(0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn is_shut_down(&self) -> bool {
        lock(&self.sender).is_none()
    }

    /// Refuse new jobs and wait for queued and running ones to finish
    pub async fn shutdown(&self) {
        // Dropping the sender closes the queue once it is drained
        let sender = lock(&self.sender).take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let dispatcher = lock(&self.dispatcher).take();
        if let Some(dispatcher) = dispatcher {
            if let Err(e) = dispatcher.await {
                error!(error = %e, "Dispatcher task failed");
            }
        }
        info!("Dispatch pool shut down");
    }
}

async fn dispatch(mut receiver: mpsc::Receiver<Job>, permits: Arc<Semaphore>) {
    let mut in_flight = JoinSet::new();

    while let Some(job) = receiver.recv().await {
        let permit = match Arc::clone(&permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        in_flight.spawn(async move {
            job.await;
            drop(permit);
        });

        while let Some(finished) = in_flight.try_join_next() {
            log_failure(finished);
        }
    }

    while let Some(finished) = in_flight.join_next().await {
        log_failure(finished);
    }
    debug!("Dispatcher drained");
}

fn log_failure(finished: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = finished {
        // A panicking job only takes itself down
        error!(error = %e, "Synthesis job failed");
    }
}
