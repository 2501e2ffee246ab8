//! Execution pool
//!
//! A fixed set of worker tasks draining a bounded queue on the async runtime.
//! Expired timer tasks are only ever enqueued here, so the wheel thread never
//! awaits a job itself. When the queue is full a submitter outside the runtime
//! waits for a free slot, which slows down whoever is producing work.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};
use tracing::{debug, error, warn};

use crate::timer::{TaskExecutor, TimerTask};

/// Bounded worker pool with blocking backpressure
pub struct ExecutionPool {
    handle: Handle,
    queue: Sender<TimerTask>,
    in_flight: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl ExecutionPool {
    /// Creates a pool and spawns its workers on the given runtime
    ///
    /// # Arguments
    /// * `handle` - Runtime the workers run on
    /// * `workers` - Executions that may run concurrently
    /// * `queue` - Executions that may wait for a worker
    pub fn new(handle: Handle, workers: usize, queue: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicBool::new(false));

        for _ in 0..workers.max(1) {
            handle.spawn(work(
                handle.clone(),
                Arc::clone(&rx),
                Arc::clone(&in_flight),
                Arc::clone(&closed),
            ));
        }

        Self {
            handle,
            queue: tx,
            in_flight,
            closed,
        }
    }

    /// Number of executions currently running on a worker
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Stops accepting work; queued tasks are dropped as workers reach them
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

async fn work(
    handle: Handle,
    rx: Arc<Mutex<Receiver<TimerTask>>>,
    in_flight: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
) {
    loop {
        let task = { rx.lock().await.recv().await };
        let Some(task) = task else {
            break;
        };

        if closed.load(Ordering::Acquire) {
            debug!("Execution pool closed, dropping queued task");
            continue;
        }

        in_flight.fetch_add(1, Ordering::AcqRel);
        // A panicking task must not take the worker down with it
        if let Err(e) = handle.spawn(task).await {
            error!("Execution task failed: {}", e);
        }
        in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl TaskExecutor for ExecutionPool {
    fn execute(&self, task: TimerTask) {
        if self.closed.load(Ordering::Acquire) {
            debug!("Execution pool closed, dropping task");
            return;
        }

        let task = match self.queue.try_send(task) {
            Ok(()) => return,
            Err(TrySendError::Full(task)) => task,
            Err(TrySendError::Closed(_)) => {
                warn!("Execution pool workers are gone, dropping task");
                return;
            }
        };

        if Handle::try_current().is_ok() {
            // Blocking inside the runtime could deadlock it
            warn!("Execution pool saturated inside the runtime, spawning past capacity");
            self.handle.spawn(task);
            return;
        }

        debug!("Execution pool saturated, waiting for a free slot");
        if self.queue.blocking_send(task).is_err() {
            warn!("Execution pool workers are gone, dropping task");
        }
    }
}
