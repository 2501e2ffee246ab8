//! Hashed wheel timer
//!
//! A fixed ring of buckets advanced by a single worker thread. Callers never
//! touch the buckets: submissions and cancellations are pushed on lock-free
//! queues and spliced in by the worker on its next tick.
//!
//! Each tick the worker:
//! 1. removes cancelled entries from their buckets
//! 2. moves newly submitted entries into the bucket of their target tick
//! 3. expires every entry of the current bucket whose rounds reached zero
//!
//! Cancellation only flips the entry state, so a cancelled entry stays in its
//! bucket for at most one tick. Expired tasks are handed to a [`TaskExecutor`]
//! and never run on the tick thread itself.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use crossbeam::queue::SegQueue;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::error::TimerError;

/// Work run when a timeout expires
pub type TimerTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs expired timer tasks outside of the tick thread
pub trait TaskExecutor: Send + Sync {
    /// Hands a task over for execution
    ///
    /// Called from the wheel's worker thread, never from inside an async runtime.
    fn execute(&self, task: TimerTask);
}

/// Upper bound of submissions transferred per tick so a flood cannot stall expiry
const MAX_TRANSFERS_PER_TICK: usize = 100_000;

const STATE_INIT: u8 = 0;
const STATE_CANCELLED: u8 = 1;
const STATE_EXPIRED: u8 = 2;

const UNPLACED: usize = usize::MAX;

/// Timer wheel geometry
#[derive(Debug, Clone)]
pub struct TimerConfig {
    pub tick_duration: Duration,
    pub wheel_size: usize,
    /// Maximum number of pending timeouts, 0 for unbounded
    pub max_pending: usize,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_millis(100),
            wheel_size: 512,
            max_pending: 0,
        }
    }
}

impl From<&EngineConfig> for TimerConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            tick_duration: config.tick_duration,
            wheel_size: config.wheel_size,
            max_pending: config.max_pending_timers,
        }
    }
}

struct TimerEntry {
    /// Nanoseconds since the wheel started
    deadline: u64,
    state: AtomicU8,
    task: Mutex<Option<TimerTask>>,
    /// Bucket index, set by the worker once the entry is placed
    bucket: AtomicUsize,
}

impl TimerEntry {
    fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(STATE_INIT, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn take_task(&self) -> Option<TimerTask> {
        self.task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

struct Shared {
    cancelled: SegQueue<Arc<TimerEntry>>,
    pending: AtomicUsize,
    shutdown: AtomicBool,
}

/// Handle to a submitted task
///
/// Dropping the handle does not cancel the task.
#[derive(Clone)]
pub struct Timeout {
    entry: Arc<TimerEntry>,
    shared: Arc<Shared>,
}

impl Timeout {
    /// Cancels the task if it has neither fired nor been cancelled yet
    ///
    /// Returns `false` when the task already expired or was cancelled before.
    /// The entry is removed from its bucket on the next tick.
    pub fn cancel(&self) -> bool {
        if !self.entry.transition(STATE_CANCELLED) {
            return false;
        }

        drop(self.entry.take_task());

        // The worker may already be gone; the entry then dies with the wheel
        self.shared.cancelled.push(Arc::clone(&self.entry));
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.entry.state() == STATE_CANCELLED
    }

    pub fn is_expired(&self) -> bool {
        self.entry.state() == STATE_EXPIRED
    }
}

impl std::fmt::Debug for Timeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.entry.state() {
            STATE_INIT => "init",
            STATE_CANCELLED => "cancelled",
            _ => "expired",
        };
        f.debug_struct("Timeout")
            .field("deadline_nanos", &self.entry.deadline)
            .field("state", &state)
            .finish()
    }
}

/// Hashed wheel timer
pub struct TimerWheel {
    shared: Arc<Shared>,
    submissions: Arc<SegQueue<Arc<TimerEntry>>>,
    start: Instant,
    max_pending: usize,
    worker: Mutex<Option<JoinHandle<usize>>>,
}

impl TimerWheel {
    /// Creates a wheel and starts its worker thread
    pub fn new(config: TimerConfig, executor: Arc<dyn TaskExecutor>) -> std::io::Result<Self> {
        let wheel_size = normalize_wheel_size(config.wheel_size);
        let tick_nanos = config.tick_duration.as_nanos().max(1) as u64;

        let submissions = Arc::new(SegQueue::new());

        let shared = Arc::new(Shared {
            cancelled: SegQueue::new(),
            pending: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        });

        let start = Instant::now();

        let worker = Worker {
            shared: Arc::clone(&shared),
            submissions: Arc::clone(&submissions),
            executor,
            buckets: (0..wheel_size).map(|_| Vec::new()).collect(),
            mask: (wheel_size - 1) as u64,
            start,
            tick_nanos,
        };

        let handle = thread::Builder::new()
            .name("cadence-timer".to_string())
            .spawn(move || worker.run())?;

        info!(
            "Timer wheel started (tick: {:?}, buckets: {})",
            config.tick_duration, wheel_size
        );

        Ok(Self {
            shared,
            submissions,
            start,
            max_pending: config.max_pending,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Schedules `task` to run once `delay` has elapsed
    ///
    /// Fails with [`TimerError::Shutdown`] once the wheel is stopped and with
    /// [`TimerError::Overloaded`] when the pending limit is reached.
    pub fn submit<F>(&self, task: F, delay: Duration) -> Result<Timeout, TimerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(TimerError::Shutdown);
        }

        let pending = self.shared.pending.fetch_add(1, Ordering::AcqRel) + 1;
        if self.max_pending > 0 && pending > self.max_pending {
            self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(TimerError::Overloaded {
                pending: pending - 1,
                max: self.max_pending,
            });
        }

        let deadline = (Instant::now() + delay)
            .saturating_duration_since(self.start)
            .as_nanos() as u64;

        let entry = Arc::new(TimerEntry {
            deadline,
            state: AtomicU8::new(STATE_INIT),
            task: Mutex::new(Some(Box::pin(task))),
            bucket: AtomicUsize::new(UNPLACED),
        });

        self.submissions.push(Arc::clone(&entry));

        // Lost the race with stop(); the worker may never see this entry
        if self.shared.shutdown.load(Ordering::Acquire) && entry.transition(STATE_CANCELLED) {
            drop(entry.take_task());
            return Err(TimerError::Shutdown);
        }

        Ok(Timeout {
            entry,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Number of submitted tasks that have neither fired nor been swept
    pub fn pending_timeouts(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Stops the worker and returns the number of tasks that never ran
    pub fn stop(&self) -> usize {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return 0;
        }

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let Some(handle) = handle else {
            return 0;
        };

        if handle.thread().id() == thread::current().id() {
            // Stopped from a task running on the worker itself; it exits on its own
            return 0;
        }

        handle.thread().unpark();
        match handle.join() {
            Ok(unprocessed) => {
                info!("Timer wheel stopped ({} unprocessed timeouts)", unprocessed);
                unprocessed
            }
            Err(_) => {
                error!("Timer worker panicked during shutdown");
                0
            }
        }
    }
}

impl Drop for TimerWheel {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Slot {
    entry: Arc<TimerEntry>,
    remaining_rounds: u64,
}

struct Worker {
    shared: Arc<Shared>,
    submissions: Arc<SegQueue<Arc<TimerEntry>>>,
    executor: Arc<dyn TaskExecutor>,
    buckets: Vec<Vec<Slot>>,
    mask: u64,
    start: Instant,
    tick_nanos: u64,
}

impl Worker {
    fn run(mut self) -> usize {
        let mut tick: u64 = 0;

        while let Some(now) = self.wait_for_next_tick(tick) {
            let idx = (tick & self.mask) as usize;
            self.process_cancelled();
            self.transfer_submissions(tick);
            self.expire_bucket(idx, now);
            tick = tick.wrapping_add(1);
        }

        self.drain()
    }

    /// Sleeps until the end of `tick`, returning elapsed nanos or `None` on shutdown
    fn wait_for_next_tick(&self, tick: u64) -> Option<u64> {
        let target = self.tick_nanos.saturating_mul(tick + 1);

        loop {
            if self.shared.shutdown.load(Ordering::Acquire) {
                return None;
            }

            let elapsed = self.start.elapsed().as_nanos() as u64;
            if elapsed >= target {
                return Some(elapsed);
            }

            thread::park_timeout(Duration::from_nanos(target - elapsed));
        }
    }

    fn process_cancelled(&mut self) {
        while let Some(entry) = self.shared.cancelled.pop() {

            let idx = entry.bucket.load(Ordering::Acquire);
            if idx == UNPLACED {
                // Still queued; skipped when transferred
                continue;
            }

            let bucket = &mut self.buckets[idx];
            let before = bucket.len();
            bucket.retain(|slot| !Arc::ptr_eq(&slot.entry, &entry));
            if bucket.len() < before {
                self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            }
        }
    }

    fn transfer_submissions(&mut self, tick: u64) {
        for _ in 0..MAX_TRANSFERS_PER_TICK {
            let Some(entry) = self.submissions.pop() else {
                break;
            };

            if entry.state() == STATE_CANCELLED {
                self.shared.pending.fetch_sub(1, Ordering::AcqRel);
                continue;
            }

            let calculated = entry.deadline / self.tick_nanos;
            let remaining_rounds = calculated.saturating_sub(tick) / self.buckets.len() as u64;
            // Never schedule for a tick that already passed
            let target_tick = calculated.max(tick);
            let idx = (target_tick & self.mask) as usize;

            entry.bucket.store(idx, Ordering::Release);
            self.buckets[idx].push(Slot {
                entry,
                remaining_rounds,
            });
        }
    }

    fn expire_bucket(&mut self, idx: usize, now: u64) {
        let slots = std::mem::take(&mut self.buckets[idx]);
        let mut kept = Vec::with_capacity(slots.len());

        for mut slot in slots {
            if slot.entry.state() == STATE_CANCELLED {
                self.shared.pending.fetch_sub(1, Ordering::AcqRel);
                continue;
            }

            if slot.remaining_rounds > 0 {
                slot.remaining_rounds -= 1;
                kept.push(slot);
                continue;
            }

            if slot.entry.deadline > now {
                kept.push(slot);
                continue;
            }

            self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            if slot.entry.transition(STATE_EXPIRED) {
                if let Some(task) = slot.entry.take_task() {
                    self.dispatch(task);
                }
            }
        }

        self.buckets[idx] = kept;
    }

    fn dispatch(&self, task: TimerTask) {
        let executor = Arc::clone(&self.executor);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            executor.execute(task);
        }));

        if result.is_err() {
            error!("Timer task executor panicked; the tick loop continues");
        }
    }

    fn drain(&mut self) -> usize {
        let mut unprocessed = 0;

        for bucket in self.buckets.iter_mut() {
            for slot in bucket.drain(..) {
                if slot.entry.state() == STATE_INIT {
                    unprocessed += 1;
                }
            }
        }

        while let Some(entry) = self.submissions.pop() {
            if entry.state() == STATE_INIT {
                unprocessed += 1;
            }
        }

        self.shared.pending.store(0, Ordering::Release);
        debug!("Timer worker exiting");
        unprocessed
    }
}

/// Rounds the wheel size up to the next power of two
fn normalize_wheel_size(size: usize) -> usize {
    size.max(1).next_power_of_two()
}
