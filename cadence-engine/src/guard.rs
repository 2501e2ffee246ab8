//! Execution guard
//!
//! Per-job admission state shared by the scan loop, the timer fire callback
//! and the completion path. Every operation is a single-key atomic operation
//! on a concurrent map, so no global lock is taken.

use cadence_core::domain::job::JobId;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tracing::debug;

use crate::timer::Timeout;

/// Tracks which jobs are running, scheduled on the timer wheel, or paused
#[derive(Default)]
pub struct ExecutionGuard {
    running: DashSet<JobId>,
    paused: DashSet<JobId>,
    /// A reserved slot holds `None` until the timer handle is attached
    scheduled: DashMap<JobId, Option<Timeout>>,
}

impl ExecutionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Running
    // =========================================================================

    /// Admits a job for execution
    ///
    /// # Returns
    /// `false` if the job is already running; the caller must skip it.
    pub fn try_mark_running(&self, job_id: JobId) -> bool {
        self.running.insert(job_id)
    }

    pub fn unmark_running(&self, job_id: JobId) {
        self.running.remove(&job_id);
    }

    pub fn is_running(&self, job_id: JobId) -> bool {
        self.running.contains(&job_id)
    }

    // =========================================================================
    // Scheduled
    // =========================================================================

    /// Reserves the job's single timer slot
    ///
    /// # Returns
    /// `false` if the job already has a timer entry or a reservation.
    pub fn try_reserve_schedule(&self, job_id: JobId) -> bool {
        match self.scheduled.entry(job_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(None);
                true
            }
        }
    }

    /// Attaches a timer handle to a reserved slot
    ///
    /// If the reservation was revoked in the meantime (the job was paused),
    /// or the slot already holds a timer, the new timer is cancelled and
    /// `false` is returned.
    pub fn attach_timeout(&self, job_id: JobId, timeout: Timeout) -> bool {
        match self.scheduled.get_mut(&job_id) {
            Some(slot) if slot.is_some() => {
                debug!("Job {} already holds a timer, cancelling the new one", job_id);
                timeout.cancel();
                false
            }
            Some(mut slot) => {
                *slot = Some(timeout);
                true
            }
            None => {
                debug!("Schedule slot for job {} revoked, cancelling timer", job_id);
                timeout.cancel();
                false
            }
        }
    }

    /// Releases the job's timer slot without cancelling the timer
    pub fn release_schedule(&self, job_id: JobId) {
        self.scheduled.remove(&job_id);
    }

    pub fn is_scheduled(&self, job_id: JobId) -> bool {
        self.scheduled.contains_key(&job_id)
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled.len()
    }

    // =========================================================================
    // Paused
    // =========================================================================

    /// Suspends automatic scheduling of a job
    ///
    /// Cancels the job's live timer entry, if any. An execution that is
    /// already running is not interrupted. Idempotent.
    ///
    /// # Returns
    /// `true` if the job was not paused before.
    pub fn pause(&self, job_id: JobId) -> bool {
        let newly_paused = self.paused.insert(job_id);

        if let Some((_, Some(timeout))) = self.scheduled.remove(&job_id) {
            if timeout.cancel() {
                debug!("Cancelled pending timer for paused job {}", job_id);
            }
        }

        newly_paused
    }

    /// Re-enables automatic scheduling of a job. Idempotent.
    ///
    /// # Returns
    /// `true` if the job was paused before.
    pub fn resume(&self, job_id: JobId) -> bool {
        self.paused.remove(&job_id).is_some()
    }

    pub fn is_paused(&self, job_id: JobId) -> bool {
        self.paused.contains(&job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{TaskExecutor, TimerConfig, TimerTask, TimerWheel};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    struct CountingExecutor(Arc<AtomicUsize>);

    impl TaskExecutor for CountingExecutor {
        fn execute(&self, _task: TimerTask) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wheel(fired: Arc<AtomicUsize>) -> TimerWheel {
        let config = TimerConfig {
            tick_duration: Duration::from_millis(10),
            wheel_size: 64,
            max_pending: 0,
        };
        TimerWheel::new(config, Arc::new(CountingExecutor(fired))).unwrap()
    }

    #[test]
    fn test_running_admission_is_exclusive() {
        let guard = ExecutionGuard::new();
        let job = Uuid::new_v4();

        assert!(guard.try_mark_running(job));
        assert!(!guard.try_mark_running(job));
        assert!(guard.is_running(job));

        guard.unmark_running(job);
        assert!(!guard.is_running(job));
        assert!(guard.try_mark_running(job));
    }

    #[test]
    fn test_only_one_schedule_reservation() {
        let guard = ExecutionGuard::new();
        let job = Uuid::new_v4();

        assert!(guard.try_reserve_schedule(job));
        assert!(!guard.try_reserve_schedule(job));
        assert_eq!(guard.scheduled_count(), 1);

        guard.release_schedule(job);
        assert!(!guard.is_scheduled(job));
        assert!(guard.try_reserve_schedule(job));
    }

    #[test]
    fn test_concurrent_admission_admits_once() {
        let guard = Arc::new(ExecutionGuard::new());
        let job = Uuid::new_v4();
        let admitted = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let guard = Arc::clone(&guard);
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    if guard.try_reserve_schedule(job) {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pause_cancels_live_timer() {
        let fired = Arc::new(AtomicUsize::new(0));
        let wheel = wheel(Arc::clone(&fired));
        let guard = ExecutionGuard::new();
        let job = Uuid::new_v4();

        assert!(guard.try_reserve_schedule(job));
        let timeout = wheel.submit(async {}, Duration::from_millis(100)).unwrap();
        assert!(guard.attach_timeout(job, timeout));

        assert!(guard.pause(job));
        assert!(!guard.pause(job));
        assert!(guard.is_paused(job));
        assert!(!guard.is_scheduled(job));

        std::thread::sleep(Duration::from_millis(250));
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        assert!(guard.resume(job));
        assert!(!guard.resume(job));
        assert!(!guard.is_paused(job));
    }

    #[test]
    fn test_attach_after_revocation_cancels_timer() {
        let fired = Arc::new(AtomicUsize::new(0));
        let wheel = wheel(Arc::clone(&fired));
        let guard = ExecutionGuard::new();
        let job = Uuid::new_v4();

        assert!(guard.try_reserve_schedule(job));
        guard.pause(job);

        let timeout = wheel.submit(async {}, Duration::from_millis(50)).unwrap();
        assert!(!guard.attach_timeout(job, timeout.clone()));
        assert!(timeout.is_cancelled());

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_occupied_slot_refuses_second_timer() {
        let fired = Arc::new(AtomicUsize::new(0));
        let wheel = wheel(Arc::clone(&fired));
        let guard = ExecutionGuard::new();
        let job = Uuid::new_v4();

        assert!(guard.try_reserve_schedule(job));
        let first = wheel.submit(async {}, Duration::from_secs(60)).unwrap();
        let second = wheel.submit(async {}, Duration::from_secs(60)).unwrap();

        assert!(guard.attach_timeout(job, first.clone()));
        assert!(!guard.attach_timeout(job, second.clone()));
        assert!(second.is_cancelled());
        assert!(!first.is_cancelled());

        // The slot still owns the first timer
        guard.pause(job);
        assert!(first.is_cancelled());
    }
}
