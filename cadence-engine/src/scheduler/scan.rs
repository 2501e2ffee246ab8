//! Scan and schedule
//!
//! Each scan pulls the due jobs from the store and runs every candidate
//! through [`Inner::schedule_job`] in isolation. The same pipeline
//! re-submits a job after it completes.

use cadence_core::domain::job::{JobDefinition, JobId};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::Inner;
use crate::error::{Result, TimerError};
use crate::store::DueWindow;
use crate::strategy::ScheduleStrategy;

/// Where a job's next execution time stands relative to now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// In the future (or exactly now), fire after the delay
    Ahead(Duration),
    /// Late, but within the misfire threshold; fire immediately
    DueLate,
    /// Later than the misfire threshold; skip this occurrence
    Misfired,
}

/// Classifies a next execution time
///
/// A time exactly `misfire_threshold` in the past is still due-late.
pub fn classify(
    next: DateTime<Utc>,
    now: DateTime<Utc>,
    misfire_threshold: Duration,
) -> Classification {
    if let Ok(delay) = (next - now).to_std() {
        return Classification::Ahead(delay);
    }

    let lateness = (now - next).to_std().unwrap_or(Duration::ZERO);
    if lateness > misfire_threshold {
        Classification::Misfired
    } else {
        Classification::DueLate
    }
}

/// Why a job was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Paused,
    Running,
    AlreadyScheduled,
    NotAutoScheduled,
    NoNextTime,
}

/// Result of running one job through the scheduling pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// A timer entry was created
    Scheduled(Duration),
    /// The occurrence was skipped and the next time re-based
    Misfired,
    /// Too far ahead for the timer wheel; a later scan picks it up
    Deferred,
    Skipped(SkipReason),
}

/// Counters of one scan
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub candidates: usize,
    pub scheduled: usize,
    pub misfired: usize,
    pub deferred: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl ScanReport {
    fn record(&mut self, outcome: ScheduleOutcome) {
        match outcome {
            ScheduleOutcome::Scheduled(_) => self.scheduled += 1,
            ScheduleOutcome::Misfired => self.misfired += 1,
            ScheduleOutcome::Deferred => self.deferred += 1,
            ScheduleOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

impl Inner {
    /// Runs one scan cycle
    ///
    /// A failing job is logged and counted; it never aborts the scan.
    pub(crate) async fn scan_once(self: &Arc<Self>, now: DateTime<Utc>) -> ScanReport {
        let mut report = ScanReport::default();
        let window = DueWindow {
            from: now - to_chrono(self.config.misfire_threshold),
            to: now + to_chrono(self.config.lookahead_window),
        };

        let jobs = match self.store.find_due(window).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Failed to fetch due jobs: {}", e);
                report.errors += 1;
                return report;
            }
        };
        report.candidates = jobs.len();

        for job in jobs {
            let job_id = job.id;
            // Spawned so a panic stays contained to this job
            let task = self.handle.spawn(Arc::clone(self).schedule_job(job, now));
            match task.await {
                Ok(Ok(outcome)) => {
                    debug!("Job {}: {:?}", job_id, outcome);
                    report.record(outcome);
                }
                Ok(Err(e)) => {
                    error!("Failed to schedule job {}: {}", job_id, e);
                    report.errors += 1;
                }
                Err(e) => {
                    error!("Scheduling job {} aborted: {}", job_id, e);
                    report.errors += 1;
                }
            }
        }

        if report.scheduled > 0 || report.misfired > 0 {
            info!(
                "Scan: {} scheduled, {} misfired, {} deferred, {} skipped, {} errors",
                report.scheduled, report.misfired, report.deferred, report.skipped, report.errors
            );
        }

        report
    }

    /// Turns a job into a timer entry if it is due soon enough
    ///
    /// The job's single timer slot is reserved before anything is computed,
    /// so two concurrent callers can never both advance the next execution time.
    pub(crate) async fn schedule_job(
        self: Arc<Self>,
        job: JobDefinition,
        now: DateTime<Utc>,
    ) -> Result<ScheduleOutcome> {
        let job_id = job.id;

        if self.guard.is_paused(job_id) {
            return Ok(ScheduleOutcome::Skipped(SkipReason::Paused));
        }
        if self.guard.is_running(job_id) {
            return Ok(ScheduleOutcome::Skipped(SkipReason::Running));
        }

        let strategy = self.strategies.get(job.schedule_type)?;
        if !strategy.needs_auto_schedule() {
            return Ok(ScheduleOutcome::Skipped(SkipReason::NotAutoScheduled));
        }

        if !self.guard.try_reserve_schedule(job_id) {
            return Ok(ScheduleOutcome::Skipped(SkipReason::AlreadyScheduled));
        }

        match self.plan(&job, strategy, now).await {
            Ok(ScheduleOutcome::Scheduled(delay)) => {
                self.schedule_fire(job_id, delay, 0)?;
                Ok(ScheduleOutcome::Scheduled(delay))
            }
            Ok(outcome) => {
                self.guard.release_schedule(job_id);
                Ok(outcome)
            }
            Err(e) => {
                self.guard.release_schedule(job_id);
                Err(e)
            }
        }
    }

    async fn plan(
        &self,
        job: &JobDefinition,
        strategy: &dyn ScheduleStrategy,
        now: DateTime<Utc>,
    ) -> Result<ScheduleOutcome> {
        let expression = job.schedule_expression.as_str();

        let next = match job.next_execution_time {
            Some(next) => next,
            None => {
                let Some(next) = strategy.compute_next(expression, job.last_execution_time, now)?
                else {
                    return Ok(ScheduleOutcome::Skipped(SkipReason::NoNextTime));
                };
                self.store
                    .update_next_execution_time(job.id, Some(next))
                    .await?;
                next
            }
        };

        let delay = match classify(next, now, self.config.misfire_threshold) {
            Classification::Ahead(delay) => delay,
            Classification::DueLate => {
                debug!("Job {} is late (due {}), firing now", job.id, next);
                Duration::ZERO
            }
            Classification::Misfired => {
                let rebased = strategy.compute_next(expression, Some(now), now)?;
                warn!(
                    "Job {} misfired (due {}), next execution moved to {:?}",
                    job.id, next, rebased
                );
                self.store
                    .update_next_execution_time(job.id, rebased)
                    .await?;
                return Ok(ScheduleOutcome::Misfired);
            }
        };

        if delay >= self.config.wheel_threshold {
            return Ok(ScheduleOutcome::Deferred);
        }

        // Advance past the occurrence now entering the wheel, so a long
        // execution cannot make the next scan miss the following one
        let following = strategy.compute_next(expression, Some(next), now)?;
        self.store
            .update_next_execution_time(job.id, following)
            .await?;

        Ok(ScheduleOutcome::Scheduled(delay))
    }

    /// Arms the fire timer for a job whose slot is already reserved
    ///
    /// Releases the reservation if the wheel refuses the entry.
    pub(crate) fn schedule_fire(
        self: &Arc<Self>,
        job_id: JobId,
        delay: Duration,
        attempt: u32,
    ) -> std::result::Result<(), TimerError> {
        let inner = Arc::clone(self);
        match self
            .timer
            .submit(async move { inner.fire(job_id, attempt).await }, delay)
        {
            Ok(timeout) => {
                if !self.guard.attach_timeout(job_id, timeout) {
                    debug!("Job {} left the schedule before its timer was attached", job_id);
                }
                Ok(())
            }
            Err(e) => {
                self.guard.release_schedule(job_id);
                Err(e)
            }
        }
    }
}
