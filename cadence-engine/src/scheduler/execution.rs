//! Fire, execute and complete
//!
//! The timer fires a job on the execution pool. The job is re-fetched,
//! dispatched, and awaited; afterwards it is either retried or handed back to
//! the scheduling pipeline for its next occurrence.

use cadence_core::domain::job::{JobDefinition, JobId};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::Inner;
use crate::retry::RetryDecision;
use crate::strategy::ScheduleStrategy;

impl Inner {
    /// Timer callback of a scheduled or retried job
    pub(crate) async fn fire(self: Arc<Self>, job_id: JobId, attempt: u32) {
        if *self.shutdown.borrow() {
            self.guard.release_schedule(job_id);
            return;
        }

        if !self.guard.try_mark_running(job_id) {
            warn!("Job {} is still running, dropping this occurrence", job_id);
            self.guard.release_schedule(job_id);
            return;
        }
        self.guard.release_schedule(job_id);

        let job = match self.store.find_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!("Job {} disappeared before it could run", job_id);
                self.guard.unmark_running(job_id);
                return;
            }
            Err(e) => {
                error!("Failed to load job {}: {}", job_id, e);
                self.guard.unmark_running(job_id);
                return;
            }
        };

        if !job.enabled || self.guard.is_paused(job_id) {
            debug!("Job {} is disabled or paused, not running", job_id);
            self.guard.unmark_running(job_id);
            return;
        }

        self.execute(job, attempt).await;
    }

    /// Dispatches a job, waits for every target, then completes it
    async fn execute(self: &Arc<Self>, job: JobDefinition, attempt: u32) {
        let job_id = job.id;
        self.hooks.before_dispatch(job_id);

        if let Err(e) = self
            .store
            .update_last_execution_time(job_id, Utc::now())
            .await
        {
            warn!("Failed to record execution time of job {}: {}", job_id, e);
        }

        match self.dispatch_and_wait(&job, attempt).await {
            Ok(()) => {
                info!("Job {} succeeded (attempt {})", job_id, attempt);
                if let Err(e) = self.retry.on_success(&job).await {
                    warn!("Failed to reset retry count of job {}: {}", job_id, e);
                }
            }
            Err(error) => self.handle_failure(&job, &error).await,
        }

        self.guard.unmark_running(job_id);
        self.after_completion(job_id).await;
    }

    /// Succeeds only when every target reports success
    async fn dispatch_and_wait(&self, job: &JobDefinition, attempt: u32) -> Result<(), String> {
        let connections = self.resolver.resolve(&job.executor_key, job.dispatch_mode);
        let handles = self
            .invoker
            .dispatch(job, &connections, attempt)
            .await
            .map_err(|e| e.to_string())?;

        if let Some(first) = handles.first() {
            self.hooks.after_dispatch(job.id, first.invocation_id);
        }

        let mut failures = Vec::new();
        for handle in handles {
            let connection_id = handle.connection_id.clone();
            if let Some(error) = handle.wait().await.error_message() {
                failures.push(format!("{}: {}", connection_id, error));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures.join("; "))
        }
    }

    async fn handle_failure(self: &Arc<Self>, job: &JobDefinition, error: &str) {
        if let RetryDecision::Retry { attempt, delay } = self.retry.on_failure(job, error).await {
            // Still marked running, so the scan cannot take the slot first
            if !self.guard.try_reserve_schedule(job.id) {
                warn!("Job {} already has a pending timer, retry {} dropped", job.id, attempt);
                return;
            }
            if let Err(e) = self.schedule_fire(job.id, delay, attempt) {
                error!("Failed to schedule retry {} of job {}: {}", attempt, job.id, e);
            }
        }
    }

    /// Recomputes completion-anchored schedules and re-submits the job when
    /// its next occurrence is within the wheel threshold
    async fn after_completion(self: &Arc<Self>, job_id: JobId) {
        let now = Utc::now();
        let mut job = match self.store.find_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(e) => {
                warn!("Failed to reload job {} after completion: {}", job_id, e);
                return;
            }
        };

        if !job.enabled || self.guard.is_paused(job_id) {
            return;
        }

        let strategy: &dyn ScheduleStrategy = match self.strategies.get(job.schedule_type) {
            Ok(strategy) => strategy,
            Err(e) => {
                warn!("Job {}: {}", job_id, e);
                return;
            }
        };

        if strategy.anchored_to_completion() {
            let next = match strategy.compute_next(
                &job.schedule_expression,
                job.last_execution_time,
                now,
            ) {
                Ok(next) => next,
                Err(e) => {
                    warn!("Failed to compute next execution of job {}: {}", job_id, e);
                    return;
                }
            };
            if let Err(e) = self.store.update_next_execution_time(job_id, next).await {
                warn!("Failed to store next execution of job {}: {}", job_id, e);
                return;
            }
            job.next_execution_time = next;
        }

        let Some(next) = job.next_execution_time else {
            return;
        };
        let within = (next - now)
            .to_std()
            .map_or(true, |delay| delay < self.config.wheel_threshold);
        if !within {
            return;
        }

        match Arc::clone(self).schedule_job(job, now).await {
            Ok(outcome) => debug!("Re-submitted job {}: {:?}", job_id, outcome),
            Err(e) => warn!("Failed to re-submit job {}: {}", job_id, e),
        }
    }
}
