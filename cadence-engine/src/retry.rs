//! Retry handling
//!
//! A failed execution is retried after a fixed backoff while the job's retry
//! budget lasts. Once the budget is exhausted the failure is surfaced once
//! through [`LifecycleHooks::on_terminal_failure`] and the count is reset for
//! the job's next regular occurrence. A store that cannot record the retry
//! makes the failure terminal right away.

use cadence_core::domain::job::JobDefinition;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::StoreError;
use crate::hooks::LifecycleHooks;
use crate::store::JobStore;

/// Fixed backoff retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(backoff: Duration) -> Self {
        Self { backoff }
    }
}

/// What happens after a failed execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run again after `delay`; `attempt` counts retries starting at 1
    Retry { attempt: u32, delay: Duration },
    /// No budget left, the failure is terminal
    Exhausted,
}

/// Applies the retry policy to failed executions
pub struct RetryScheduler {
    policy: RetryPolicy,
    store: Arc<dyn JobStore>,
    hooks: Arc<dyn LifecycleHooks>,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy, store: Arc<dyn JobStore>, hooks: Arc<dyn LifecycleHooks>) -> Self {
        Self {
            policy,
            store,
            hooks,
        }
    }

    /// Records a failure and decides whether to retry
    ///
    /// With budget left the retry count is incremented and persisted. The
    /// caller is responsible for arming the retry timer. The terminal hook
    /// fires before the count is reset, so a store failure cannot swallow it.
    ///
    /// # Arguments
    /// * `job` - The job as it was when the execution started
    /// * `error` - Description of the failure
    pub async fn on_failure(&self, job: &JobDefinition, error: &str) -> RetryDecision {
        if job.has_retry_budget() {
            match self.store.increment_retry_count(job.id).await {
                Ok(attempt) => {
                    info!(
                        "Job {} failed ({}), retry {}/{} in {:?}",
                        job.id, error, attempt, job.max_retries, self.policy.backoff
                    );
                    return RetryDecision::Retry {
                        attempt,
                        delay: self.policy.backoff,
                    };
                }
                Err(e) => error!(
                    "Failed to record retry of job {}, giving up: {}",
                    job.id, e
                ),
            }
        } else {
            warn!(
                "Job {} failed ({}), retry budget of {} exhausted",
                job.id, error, job.max_retries
            );
        }

        self.hooks.on_terminal_failure(job.id, error);

        if job.retry_count > 0 {
            if let Err(e) = self.store.reset_retry_count(job.id).await {
                warn!("Failed to reset retry count of job {}: {}", job.id, e);
            }
        }

        RetryDecision::Exhausted
    }

    /// Clears the retry count after a successful execution
    pub async fn on_success(&self, job: &JobDefinition) -> Result<(), StoreError> {
        if job.retry_count > 0 {
            self.store.reset_retry_count(job.id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DueWindow, InMemoryJobStore};
    use async_trait::async_trait;
    use cadence_core::domain::job::{JobId, ScheduleType};
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    /// In-memory store whose retry bookkeeping can be made to fail
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryJobStore,
        fail_increment: bool,
        fail_reset: bool,
    }

    #[async_trait]
    impl JobStore for FlakyStore {
        async fn find_due(&self, window: DueWindow) -> Result<Vec<JobDefinition>, StoreError> {
            self.inner.find_due(window).await
        }

        async fn find_by_id(&self, id: JobId) -> Result<Option<JobDefinition>, StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn update_next_execution_time(
            &self,
            id: JobId,
            next: Option<DateTime<Utc>>,
        ) -> Result<(), StoreError> {
            self.inner.update_next_execution_time(id, next).await
        }

        async fn update_last_execution_time(
            &self,
            id: JobId,
            at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.inner.update_last_execution_time(id, at).await
        }

        async fn increment_retry_count(&self, id: JobId) -> Result<u32, StoreError> {
            if self.fail_increment {
                return Err(StoreError::Backend("connection reset".to_string()));
            }
            self.inner.increment_retry_count(id).await
        }

        async fn reset_retry_count(&self, id: JobId) -> Result<(), StoreError> {
            if self.fail_reset {
                return Err(StoreError::Backend("connection reset".to_string()));
            }
            self.inner.reset_retry_count(id).await
        }
    }

    #[derive(Default)]
    struct TerminalRecorder(Mutex<Vec<(JobId, String)>>);

    impl LifecycleHooks for TerminalRecorder {
        fn on_terminal_failure(&self, job_id: JobId, error: &str) {
            self.0.lock().unwrap().push((job_id, error.to_string()));
        }
    }

    #[tokio::test]
    async fn test_budget_then_terminal() {
        let store = Arc::new(InMemoryJobStore::new());
        let hooks = Arc::new(TerminalRecorder::default());
        let retry = RetryScheduler::new(
            RetryPolicy::new(Duration::from_secs(30)),
            store.clone(),
            hooks.clone(),
        );

        let job = JobDefinition::new("export", "workers", ScheduleType::Manual, "").with_max_retries(2);
        store.insert(job.clone()).await;

        let mut decisions = Vec::new();
        for _ in 0..3 {
            let current = store.get(job.id).await.unwrap();
            decisions.push(retry.on_failure(&current, "exit 1").await);
        }

        assert_eq!(
            decisions,
            vec![
                RetryDecision::Retry {
                    attempt: 1,
                    delay: Duration::from_secs(30)
                },
                RetryDecision::Retry {
                    attempt: 2,
                    delay: Duration::from_secs(30)
                },
                RetryDecision::Exhausted,
            ]
        );
        assert_eq!(hooks.0.lock().unwrap().len(), 1);
        assert_eq!(store.get(job.id).await.unwrap().retry_count, 0);
    }

    #[tokio::test]
    async fn test_no_budget_is_terminal_immediately() {
        let store = Arc::new(InMemoryJobStore::new());
        let hooks = Arc::new(TerminalRecorder::default());
        let retry = RetryScheduler::new(
            RetryPolicy::new(Duration::from_secs(30)),
            store.clone(),
            hooks.clone(),
        );

        let job = JobDefinition::new("export", "workers", ScheduleType::Manual, "");
        store.insert(job.clone()).await;

        assert_eq!(
            retry.on_failure(&job, "boom").await,
            RetryDecision::Exhausted
        );
        assert_eq!(hooks.0.lock().unwrap()[0], (job.id, "boom".to_string()));
    }

    #[tokio::test]
    async fn test_terminal_failure_reported_when_reset_fails() {
        let store = Arc::new(FlakyStore {
            fail_reset: true,
            ..FlakyStore::default()
        });
        let hooks = Arc::new(TerminalRecorder::default());
        let retry = RetryScheduler::new(
            RetryPolicy::new(Duration::from_secs(30)),
            store.clone(),
            hooks.clone(),
        );

        let job = JobDefinition::new("export", "workers", ScheduleType::Manual, "").with_max_retries(1);
        store.inner.insert(job.clone()).await;
        store.inner.increment_retry_count(job.id).await.unwrap();
        let exhausted = store.inner.get(job.id).await.unwrap();

        assert_eq!(retry.on_failure(&exhausted, "exit 1").await, RetryDecision::Exhausted);
        assert_eq!(hooks.0.lock().unwrap()[0], (job.id, "exit 1".to_string()));
    }

    #[tokio::test]
    async fn test_unrecorded_retry_is_terminal() {
        let store = Arc::new(FlakyStore {
            fail_increment: true,
            ..FlakyStore::default()
        });
        let hooks = Arc::new(TerminalRecorder::default());
        let retry = RetryScheduler::new(
            RetryPolicy::new(Duration::from_secs(30)),
            store.clone(),
            hooks.clone(),
        );

        let job = JobDefinition::new("export", "workers", ScheduleType::Manual, "").with_max_retries(3);
        store.inner.insert(job.clone()).await;

        assert_eq!(retry.on_failure(&job, "exit 1").await, RetryDecision::Exhausted);
        assert_eq!(hooks.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_success_resets_count() {
        let store = Arc::new(InMemoryJobStore::new());
        let retry = RetryScheduler::new(
            RetryPolicy::new(Duration::from_secs(30)),
            store.clone(),
            Arc::new(crate::hooks::NoopHooks),
        );

        let job = JobDefinition::new("export", "workers", ScheduleType::Manual, "").with_max_retries(3);
        store.insert(job.clone()).await;
        store.increment_retry_count(job.id).await.unwrap();

        let current = store.get(job.id).await.unwrap();
        retry.on_success(&current).await.unwrap();
        assert_eq!(store.get(job.id).await.unwrap().retry_count, 0);
    }
}
