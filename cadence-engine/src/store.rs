//! Job store
//!
//! The engine reads job definitions through [`JobStore`] and writes back only
//! execution times and retry counts. No operation spans more than one job.

use async_trait::async_trait;
use cadence_core::domain::job::{JobDefinition, JobId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Time window of one scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueWindow {
    /// Oldest execution time that may still run (now minus the misfire threshold)
    pub from: DateTime<Utc>,
    /// Latest execution time that is considered due (now plus the lookahead)
    pub to: DateTime<Utc>,
}

impl DueWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at <= self.to
    }

    /// Whether a job with this next execution time must be returned by a scan
    ///
    /// Times older than `from` are included so the scan can classify them as
    /// misfired and re-base them; unset times are included so they get computed.
    pub fn selects(&self, next_execution_time: Option<DateTime<Utc>>) -> bool {
        match next_execution_time {
            Some(at) => at <= self.to,
            None => true,
        }
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Enabled jobs selected by the window, see [`DueWindow::selects`]
    async fn find_due(&self, window: DueWindow) -> Result<Vec<JobDefinition>, StoreError>;

    async fn find_by_id(&self, id: JobId) -> Result<Option<JobDefinition>, StoreError>;

    async fn update_next_execution_time(
        &self,
        id: JobId,
        next: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn update_last_execution_time(
        &self,
        id: JobId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Increments the retry count and returns the new value
    async fn increment_retry_count(&self, id: JobId) -> Result<u32, StoreError>;

    async fn reset_retry_count(&self, id: JobId) -> Result<(), StoreError>;
}

/// Job store kept in process memory
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, JobDefinition>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a job definition
    pub async fn insert(&self, job: JobDefinition) {
        self.jobs.write().await.insert(job.id, job);
    }

    pub async fn get(&self, id: JobId) -> Option<JobDefinition> {
        self.jobs.read().await.get(&id).cloned()
    }

    async fn update<F>(&self, id: JobId, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut JobDefinition),
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        apply(job);
        Ok(())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn find_due(&self, window: DueWindow) -> Result<Vec<JobDefinition>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut due: Vec<JobDefinition> = jobs
            .values()
            .filter(|job| job.enabled && window.selects(job.next_execution_time))
            .cloned()
            .collect();
        due.sort_by_key(|job| job.next_execution_time);
        Ok(due)
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<JobDefinition>, StoreError> {
        Ok(self.get(id).await)
    }

    async fn update_next_execution_time(
        &self,
        id: JobId,
        next: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.update(id, |job| job.next_execution_time = next).await
    }

    async fn update_last_execution_time(
        &self,
        id: JobId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update(id, |job| job.last_execution_time = Some(at))
            .await
    }

    async fn increment_retry_count(&self, id: JobId) -> Result<u32, StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.retry_count = (job.retry_count + 1).min(job.max_retries);
        Ok(job.retry_count)
    }

    async fn reset_retry_count(&self, id: JobId) -> Result<(), StoreError> {
        self.update(id, |job| job.retry_count = 0).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::domain::job::ScheduleType;
    use chrono::Duration;

    fn job_at(next: Option<DateTime<Utc>>) -> JobDefinition {
        let job = JobDefinition::new("sync", "workers", ScheduleType::FixedRate, "30s");
        match next {
            Some(at) => job.with_next_execution_time(at),
            None => job,
        }
    }

    #[tokio::test]
    async fn test_find_due_selection() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();
        let window = DueWindow {
            from: now - Duration::seconds(10),
            to: now + Duration::seconds(10),
        };

        let due = job_at(Some(now + Duration::seconds(5)));
        let stale = job_at(Some(now - Duration::seconds(60)));
        let unset = job_at(None);
        let distant = job_at(Some(now + Duration::hours(1)));
        let mut disabled = job_at(Some(now));
        disabled.enabled = false;

        for job in [&due, &stale, &unset, &distant, &disabled] {
            store.insert(job.clone()).await;
        }

        let found: Vec<JobId> = store
            .find_due(window)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect();

        assert_eq!(found.len(), 3);
        assert!(found.contains(&due.id));
        assert!(found.contains(&stale.id));
        assert!(found.contains(&unset.id));
        assert!(window.contains(now));
        assert!(!window.contains(now - Duration::seconds(60)));
    }

    #[tokio::test]
    async fn test_retry_count_is_capped() {
        let store = InMemoryJobStore::new();
        let job = job_at(None).with_max_retries(2);
        store.insert(job.clone()).await;

        assert_eq!(store.increment_retry_count(job.id).await.unwrap(), 1);
        assert_eq!(store.increment_retry_count(job.id).await.unwrap(), 2);
        assert_eq!(store.increment_retry_count(job.id).await.unwrap(), 2);

        store.reset_retry_count(job.id).await.unwrap();
        assert_eq!(store.get(job.id).await.unwrap().retry_count, 0);
    }

    #[tokio::test]
    async fn test_updates_on_missing_job_fail() {
        let store = InMemoryJobStore::new();
        let id = uuid::Uuid::new_v4();
        let err = store
            .update_next_execution_time(id, Some(Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(missing) if missing == id));
        assert!(store.find_by_id(id).await.unwrap().is_none());
    }
}
