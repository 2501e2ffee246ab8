//! Job Definition Repository
//!
//! Handles all database operations related to job definitions, and exposes
//! them to the engine as a [`JobStore`].

use async_trait::async_trait;
use cadence_core::domain::job::{JobDefinition, JobId};
use cadence_engine::{DueWindow, JobStore, StoreError};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const COLUMNS: &str = "id, handler, executor_key, schedule_type, schedule_expression, \
                       dispatch_mode, next_execution_time, last_execution_time, enabled, \
                       retry_count, max_retries, parameters";

/// Insert a new job definition
pub async fn create(pool: &PgPool, job: &JobDefinition) -> Result<(), sqlx::Error> {
    let parameters = serde_json::to_value(&job.parameters)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    sqlx::query(
        r#"
        INSERT INTO job_definitions (id, handler, executor_key, schedule_type, schedule_expression,
                                     dispatch_mode, next_execution_time, last_execution_time,
                                     enabled, retry_count, max_retries, parameters)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(job.id)
    .bind(&job.handler)
    .bind(&job.executor_key)
    .bind(job.schedule_type.as_str())
    .bind(&job.schedule_expression)
    .bind(job.dispatch_mode.as_str())
    .bind(job.next_execution_time)
    .bind(job.last_execution_time)
    .bind(job.enabled)
    .bind(to_db_count(job.retry_count))
    .bind(to_db_count(job.max_retries))
    .bind(parameters)
    .execute(pool)
    .await?;

    Ok(())
}

/// Find a job definition by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<JobDefinition>, sqlx::Error> {
    let row = sqlx::query_as::<_, JobDefinitionRow>(&format!(
        "SELECT {} FROM job_definitions WHERE id = $1",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(JobDefinition::try_from).transpose()
}

/// List all job definitions, newest first
pub async fn list_all(pool: &PgPool) -> Result<Vec<JobDefinition>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobDefinitionRow>(&format!(
        "SELECT {} FROM job_definitions ORDER BY created_at DESC",
        COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(JobDefinition::try_from).collect()
}

/// Enabled jobs due no later than `until`, including those never scheduled
pub async fn find_due(
    pool: &PgPool,
    until: DateTime<Utc>,
) -> Result<Vec<JobDefinition>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobDefinitionRow>(&format!(
        r#"
        SELECT {} FROM job_definitions
        WHERE enabled = TRUE
          AND (next_execution_time IS NULL OR next_execution_time <= $1)
        ORDER BY next_execution_time ASC NULLS FIRST
        "#,
        COLUMNS
    ))
    .bind(until)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(JobDefinition::try_from).collect()
}

pub async fn update_next_execution_time(
    pool: &PgPool,
    id: Uuid,
    next: Option<DateTime<Utc>>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE job_definitions SET next_execution_time = $1 WHERE id = $2")
        .bind(next)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn update_last_execution_time(
    pool: &PgPool,
    id: Uuid,
    at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE job_definitions SET last_execution_time = $1 WHERE id = $2")
        .bind(at)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Increment the retry count, never past `max_retries`
pub async fn increment_retry_count(pool: &PgPool, id: Uuid) -> Result<Option<u32>, sqlx::Error> {
    let count: Option<i32> = sqlx::query_scalar(
        r#"
        UPDATE job_definitions
        SET retry_count = LEAST(retry_count + 1, max_retries)
        WHERE id = $1
        RETURNING retry_count
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(count.map(from_db_count))
}

pub async fn reset_retry_count(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE job_definitions SET retry_count = 0 WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Job Store
// =============================================================================

/// [`JobStore`] backed by the `job_definitions` table
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn find_due(&self, window: DueWindow) -> Result<Vec<JobDefinition>, StoreError> {
        find_due(&self.pool, window.to).await.map_err(backend)
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<JobDefinition>, StoreError> {
        find_by_id(&self.pool, id).await.map_err(backend)
    }

    async fn update_next_execution_time(
        &self,
        id: JobId,
        next: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        found(id, update_next_execution_time(&self.pool, id, next).await)
    }

    async fn update_last_execution_time(
        &self,
        id: JobId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        found(id, update_last_execution_time(&self.pool, id, at).await)
    }

    async fn increment_retry_count(&self, id: JobId) -> Result<u32, StoreError> {
        increment_retry_count(&self.pool, id)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound(id))
    }

    async fn reset_retry_count(&self, id: JobId) -> Result<(), StoreError> {
        found(id, reset_retry_count(&self.pool, id).await)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn found(id: JobId, updated: Result<bool, sqlx::Error>) -> Result<(), StoreError> {
    match updated {
        Ok(true) => Ok(()),
        Ok(false) => Err(StoreError::NotFound(id)),
        Err(e) => Err(backend(e)),
    }
}

fn to_db_count(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

fn from_db_count(count: i32) -> u32 {
    u32::try_from(count).unwrap_or(0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobDefinitionRow {
    id: Uuid,
    handler: String,
    executor_key: String,
    schedule_type: String,
    schedule_expression: String,
    dispatch_mode: String,
    next_execution_time: Option<DateTime<Utc>>,
    last_execution_time: Option<DateTime<Utc>>,
    enabled: bool,
    retry_count: i32,
    max_retries: i32,
    parameters: serde_json::Value,
}

impl TryFrom<JobDefinitionRow> for JobDefinition {
    type Error = sqlx::Error;

    fn try_from(row: JobDefinitionRow) -> Result<Self, Self::Error> {
        let decode = |column: &str, reason: String| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: reason.into(),
        };

        let schedule_type = row
            .schedule_type
            .parse()
            .map_err(|e| decode("schedule_type", e))?;
        let dispatch_mode = row
            .dispatch_mode
            .parse()
            .map_err(|e| decode("dispatch_mode", e))?;
        let parameters = serde_json::from_value(row.parameters).unwrap_or_default();

        Ok(JobDefinition {
            id: row.id,
            handler: row.handler,
            executor_key: row.executor_key,
            schedule_type,
            schedule_expression: row.schedule_expression,
            dispatch_mode,
            next_execution_time: row.next_execution_time,
            last_execution_time: row.last_execution_time,
            enabled: row.enabled,
            retry_count: from_db_count(row.retry_count),
            max_retries: from_db_count(row.max_retries),
            parameters,
        })
    }
}
