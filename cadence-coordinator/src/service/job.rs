//! Job Service
//!
//! Registration of job definitions and runtime control through the scheduler.

use cadence_core::domain::job::{JobDefinition, ScheduleType};
use cadence_core::dto::job::CreateJobDefinition;
use cadence_engine::strategy::StrategyRegistry;
use cadence_engine::{EngineError, Scheduler};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::job_repository;

/// Service error type
#[derive(Debug)]
pub enum JobError {
    NotFound(Uuid),
    InvalidState(String),
    ValidationError(String),
    DatabaseError(sqlx::Error),
    EngineError(EngineError),
}

impl From<sqlx::Error> for JobError {
    fn from(err: sqlx::Error) -> Self {
        JobError::DatabaseError(err)
    }
}

impl From<EngineError> for JobError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Store(cadence_engine::StoreError::NotFound(id)) => JobError::NotFound(id),
            EngineError::NotRunnable { reason, .. } => JobError::InvalidState(reason),
            other => JobError::EngineError(other),
        }
    }
}

/// Validate and register a new job definition
///
/// The first execution time is left unset; the next scan computes it.
pub async fn create_job(
    pool: &PgPool,
    strategies: &StrategyRegistry,
    req: CreateJobDefinition,
) -> Result<JobDefinition, JobError> {
    validate(strategies, &req)?;

    let job = JobDefinition::from(req);
    job_repository::create(pool, &job).await?;

    tracing::info!(
        "Job created: {} ({} {} '{}') for executor '{}'",
        job.id,
        job.handler,
        job.schedule_type,
        job.schedule_expression,
        job.executor_key
    );

    Ok(job)
}

/// Get a job definition by ID
pub async fn get_job(pool: &PgPool, id: Uuid) -> Result<JobDefinition, JobError> {
    let job = job_repository::find_by_id(pool, id)
        .await?
        .ok_or(JobError::NotFound(id))?;

    Ok(job)
}

/// List all job definitions
pub async fn list_jobs(pool: &PgPool) -> Result<Vec<JobDefinition>, JobError> {
    let jobs = job_repository::list_all(pool).await?;
    Ok(jobs)
}

pub async fn pause_job(scheduler: &Scheduler, id: Uuid) -> Result<(), JobError> {
    scheduler.pause(id).await?;
    Ok(())
}

pub async fn resume_job(scheduler: &Scheduler, id: Uuid) -> Result<(), JobError> {
    scheduler.resume(id).await?;
    Ok(())
}

pub async fn trigger_job(scheduler: &Scheduler, id: Uuid) -> Result<(), JobError> {
    scheduler.trigger(id).await?;
    Ok(())
}

// =============================================================================
// Validation
// =============================================================================

fn validate(strategies: &StrategyRegistry, req: &CreateJobDefinition) -> Result<(), JobError> {
    if req.handler.trim().is_empty() {
        return Err(JobError::ValidationError(
            "Handler cannot be empty".to_string(),
        ));
    }

    if req.executor_key.trim().is_empty() {
        return Err(JobError::ValidationError(
            "Executor key cannot be empty".to_string(),
        ));
    }

    let strategy = strategies
        .get(req.schedule_type)
        .map_err(|e| JobError::ValidationError(e.to_string()))?;

    if req.schedule_type != ScheduleType::Manual && !strategy.validate(&req.schedule_expression) {
        return Err(JobError::ValidationError(format!(
            "Invalid {} expression '{}'",
            req.schedule_type, req.schedule_expression
        )));
    }

    Ok(())
}
