//! Job API Handlers
//!
//! HTTP endpoints for job registration and runtime control.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use cadence_core::domain::job::JobDefinition;
use cadence_core::dto::job::CreateJobDefinition;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::job_service;

// =============================================================================
// Job Definition Endpoints
// =============================================================================

/// POST /api/jobs
/// Register a new job definition
pub async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobDefinition>,
) -> ApiResult<(StatusCode, Json<JobDefinition>)> {
    tracing::info!("Creating job '{}' for executor '{}'", req.handler, req.executor_key);

    let job = job_service::create_job(&state.pool, &state.strategies, req).await?;

    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/jobs
pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<Vec<JobDefinition>>> {
    tracing::debug!("Listing jobs");

    let jobs = job_service::list_jobs(&state.pool).await?;

    Ok(Json(jobs))
}

/// GET /api/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobDefinition>> {
    tracing::debug!("Getting job: {}", id);

    let job = job_service::get_job(&state.pool, id).await?;

    Ok(Json(job))
}

// =============================================================================
// Runtime Control Endpoints
// =============================================================================

/// POST /api/jobs/{id}/pause
pub async fn pause_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    job_service::pause_job(&state.scheduler, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/jobs/{id}/resume
pub async fn resume_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    job_service::resume_job(&state.scheduler, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/jobs/{id}/trigger
/// Run a job now, outside of its schedule
pub async fn trigger_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Triggering job: {}", id);

    job_service::trigger_job(&state.scheduler, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
