//! API Module
//!
//! HTTP and WebSocket layer of the coordinator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod executor;
pub mod health;
pub mod job;

use axum::{
    Router,
    routing::{get, post},
};
use cadence_engine::strategy::StrategyRegistry;
use cadence_engine::{ChannelTransport, Scheduler};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state of all handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub scheduler: Arc<Scheduler>,
    pub transport: Arc<ChannelTransport>,
    /// Used to validate schedule expressions of new jobs
    pub strategies: Arc<StrategyRegistry>,
}

impl AppState {
    pub fn new(pool: PgPool, scheduler: Arc<Scheduler>, transport: Arc<ChannelTransport>) -> Self {
        Self {
            pool,
            scheduler,
            transport,
            strategies: Arc::new(StrategyRegistry::with_defaults()),
        }
    }
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Job endpoints
        .route("/api/jobs", post(job::create_job).get(job::list_jobs))
        .route("/api/jobs/{id}", get(job::get_job))
        .route("/api/jobs/{id}/pause", post(job::pause_job))
        .route("/api/jobs/{id}/resume", post(job::resume_job))
        .route("/api/jobs/{id}/trigger", post(job::trigger_job))
        // Executor connections
        .route("/api/executors/{key}/connect", get(executor::connect))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
