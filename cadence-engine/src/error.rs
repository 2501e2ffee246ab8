//! Error types for the Cadence engine

use cadence_core::domain::job::{JobId, ScheduleType};
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// A schedule expression could not be turned into an execution time
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The expression is malformed for its schedule type
    #[error("Invalid {schedule_type} expression '{expression}': {reason}")]
    InvalidExpression {
        schedule_type: ScheduleType,
        expression: String,
        reason: String,
    },

    /// No strategy was registered for the schedule type
    #[error("No schedule strategy registered for {0}")]
    StrategyNotRegistered(ScheduleType),
}

impl ScheduleError {
    pub fn invalid(
        schedule_type: ScheduleType,
        expression: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidExpression {
            schedule_type,
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }
}

/// The timer wheel refused a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimerError {
    /// The wheel has been stopped
    #[error("Timer wheel is shut down")]
    Shutdown,

    /// Too many timeouts are pending
    #[error("Timer wheel overloaded ({pending} pending, max {max})")]
    Overloaded { pending: usize, max: usize },
}

/// A request could not be handed to an executor connection
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No active connection serves the executor key
    #[error("No active connection for executor '{0}'")]
    NoActiveConnection(String),

    /// The transport rejected the request
    #[error("Send to connection {connection_id} rejected: {reason}")]
    SendRejected {
        connection_id: String,
        reason: String,
    },

    /// The connection went away before the request could be sent
    #[error("Connection {0} is closed")]
    ConnectionClosed(String),
}

/// Job store failure
#[derive(Debug, Error)]
pub enum StoreError {
    /// The job does not exist
    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// Backend specific failure (database, network, ...)
    #[error("Job store error: {0}")]
    Backend(String),
}

/// Umbrella error for the engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The job cannot be run in its current state
    #[error("Job {job_id} cannot run: {reason}")]
    NotRunnable { job_id: JobId, reason: String },
}

impl EngineError {
    /// Check if this error means the job does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound(_)))
    }
}
