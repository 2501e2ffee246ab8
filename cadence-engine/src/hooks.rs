//! Lifecycle hooks
//!
//! Business-layer listeners implement [`LifecycleHooks`] to observe dispatches
//! and outcomes. Every method has a no-op default. Hooks are called inline, so
//! implementations must not block.

use cadence_core::domain::event::StreamedEvent;
use cadence_core::domain::invocation::{InvocationId, InvocationResult};
use cadence_core::domain::job::JobId;
use tracing::{debug, error, info, warn};

pub trait LifecycleHooks: Send + Sync {
    /// A job is about to be dispatched
    fn before_dispatch(&self, _job_id: JobId) {}

    /// A request for the job was handed to a connection
    fn after_dispatch(&self, _job_id: JobId, _invocation_id: InvocationId) {}

    /// An executor streamed an intermediate event
    fn on_streamed(&self, _invocation_id: InvocationId, _event: &StreamedEvent) {}

    /// An invocation completed successfully
    fn on_complete(&self, _invocation_id: InvocationId, _result: &InvocationResult) {}

    /// An invocation failed or timed out
    fn on_failure(&self, _invocation_id: InvocationId, _error: &str) {}

    /// A job failed with its retry budget exhausted
    ///
    /// Called exactly once per exhausted failure; no automatic action follows.
    fn on_terminal_failure(&self, _job_id: JobId, _error: &str) {}
}

/// Hooks that do nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl LifecycleHooks for NoopHooks {}

/// Hooks that log every lifecycle event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHooks;

impl LifecycleHooks for TracingHooks {
    fn before_dispatch(&self, job_id: JobId) {
        debug!("Dispatching job {}", job_id);
    }

    fn after_dispatch(&self, job_id: JobId, invocation_id: InvocationId) {
        info!("Job {} dispatched as invocation {}", job_id, invocation_id);
    }

    fn on_streamed(&self, invocation_id: InvocationId, event: &StreamedEvent) {
        debug!(
            "Invocation {} [{:?}] {}",
            invocation_id, event.level, event.message
        );
    }

    fn on_complete(&self, invocation_id: InvocationId, _result: &InvocationResult) {
        info!("Invocation {} completed", invocation_id);
    }

    fn on_failure(&self, invocation_id: InvocationId, error: &str) {
        warn!("Invocation {} failed: {}", invocation_id, error);
    }

    fn on_terminal_failure(&self, job_id: JobId, error: &str) {
        error!("Job {} failed with no retries left: {}", job_id, error);
    }
}
