//! Dispatch invoker
//!
//! Sends execute requests over the transport and correlates the streamed and
//! final responses back to the waiting caller. Every invocation carries its
//! own eviction deadline, armed as a runtime sleep so it fires even while the
//! timer wheel is busy handing out work.

use cadence_core::domain::event::StreamedEvent;
use cadence_core::domain::invocation::{ExecutionOutcome, InvocationId, InvocationResult};
use cadence_core::domain::job::{DispatchMode, JobDefinition, JobId};
use cadence_core::dto::dispatch::ExecuteRequest;
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::registry::{InvocationKey, InvocationRegistry, PendingInvocation, SettledInvocation};
use crate::error::DispatchError;
use crate::hooks::LifecycleHooks;
use crate::transport::Transport;

/// Awaitable result of one dispatched request
#[derive(Debug)]
pub struct InvocationHandle {
    pub invocation_id: InvocationId,
    pub connection_id: String,
    pub job_id: JobId,
    rx: oneshot::Receiver<InvocationResult>,
}

impl InvocationHandle {
    /// Waits until the invocation settles
    pub async fn wait(self) -> InvocationResult {
        self.rx
            .await
            .unwrap_or_else(|_| InvocationResult::Failed("invocation abandoned".to_string()))
    }
}

/// Sends execution requests and routes their responses back
pub struct DispatchInvoker {
    registry: Arc<InvocationRegistry>,
    transport: Arc<dyn Transport>,
    hooks: Arc<dyn LifecycleHooks>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl DispatchInvoker {
    /// Creates an invoker
    ///
    /// # Arguments
    /// * `transport` - Delivers requests to connections
    /// * `hooks` - Notified of streamed events and settlements
    /// * `timeout` - How long an invocation may wait for its final response
    pub fn new(
        transport: Arc<dyn Transport>,
        hooks: Arc<dyn LifecycleHooks>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry: Arc::new(InvocationRegistry::new()),
            transport,
            hooks,
            next_id: AtomicU64::new(1),
            timeout,
        }
    }

    pub fn registry(&self) -> &InvocationRegistry {
        &self.registry
    }

    /// Dispatches a job to its target connections
    ///
    /// Must be called from within the tokio runtime. Every target receives
    /// the same invocation id. Returns without waiting
    /// for the executors; a target whose send fails gets an already failed
    /// handle.
    ///
    /// # Errors
    /// Fails if there is no target, or if no target could be reached at all.
    pub async fn dispatch(
        &self,
        job: &JobDefinition,
        connections: &[String],
        attempt: u32,
    ) -> Result<Vec<InvocationHandle>, DispatchError> {
        if connections.is_empty() {
            return Err(DispatchError::NoActiveConnection(job.executor_key.clone()));
        }

        let mode = job.dispatch_mode;
        let invocation_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut handles = Vec::with_capacity(connections.len());
        let mut last_error = None;
        let mut sent = 0;

        for connection_id in connections {
            match self
                .dispatch_one(job, connection_id, mode, invocation_id, attempt)
                .await
            {
                Ok(handle) => {
                    sent += 1;
                    handles.push(handle);
                }
                Err((error, Some(handle))) => {
                    warn!(
                        "Dispatch of job {} to connection {} failed: {}",
                        job.id, connection_id, error
                    );
                    handles.push(handle);
                    last_error = Some(error);
                }
                Err((error, None)) => {
                    warn!(
                        "Dispatch of job {} to connection {} failed: {}",
                        job.id, connection_id, error
                    );
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(error) if sent == 0 => Err(error),
            _ => Ok(handles),
        }
    }

    async fn dispatch_one(
        &self,
        job: &JobDefinition,
        connection_id: &str,
        mode: DispatchMode,
        invocation_id: InvocationId,
        attempt: u32,
    ) -> Result<InvocationHandle, (DispatchError, Option<InvocationHandle>)> {
        let key = InvocationKey::new(mode, connection_id, invocation_id);
        let (tx, rx) = oneshot::channel();
        self.registry
            .register(key.clone(), PendingInvocation::new(job.id, connection_id, tx));

        let handle = InvocationHandle {
            invocation_id,
            connection_id: connection_id.to_string(),
            job_id: job.id,
            rx,
        };

        let registry = Arc::clone(&self.registry);
        let hooks = Arc::clone(&self.hooks);
        let expire_key = key.clone();
        let timeout = self.timeout;
        let expiry = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(settled) = registry.expire(&expire_key) {
                report(hooks.as_ref(), &settled);
            }
        });
        self.registry.attach_expiry(&key, expiry.abort_handle());

        let request = ExecuteRequest {
            invocation_id,
            job_id: job.id,
            handler: job.handler.clone(),
            dispatch_mode: mode,
            attempt,
            dispatched_at: Utc::now(),
            parameters: job.parameters.clone(),
        };

        if let Err(e) = self.transport.send(connection_id, request).await {
            if let Some(settled) = self.registry.settle(key, InvocationResult::Failed(e.to_string())) {
                report(self.hooks.as_ref(), &settled);
            }
            return Err((e, Some(handle)));
        }

        debug!(
            "Invocation {} of job {} sent to {}",
            invocation_id, job.id, connection_id
        );
        Ok(handle)
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Routes a streamed event from an executor
    pub fn on_streamed(&self, connection_id: &str, invocation_id: InvocationId, event: StreamedEvent) {
        if self
            .registry
            .on_streamed(connection_id, invocation_id, event.clone())
        {
            self.hooks.on_streamed(invocation_id, &event);
        }
    }

    /// Routes a final outcome from an executor
    ///
    /// # Returns
    /// `true` if a pending invocation was settled
    pub fn on_final(
        &self,
        connection_id: &str,
        invocation_id: InvocationId,
        outcome: ExecutionOutcome,
    ) -> bool {
        match self
            .registry
            .on_final(connection_id, invocation_id, outcome.into())
        {
            Some(settled) => {
                report(self.hooks.as_ref(), &settled);
                true
            }
            None => false,
        }
    }

    pub fn subscribe(
        &self,
        connection_id: &str,
        invocation_id: InvocationId,
    ) -> Option<mpsc::UnboundedReceiver<StreamedEvent>> {
        self.registry.subscribe(connection_id, invocation_id)
    }

    /// Fails every invocation bound to a connection that went away
    pub fn on_disconnect(&self, connection_id: &str) -> usize {
        let keys = self.registry.keys_for_connection(connection_id);
        self.fail(keys, "connection closed")
    }

    /// Fails every pending invocation
    pub fn fail_all(&self, reason: &str) -> usize {
        self.fail(self.registry.keys(), reason)
    }

    fn fail(&self, keys: Vec<InvocationKey>, reason: &str) -> usize {
        let mut failed = 0;
        for key in keys {
            if let Some(settled) = self
                .registry
                .settle(key, InvocationResult::Failed(reason.to_string()))
            {
                report(self.hooks.as_ref(), &settled);
                failed += 1;
            }
        }
        failed
    }
}

fn report(hooks: &dyn LifecycleHooks, settled: &SettledInvocation) {
    match settled.result.error_message() {
        None => hooks.on_complete(settled.invocation_id, &settled.result),
        Some(error) => hooks.on_failure(settled.invocation_id, &error),
    }
}
