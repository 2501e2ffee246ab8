//! Pending invocation registry
//!
//! Owns every invocation that was dispatched but has not settled yet. Each
//! entry is settled exactly once, by its final response or by its timeout,
//! whichever removes it from the map first.

use cadence_core::domain::event::StreamedEvent;
use cadence_core::domain::invocation::{InvocationId, InvocationResult};
use cadence_core::domain::job::{DispatchMode, JobId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// Registry key of a pending invocation
///
/// Broadcast invocations share one id across all recipients, so they are
/// additionally keyed by connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InvocationKey {
    Unicast(InvocationId),
    Broadcast {
        connection_id: String,
        invocation_id: InvocationId,
    },
}

impl InvocationKey {
    pub fn new(mode: DispatchMode, connection_id: &str, invocation_id: InvocationId) -> Self {
        match mode {
            DispatchMode::Unicast => InvocationKey::Unicast(invocation_id),
            DispatchMode::Broadcast => InvocationKey::Broadcast {
                connection_id: connection_id.to_string(),
                invocation_id,
            },
        }
    }

    pub fn invocation_id(&self) -> InvocationId {
        match self {
            InvocationKey::Unicast(id) => *id,
            InvocationKey::Broadcast { invocation_id, .. } => *invocation_id,
        }
    }
}

/// How a settled invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Completed,
    Failed,
}

pub(crate) struct PendingInvocation {
    job_id: JobId,
    connection_id: String,
    events: Vec<StreamedEvent>,
    listeners: Vec<mpsc::UnboundedSender<StreamedEvent>>,
    completion: Option<oneshot::Sender<InvocationResult>>,
    expiry: Option<AbortHandle>,
    created_at: DateTime<Utc>,
}

impl PendingInvocation {
    pub(crate) fn new(
        job_id: JobId,
        connection_id: impl Into<String>,
        completion: oneshot::Sender<InvocationResult>,
    ) -> Self {
        Self {
            job_id,
            connection_id: connection_id.into(),
            events: Vec::new(),
            listeners: Vec::new(),
            completion: Some(completion),
            expiry: None,
            created_at: Utc::now(),
        }
    }

    fn settle(mut self, key: InvocationKey, result: InvocationResult) -> SettledInvocation {
        let state = if result.is_success() {
            InvocationState::Completed
        } else {
            InvocationState::Failed
        };

        if let Some(expiry) = self.expiry.take() {
            expiry.abort();
        }

        if let Some(tx) = self.completion.take() {
            // The waiter may have given up; the result is still reported through hooks
            let _ = tx.send(result.clone());
        }

        // Dropping the listeners ends their streams
        self.listeners.clear();

        SettledInvocation {
            invocation_id: key.invocation_id(),
            job_id: self.job_id,
            connection_id: self.connection_id,
            state,
            events: self.events.len(),
            result,
            elapsed: Utc::now() - self.created_at,
        }
    }
}

/// Summary of an invocation that left the registry
#[derive(Debug, Clone)]
pub struct SettledInvocation {
    pub invocation_id: InvocationId,
    pub job_id: JobId,
    pub connection_id: String,
    pub state: InvocationState,
    /// Number of streamed events received before settlement
    pub events: usize,
    pub result: InvocationResult,
    pub elapsed: chrono::Duration,
}

/// Registry of invocations awaiting a final response
#[derive(Default)]
pub struct InvocationRegistry {
    pending: DashMap<InvocationKey, PendingInvocation>,
}

impl InvocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, key: InvocationKey, invocation: PendingInvocation) {
        debug!("Registering pending invocation {:?}", key);
        self.pending.insert(key, invocation);
    }

    /// Attaches the eviction task to a pending invocation
    ///
    /// If the invocation already settled the task is aborted instead.
    pub(crate) fn attach_expiry(&self, key: &InvocationKey, expiry: AbortHandle) {
        match self.pending.get_mut(key) {
            Some(mut invocation) => invocation.expiry = Some(expiry),
            None => expiry.abort(),
        }
    }

    /// Finds the key for an inbound response
    ///
    /// Unicast registrations are tried first, then the broadcast entry for the
    /// sending connection.
    fn resolve_key(&self, connection_id: &str, invocation_id: InvocationId) -> Option<InvocationKey> {
        let unicast = InvocationKey::Unicast(invocation_id);
        if self.pending.contains_key(&unicast) {
            return Some(unicast);
        }

        let broadcast = InvocationKey::Broadcast {
            connection_id: connection_id.to_string(),
            invocation_id,
        };
        if self.pending.contains_key(&broadcast) {
            return Some(broadcast);
        }

        None
    }

    /// Records an intermediate event without changing the invocation state
    ///
    /// # Returns
    /// `false` if the invocation is unknown; the event is discarded.
    pub fn on_streamed(
        &self,
        connection_id: &str,
        invocation_id: InvocationId,
        event: StreamedEvent,
    ) -> bool {
        let Some(key) = self.resolve_key(connection_id, invocation_id) else {
            warn!(
                "Streamed event for unknown invocation {} from connection {}, discarding",
                invocation_id, connection_id
            );
            return false;
        };

        let Some(mut invocation) = self.pending.get_mut(&key) else {
            // Settled between lookup and update
            return false;
        };

        invocation
            .listeners
            .retain(|listener| listener.send(event.clone()).is_ok());
        invocation.events.push(event);
        true
    }

    /// Settles an invocation with the executor's final outcome
    ///
    /// # Returns
    /// The settled invocation, or `None` if it is unknown or already settled.
    pub fn on_final(
        &self,
        connection_id: &str,
        invocation_id: InvocationId,
        result: InvocationResult,
    ) -> Option<SettledInvocation> {
        let Some(key) = self.resolve_key(connection_id, invocation_id) else {
            warn!(
                "Final response for unknown invocation {} from connection {}, discarding",
                invocation_id, connection_id
            );
            return None;
        };

        self.settle(key, result)
    }

    /// Settles an invocation by key
    pub(crate) fn settle(
        &self,
        key: InvocationKey,
        result: InvocationResult,
    ) -> Option<SettledInvocation> {
        let (key, invocation) = self.pending.remove(&key)?;
        Some(invocation.settle(key, result))
    }

    /// Evicts an invocation whose deadline passed without a final response
    pub fn expire(&self, key: &InvocationKey) -> Option<SettledInvocation> {
        let settled = self.settle(key.clone(), InvocationResult::TimedOut)?;
        warn!(
            "Invocation {} on connection {} timed out after {}s",
            settled.invocation_id,
            settled.connection_id,
            settled.elapsed.num_seconds()
        );
        Some(settled)
    }

    /// Subscribes to the streamed events of a pending invocation
    ///
    /// Events already received are replayed first, then live events follow in
    /// order. The stream ends when the invocation settles.
    pub fn subscribe(
        &self,
        connection_id: &str,
        invocation_id: InvocationId,
    ) -> Option<mpsc::UnboundedReceiver<StreamedEvent>> {
        let key = self.resolve_key(connection_id, invocation_id)?;
        let mut invocation = self.pending.get_mut(&key)?;

        let (tx, rx) = mpsc::unbounded_channel();
        // Replay under the entry lock so no live event can slip in between
        for event in &invocation.events {
            let _ = tx.send(event.clone());
        }
        invocation.listeners.push(tx);

        Some(rx)
    }

    pub(crate) fn keys(&self) -> Vec<InvocationKey> {
        self.pending.iter().map(|invocation| invocation.key().clone()).collect()
    }

    pub(crate) fn keys_for_connection(&self, connection_id: &str) -> Vec<InvocationKey> {
        self.pending
            .iter()
            .filter(|invocation| invocation.connection_id == connection_id)
            .map(|invocation| invocation.key().clone())
            .collect()
    }

    pub fn contains(&self, key: &InvocationKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
