//! Executor transport
//!
//! The engine never talks to sockets directly. It hands requests to a
//! [`Transport`] by connection id and asks an [`ExecutorResolver`] which
//! connections serve a job. [`ChannelTransport`] implements both on top of
//! in-process channels; the coordinator bridges each channel to a WebSocket.

use async_trait::async_trait;
use cadence_core::domain::job::DispatchMode;
use cadence_core::dto::dispatch::ExecuteRequest;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DispatchError;

/// Fire-and-forget delivery of requests to executor connections
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a request to a connection
    ///
    /// Correlating the response is not the transport's job.
    async fn send(&self, connection_id: &str, request: ExecuteRequest)
    -> Result<(), DispatchError>;

    /// Whether the connection can currently accept requests
    fn is_active(&self, connection_id: &str) -> bool;
}

/// Maps a job's executor key to the connections that should run it
pub trait ExecutorResolver: Send + Sync {
    /// Returns one connection for unicast, every matching connection for broadcast
    fn resolve(&self, executor_key: &str, mode: DispatchMode) -> Vec<String>;
}

struct Connection {
    executor_key: String,
    tx: mpsc::UnboundedSender<ExecuteRequest>,
}

/// Transport over in-process channels, one per executor connection
#[derive(Default)]
pub struct ChannelTransport {
    connections: DashMap<String, Connection>,
    cursor: AtomicUsize,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection serving `executor_key`
    ///
    /// # Returns
    /// The connection id and the receiving end of its request channel
    pub fn connect(
        &self,
        executor_key: impl Into<String>,
    ) -> (String, mpsc::UnboundedReceiver<ExecuteRequest>) {
        let executor_key = executor_key.into();
        let connection_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        info!(
            "Executor connection {} registered for '{}'",
            connection_id, executor_key
        );
        self.connections
            .insert(connection_id.clone(), Connection { executor_key, tx });

        (connection_id, rx)
    }

    /// Removes a connection
    pub fn disconnect(&self, connection_id: &str) -> bool {
        let removed = self.connections.remove(connection_id).is_some();
        if removed {
            info!("Executor connection {} removed", connection_id);
        }
        removed
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn active_for(&self, executor_key: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .connections
            .iter()
            .filter(|c| c.executor_key == executor_key && !c.tx.is_closed())
            .map(|c| c.key().clone())
            .collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(
        &self,
        connection_id: &str,
        request: ExecuteRequest,
    ) -> Result<(), DispatchError> {
        let connection = self
            .connections
            .get(connection_id)
            .ok_or_else(|| DispatchError::ConnectionClosed(connection_id.to_string()))?;

        connection.tx.send(request).map_err(|_| DispatchError::SendRejected {
            connection_id: connection_id.to_string(),
            reason: "receiver dropped".to_string(),
        })?;

        debug!("Request sent to connection {}", connection_id);
        Ok(())
    }

    fn is_active(&self, connection_id: &str) -> bool {
        self.connections
            .get(connection_id)
            .is_some_and(|c| !c.tx.is_closed())
    }
}

impl ExecutorResolver for ChannelTransport {
    fn resolve(&self, executor_key: &str, mode: DispatchMode) -> Vec<String> {
        let active = self.active_for(executor_key);
        if active.is_empty() {
            return active;
        }

        match mode {
            DispatchMode::Broadcast => active,
            DispatchMode::Unicast => {
                let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % active.len();
                vec![active[idx].clone()]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request(invocation_id: u64) -> ExecuteRequest {
        ExecuteRequest {
            invocation_id,
            job_id: Uuid::new_v4(),
            handler: "report".to_string(),
            dispatch_mode: DispatchMode::Unicast,
            attempt: 0,
            dispatched_at: chrono::Utc::now(),
            parameters: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_send_reaches_connection() {
        let transport = ChannelTransport::new();
        let (conn, mut rx) = transport.connect("billing");

        assert!(transport.is_active(&conn));
        transport.send(&conn, request(7)).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().invocation_id, 7);
    }

    #[tokio::test]
    async fn test_send_to_unknown_or_dropped_connection_fails() {
        let transport = ChannelTransport::new();
        let err = transport.send("missing", request(1)).await.unwrap_err();
        assert!(matches!(err, DispatchError::ConnectionClosed(_)));

        let (conn, rx) = transport.connect("billing");
        drop(rx);
        assert!(!transport.is_active(&conn));
        let err = transport.send(&conn, request(2)).await.unwrap_err();
        assert!(matches!(err, DispatchError::SendRejected { .. }));
    }

    #[test]
    fn test_resolve_by_mode() {
        let transport = ChannelTransport::new();
        let (a, _rx_a) = transport.connect("billing");
        let (b, _rx_b) = transport.connect("billing");
        let (_c, _rx_c) = transport.connect("reports");

        let mut all = transport.resolve("billing", DispatchMode::Broadcast);
        all.sort();
        let mut expected = vec![a.clone(), b.clone()];
        expected.sort();
        assert_eq!(all, expected);

        // Unicast alternates between the active connections
        let first = transport.resolve("billing", DispatchMode::Unicast);
        let second = transport.resolve("billing", DispatchMode::Unicast);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_ne!(first, second);

        assert!(transport.resolve("unknown", DispatchMode::Unicast).is_empty());
    }

    #[test]
    fn test_disconnect() {
        let transport = ChannelTransport::new();
        let (conn, _rx) = transport.connect("billing");
        assert!(transport.disconnect(&conn));
        assert!(!transport.disconnect(&conn));
        assert_eq!(transport.connection_count(), 0);
        assert!(transport.resolve("billing", DispatchMode::Broadcast).is_empty());
    }
}
