//! Dispatch DTOs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::event::StreamedEvent;
use crate::domain::invocation::{ExecutionOutcome, InvocationId};
use crate::domain::job::{DispatchMode, JobId};

/// Execution request sent to an executor connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub invocation_id: InvocationId,
    pub job_id: JobId,
    pub handler: String,
    pub dispatch_mode: DispatchMode,
    /// Zero for a scheduled run, then one per retry
    pub attempt: u32,
    pub dispatched_at: chrono::DateTime<chrono::Utc>,
    pub parameters: HashMap<String, serde_json::Value>,
}

/// Message sent by an executor about a previously dispatched request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutorMessage {
    Streamed {
        invocation_id: InvocationId,
        event: StreamedEvent,
    },
    Final {
        invocation_id: InvocationId,
        outcome: ExecutionOutcome,
    },
}

impl ExecutorMessage {
    pub fn invocation_id(&self) -> InvocationId {
        match self {
            ExecutorMessage::Streamed { invocation_id, .. } => *invocation_id,
            ExecutorMessage::Final { invocation_id, .. } => *invocation_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_final_message() {
        let raw = r#"{"type":"final","invocation_id":42,"outcome":{"status":"failure","error":"exit 1"}}"#;
        let msg: ExecutorMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.invocation_id(), 42);
        match msg {
            ExecutorMessage::Final { outcome, .. } => {
                assert_eq!(outcome, ExecutionOutcome::failure("exit 1"))
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_streamed_message() {
        let raw = r#"{"type":"streamed","invocation_id":7,"event":{"timestamp":"2026-01-01T00:00:00Z","level":"Info","message":"50%"}}"#;
        let msg: ExecutorMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ExecutorMessage::Streamed { event, .. } => assert_eq!(event.message, "50%"),
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
