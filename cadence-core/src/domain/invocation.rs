//! Invocation domain types

use serde::{Deserialize, Serialize};

/// Correlates a dispatch request with its streamed and final responses
pub type InvocationId = u64;

/// Final outcome reported by an executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success {
        #[serde(default)]
        output: Option<serde_json::Value>,
    },
    Failure {
        error: String,
    },
}

impl ExecutionOutcome {
    pub fn success() -> Self {
        ExecutionOutcome::Success { output: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        ExecutionOutcome::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }
}

/// How a pending invocation was settled
///
/// Exactly one of these is produced per pending invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationResult {
    Completed(Option<serde_json::Value>),
    Failed(String),
    TimedOut,
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Completed(_))
    }

    /// Error description for failed or timed-out invocations
    pub fn error_message(&self) -> Option<String> {
        match self {
            InvocationResult::Completed(_) => None,
            InvocationResult::Failed(error) => Some(error.clone()),
            InvocationResult::TimedOut => Some("invocation timed out".to_string()),
        }
    }
}

impl From<ExecutionOutcome> for InvocationResult {
    fn from(outcome: ExecutionOutcome) -> Self {
        match outcome {
            ExecutionOutcome::Success { output } => InvocationResult::Completed(output),
            ExecutionOutcome::Failure { error } => InvocationResult::Failed(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_wire_shape() {
        let json = serde_json::to_value(ExecutionOutcome::failure("boom")).unwrap();
        assert_eq!(json, serde_json::json!({"status": "failure", "error": "boom"}));

        let parsed: ExecutionOutcome =
            serde_json::from_value(serde_json::json!({"status": "success"})).unwrap();
        assert_eq!(parsed, ExecutionOutcome::success());
    }

    #[test]
    fn test_timeout_has_error_message() {
        assert!(InvocationResult::TimedOut.error_message().unwrap().contains("timed out"));
        assert!(InvocationResult::Completed(None).error_message().is_none());
    }
}
