//! Streamed event domain types

use serde::{Deserialize, Serialize};

/// An intermediate event streamed by an executor before its final response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamedEvent {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: EventLevel,
    pub message: String,
}

impl StreamedEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            level: EventLevel::Info,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventLevel {
    Debug,
    Info,
    Warning,
    Error,
}
