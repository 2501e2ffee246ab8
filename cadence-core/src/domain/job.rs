//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a job definition
pub type JobId = Uuid;

/// A registered job definition
///
/// Owned by the job store. The engine only mutates the next-execution time,
/// the last-execution time and the retry count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub id: JobId,
    /// Name of the handler the executor runs for this job
    pub handler: String,
    /// Key used to resolve the executor connections for this job
    pub executor_key: String,
    pub schedule_type: ScheduleType,
    pub schedule_expression: String,
    pub dispatch_mode: DispatchMode,
    pub next_execution_time: Option<DateTime<Utc>>,
    pub last_execution_time: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

impl JobDefinition {
    /// Creates an enabled job with no execution history
    pub fn new(
        handler: impl Into<String>,
        executor_key: impl Into<String>,
        schedule_type: ScheduleType,
        schedule_expression: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            handler: handler.into(),
            executor_key: executor_key.into(),
            schedule_type,
            schedule_expression: schedule_expression.into(),
            dispatch_mode: DispatchMode::Unicast,
            next_execution_time: None,
            last_execution_time: None,
            enabled: true,
            retry_count: 0,
            max_retries: 0,
            parameters: HashMap::new(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    pub fn with_next_execution_time(mut self, at: DateTime<Utc>) -> Self {
        self.next_execution_time = Some(at);
        self
    }

    /// Whether the retry budget still allows another attempt
    pub fn has_retry_budget(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// How the next execution time of a job is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleType {
    Cron,
    FixedRate,
    FixedDelay,
    Manual,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::Cron => "CRON",
            ScheduleType::FixedRate => "FIXED_RATE",
            ScheduleType::FixedDelay => "FIXED_DELAY",
            ScheduleType::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CRON" => Ok(ScheduleType::Cron),
            "FIXED_RATE" => Ok(ScheduleType::FixedRate),
            "FIXED_DELAY" => Ok(ScheduleType::FixedDelay),
            "MANUAL" => Ok(ScheduleType::Manual),
            other => Err(format!("unknown schedule type: {}", other)),
        }
    }
}

/// Whether a dispatch targets one executor connection or all of them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchMode {
    Unicast,
    Broadcast,
}

impl DispatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchMode::Unicast => "UNICAST",
            DispatchMode::Broadcast => "BROADCAST",
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNICAST" => Ok(DispatchMode::Unicast),
            "BROADCAST" => Ok(DispatchMode::Broadcast),
            other => Err(format!("unknown dispatch mode: {}", other)),
        }
    }
}
