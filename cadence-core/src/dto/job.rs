//! Job DTOs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::job::{DispatchMode, JobDefinition, ScheduleType};

/// Request to register a new job definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobDefinition {
    pub handler: String,
    pub executor_key: String,
    pub schedule_type: ScheduleType,
    #[serde(default)]
    pub schedule_expression: String,
    #[serde(default = "default_dispatch_mode")]
    pub dispatch_mode: DispatchMode,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

fn default_dispatch_mode() -> DispatchMode {
    DispatchMode::Unicast
}

fn default_enabled() -> bool {
    true
}

impl From<CreateJobDefinition> for JobDefinition {
    fn from(req: CreateJobDefinition) -> Self {
        let mut job = JobDefinition::new(
            req.handler,
            req.executor_key,
            req.schedule_type,
            req.schedule_expression,
        )
        .with_dispatch_mode(req.dispatch_mode)
        .with_max_retries(req.max_retries);
        job.enabled = req.enabled;
        job.parameters = req.parameters;
        job
    }
}
