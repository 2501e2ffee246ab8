//! Fixed-delay strategy

use cadence_core::domain::job::ScheduleType;
use chrono::{DateTime, Utc};

use super::{ScheduleStrategy, parse_interval, require_interval};
use crate::error::ScheduleError;

/// Fires one interval after the previous run finished
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedDelayStrategy;

impl ScheduleStrategy for FixedDelayStrategy {
    fn schedule_type(&self) -> ScheduleType {
        ScheduleType::FixedDelay
    }

    fn compute_next(
        &self,
        expression: &str,
        _base: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        let interval = require_interval(ScheduleType::FixedDelay, expression)?;
        Ok(Some(now + interval))
    }

    fn validate(&self, expression: &str) -> bool {
        parse_interval(expression).is_some()
    }

    fn anchored_to_completion(&self) -> bool {
        true
    }
}
