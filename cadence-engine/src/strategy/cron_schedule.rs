//! Cron strategy
//!
//! Expression parsing and matching is delegated to the `cron` crate. Classic
//! five-field expressions (`min hour dom mon dow`) are accepted by prepending a
//! zero seconds field.

use cadence_core::domain::job::ScheduleType;
use chrono::{DateTime, Utc};
use std::str::FromStr;

use super::ScheduleStrategy;
use crate::error::ScheduleError;

/// Fires at the times matched by a cron expression
#[derive(Debug, Default, Clone, Copy)]
pub struct CronStrategy;

impl CronStrategy {
    fn parse(&self, expression: &str) -> Result<::cron::Schedule, ScheduleError> {
        let normalized = normalize(expression);
        ::cron::Schedule::from_str(&normalized)
            .map_err(|e| ScheduleError::invalid(ScheduleType::Cron, expression, e.to_string()))
    }
}

impl ScheduleStrategy for CronStrategy {
    fn schedule_type(&self) -> ScheduleType {
        ScheduleType::Cron
    }

    /// First fire time strictly after the later of `base` and `now`
    fn compute_next(
        &self,
        expression: &str,
        base: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        let schedule = self.parse(expression)?;
        let after = base.map_or(now, |base| base.max(now));
        Ok(schedule.after(&after).next())
    }

    fn validate(&self, expression: &str) -> bool {
        self.parse(expression).is_ok()
    }
}

fn normalize(expression: &str) -> String {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() == 5 {
        format!("0 {}", fields.join(" "))
    } else {
        fields.join(" ")
    }
}
