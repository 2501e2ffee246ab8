//! Manual strategy

use cadence_core::domain::job::ScheduleType;
use chrono::{DateTime, Utc};

use super::ScheduleStrategy;
use crate::error::ScheduleError;

/// Never fires on its own; jobs run only when triggered
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualStrategy;

impl ScheduleStrategy for ManualStrategy {
    fn schedule_type(&self) -> ScheduleType {
        ScheduleType::Manual
    }

    fn compute_next(
        &self,
        _expression: &str,
        _base: Option<DateTime<Utc>>,
        _now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        Ok(None)
    }

    fn validate(&self, _expression: &str) -> bool {
        true
    }

    fn needs_auto_schedule(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_never_schedules() {
        let strategy = ManualStrategy;
        assert!(!strategy.needs_auto_schedule());
        assert_eq!(
            strategy.compute_next("", Some(Utc::now()), Utc::now()).unwrap(),
            None
        );
    }
}
