//! Fixed-rate strategy

use cadence_core::domain::job::ScheduleType;
use chrono::{DateTime, Utc};

use super::{ScheduleStrategy, parse_interval, require_interval};
use crate::error::ScheduleError;

/// Fires every interval, measured from the previous scheduled time
///
/// When the previous time plus the interval has already passed the schedule is
/// re-based on now, so a job that fell behind does not fire back to back.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedRateStrategy;

impl ScheduleStrategy for FixedRateStrategy {
    fn schedule_type(&self) -> ScheduleType {
        ScheduleType::FixedRate
    }

    fn compute_next(
        &self,
        expression: &str,
        base: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        let interval = require_interval(ScheduleType::FixedRate, expression)?;

        let next = match base {
            Some(base) if base + interval > now => base + interval,
            _ => now + interval,
        };

        Ok(Some(next))
    }

    fn validate(&self, expression: &str) -> bool {
        parse_interval(expression).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_next_is_base_plus_interval_when_in_future() {
        let now = Utc::now();
        let base = now - Duration::seconds(10);
        let next = FixedRateStrategy
            .compute_next("30s", Some(base), now)
            .unwrap()
            .unwrap();
        assert_eq!(next, base + Duration::seconds(30));
    }

    #[test]
    fn test_rebases_on_now_when_behind() {
        let now = Utc::now();
        let base = now - Duration::seconds(45);
        let next = FixedRateStrategy
            .compute_next("30s", Some(base), now)
            .unwrap()
            .unwrap();
        assert_eq!(next, now + Duration::seconds(30));
    }

    #[test]
    fn test_without_base_starts_from_now() {
        let now = Utc::now();
        let next = FixedRateStrategy
            .compute_next("10m", None, now)
            .unwrap()
            .unwrap();
        assert_eq!(next, now + Duration::seconds(600));
    }

    #[test]
    fn test_invalid_interval() {
        assert!(!FixedRateStrategy.validate("abc"));
        assert!(FixedRateStrategy.compute_next("abc", None, Utc::now()).is_err());
    }
}
