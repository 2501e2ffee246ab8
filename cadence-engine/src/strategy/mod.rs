//! Schedule strategies
//!
//! One strategy per schedule type computes the next execution time of a job.
//! Strategies are pure: the current time is passed in, nothing is persisted.

mod cron_schedule;
mod fixed_delay;
mod fixed_rate;
mod manual;
mod registry;

use cadence_core::domain::job::ScheduleType;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::ScheduleError;

pub use cron_schedule::CronStrategy;
pub use fixed_delay::FixedDelayStrategy;
pub use fixed_rate::FixedRateStrategy;
pub use manual::ManualStrategy;
pub use registry::StrategyRegistry;

/// Computes execution times for one schedule type
pub trait ScheduleStrategy: Send + Sync {
    /// The schedule type this strategy handles
    fn schedule_type(&self) -> ScheduleType;

    /// Computes the next execution time
    ///
    /// # Arguments
    /// * `expression` - The job's schedule expression
    /// * `base` - The last or currently scheduled execution time, if any
    /// * `now` - The current time
    ///
    /// # Returns
    /// `Ok(None)` when the job has no further automatic execution.
    fn compute_next(
        &self,
        expression: &str,
        base: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ScheduleError>;

    /// Checks the expression without computing anything
    fn validate(&self, expression: &str) -> bool;

    /// Whether the scan loop should schedule jobs of this type at all
    fn needs_auto_schedule(&self) -> bool {
        true
    }

    /// Whether the next time depends on when the previous run finished
    ///
    /// The engine recomputes these after every completion.
    fn anchored_to_completion(&self) -> bool {
        false
    }
}

/// Parses an interval expression such as `30s`, `10m`, `2h` or `1d`
///
/// Bare digits are seconds; `ms` is accepted for sub-second intervals.
/// The unit must follow the digits directly. Zero intervals are rejected.
pub fn parse_interval(expression: &str) -> Option<Duration> {
    let expr = expression.trim();
    let split = expr
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(expr.len());
    let (digits, unit) = expr.split_at(split);

    if digits.is_empty() {
        return None;
    }

    let value: u64 = digits.parse().ok()?;
    let duration = match unit {
        "" | "s" => Duration::from_secs(value),
        "ms" => Duration::from_millis(value),
        "m" => Duration::from_secs(value.checked_mul(60)?),
        "h" => Duration::from_secs(value.checked_mul(3_600)?),
        "d" => Duration::from_secs(value.checked_mul(86_400)?),
        _ => return None,
    };

    if duration.is_zero() {
        None
    } else {
        Some(duration)
    }
}

/// Parses an interval or reports an invalid expression for `schedule_type`
pub(crate) fn require_interval(
    schedule_type: ScheduleType,
    expression: &str,
) -> Result<chrono::Duration, ScheduleError> {
    let interval = parse_interval(expression).ok_or_else(|| {
        ScheduleError::invalid(
            schedule_type,
            expression,
            "expected a positive interval like 30s, 10m or 2h",
        )
    })?;

    chrono::Duration::from_std(interval)
        .map_err(|e| ScheduleError::invalid(schedule_type, expression, e.to_string()))
}
