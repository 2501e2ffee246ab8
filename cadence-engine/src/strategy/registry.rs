use cadence_core::domain::job::ScheduleType;
use std::collections::HashMap;

use super::{
    CronStrategy, FixedDelayStrategy, FixedRateStrategy, ManualStrategy, ScheduleStrategy,
};
use crate::error::ScheduleError;

/// Registry of schedule strategies keyed by schedule type
///
/// Built once at startup. Looking up a type without a strategy is an error,
/// never a silent fallback.
pub struct StrategyRegistry {
    strategies: HashMap<ScheduleType, Box<dyn ScheduleStrategy>>,
}

impl StrategyRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Creates a registry with the cron, fixed-rate, fixed-delay and manual strategies
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(CronStrategy);
        registry.register(FixedRateStrategy);
        registry.register(FixedDelayStrategy);
        registry.register(ManualStrategy);
        registry
    }

    /// Registers a strategy
    ///
    /// # Panics
    /// Panics if a strategy for the same schedule type is already registered
    pub fn register<S: ScheduleStrategy + 'static>(&mut self, strategy: S) {
        let schedule_type = strategy.schedule_type();
        if self.strategies.contains_key(&schedule_type) {
            panic!(
                "Strategy for schedule type '{}' is already registered",
                schedule_type
            );
        }
        self.strategies.insert(schedule_type, Box::new(strategy));
    }

    /// Gets the strategy for a schedule type
    pub fn get(&self, schedule_type: ScheduleType) -> Result<&dyn ScheduleStrategy, ScheduleError> {
        self.strategies
            .get(&schedule_type)
            .map(|s| s.as_ref())
            .ok_or(ScheduleError::StrategyNotRegistered(schedule_type))
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
