//! Engine configuration
//!
//! Defines all tunable parameters of the dispatch engine: scan cadence,
//! misfire tolerance, timer wheel geometry, retry backoff, invocation
//! timeouts and execution pool sizing.

use std::time::Duration;

/// Engine configuration
///
/// All timeouts and intervals are configurable to allow tuning
/// for different deployment scenarios (dev vs prod, fast vs slow executors).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often the scan loop pulls due jobs from the store
    pub scan_interval: Duration,

    /// How late a job may be discovered and still run
    pub misfire_threshold: Duration,

    /// How far ahead of now the scan loop looks for due jobs
    pub lookahead_window: Duration,

    /// Maximum delay for which a job is pushed into the timer wheel
    pub wheel_threshold: Duration,

    /// Duration of one timer wheel tick
    pub tick_duration: Duration,

    /// Number of buckets in the timer wheel (rounded up to a power of two)
    pub wheel_size: usize,

    /// Maximum number of pending timeouts, 0 for unbounded
    pub max_pending_timers: usize,

    /// Fixed delay before a failed execution is retried
    pub retry_backoff: Duration,

    /// How long an invocation may wait for its final response
    pub invocation_timeout: Duration,

    /// Number of executions that may run concurrently
    pub execution_workers: usize,

    /// Number of executions that may wait for a worker before callers run them inline
    pub execution_queue: usize,
}

impl EngineConfig {
    /// Creates configuration from environment variables
    ///
    /// Every variable is optional and falls back to its default:
    /// - SCAN_INTERVAL (seconds, default: 5)
    /// - MISFIRE_THRESHOLD (seconds, default: 10)
    /// - LOOKAHEAD_WINDOW (seconds, default: 10)
    /// - WHEEL_THRESHOLD (seconds, default: LOOKAHEAD_WINDOW)
    /// - TICK_DURATION_MS (milliseconds, default: 100)
    /// - WHEEL_SIZE (default: 512)
    /// - MAX_PENDING_TIMERS (default: 0, unbounded)
    /// - RETRY_BACKOFF (seconds, default: 30)
    /// - INVOCATION_TIMEOUT (seconds, default: 300)
    /// - EXECUTION_WORKERS (default: 16)
    /// - EXECUTION_QUEUE (default: 256)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let lookahead_window = env_secs("LOOKAHEAD_WINDOW").unwrap_or(defaults.lookahead_window);

        let config = Self {
            scan_interval: env_secs("SCAN_INTERVAL").unwrap_or(defaults.scan_interval),
            misfire_threshold: env_secs("MISFIRE_THRESHOLD")
                .unwrap_or(defaults.misfire_threshold),
            lookahead_window,
            wheel_threshold: env_secs("WHEEL_THRESHOLD").unwrap_or(lookahead_window),
            tick_duration: env_parse::<u64>("TICK_DURATION_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick_duration),
            wheel_size: env_parse("WHEEL_SIZE").unwrap_or(defaults.wheel_size),
            max_pending_timers: env_parse("MAX_PENDING_TIMERS")
                .unwrap_or(defaults.max_pending_timers),
            retry_backoff: env_secs("RETRY_BACKOFF").unwrap_or(defaults.retry_backoff),
            invocation_timeout: env_secs("INVOCATION_TIMEOUT")
                .unwrap_or(defaults.invocation_timeout),
            execution_workers: env_parse("EXECUTION_WORKERS")
                .unwrap_or(defaults.execution_workers),
            execution_queue: env_parse("EXECUTION_QUEUE").unwrap_or(defaults.execution_queue),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scan_interval.is_zero() {
            anyhow::bail!("scan_interval must be greater than 0");
        }

        if self.tick_duration.is_zero() {
            anyhow::bail!("tick_duration must be greater than 0");
        }

        if self.wheel_size == 0 {
            anyhow::bail!("wheel_size must be greater than 0");
        }

        if self.retry_backoff.is_zero() {
            anyhow::bail!("retry_backoff must be greater than 0");
        }

        if self.invocation_timeout.is_zero() {
            anyhow::bail!("invocation_timeout must be greater than 0");
        }

        if self.execution_workers == 0 {
            anyhow::bail!("execution_workers must be greater than 0");
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let lookahead_window = Duration::from_secs(10);
        Self {
            scan_interval: Duration::from_secs(5),
            misfire_threshold: Duration::from_secs(10),
            lookahead_window,
            wheel_threshold: lookahead_window,
            tick_duration: Duration::from_millis(100),
            wheel_size: 512,
            max_pending_timers: 0,
            retry_backoff: Duration::from_secs(30),
            invocation_timeout: Duration::from_secs(300), // 5 minutes
            execution_workers: 16,
            execution_queue: 256,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}
