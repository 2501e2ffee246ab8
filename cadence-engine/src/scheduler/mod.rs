//! Scheduler
//!
//! Ties the engine together: a periodic scan turns due job definitions into
//! timer entries, the timer hands expired entries to the execution pool, and
//! executions are dispatched to executors and tracked until they settle.
//!
//! ```text
//! scan loop ──► TimerWheel ──► ExecutionPool ──► DispatchInvoker ──► Transport
//!     ▲                                               │
//!     └──────────── re-submit on completion ◄─────────┘
//! ```

mod execution;
mod scan;

use cadence_core::domain::event::StreamedEvent;
use cadence_core::domain::invocation::{ExecutionOutcome, InvocationId};
use cadence_core::domain::job::JobId;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result, StoreError};
use crate::guard::ExecutionGuard;
use crate::hooks::LifecycleHooks;
use crate::invocation::DispatchInvoker;
use crate::pool::ExecutionPool;
use crate::retry::{RetryPolicy, RetryScheduler};
use crate::store::JobStore;
use crate::strategy::StrategyRegistry;
use crate::timer::{TaskExecutor, TimerConfig, TimerWheel};
use crate::transport::{ExecutorResolver, Transport};

pub use scan::{Classification, ScanReport, ScheduleOutcome, SkipReason, classify};

/// Runtime admission state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobRuntimeStatus {
    pub running: bool,
    pub scheduled: bool,
    pub paused: bool,
}

pub(crate) struct Inner {
    config: EngineConfig,
    store: Arc<dyn JobStore>,
    strategies: StrategyRegistry,
    guard: ExecutionGuard,
    timer: Arc<TimerWheel>,
    pool: Arc<ExecutionPool>,
    invoker: DispatchInvoker,
    resolver: Arc<dyn ExecutorResolver>,
    hooks: Arc<dyn LifecycleHooks>,
    retry: RetryScheduler,
    handle: Handle,
    shutdown: watch::Sender<bool>,
}

/// The time-driven dispatch engine
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Creates a scheduler with the default strategies
    ///
    /// Starts the timer wheel thread; the scan loop starts with [`Scheduler::start`].
    ///
    /// # Arguments
    /// * `config` - Engine configuration, validated here
    /// * `store` - Source of job definitions
    /// * `transport` - Delivers requests to executor connections
    /// * `resolver` - Maps executor keys to connections
    /// * `hooks` - Lifecycle listeners
    /// * `handle` - Runtime executions are spawned on
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn JobStore>,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn ExecutorResolver>,
        hooks: Arc<dyn LifecycleHooks>,
        handle: Handle,
    ) -> anyhow::Result<Self> {
        Self::with_strategies(
            config,
            StrategyRegistry::with_defaults(),
            store,
            transport,
            resolver,
            hooks,
            handle,
        )
    }

    /// Creates a scheduler with a custom strategy registry
    pub fn with_strategies(
        config: EngineConfig,
        strategies: StrategyRegistry,
        store: Arc<dyn JobStore>,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn ExecutorResolver>,
        hooks: Arc<dyn LifecycleHooks>,
        handle: Handle,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let pool = Arc::new(ExecutionPool::new(
            handle.clone(),
            config.execution_workers,
            config.execution_queue,
        ));
        let executor: Arc<dyn TaskExecutor> = pool.clone();
        let timer = Arc::new(TimerWheel::new(TimerConfig::from(&config), executor)?);

        let invoker = DispatchInvoker::new(
            transport,
            Arc::clone(&hooks),
            config.invocation_timeout,
        );
        let retry = RetryScheduler::new(
            RetryPolicy::new(config.retry_backoff),
            Arc::clone(&store),
            Arc::clone(&hooks),
        );
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                strategies,
                guard: ExecutionGuard::new(),
                timer,
                pool,
                invoker,
                resolver,
                hooks,
                retry,
                handle,
                shutdown,
            }),
        })
    }

    /// Starts the periodic scan loop
    ///
    /// Scans run one after another, never overlapping. The loop ends on
    /// [`Scheduler::shutdown`].
    pub fn start(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let mut shutdown = inner.shutdown.subscribe();
        let scan_interval = inner.config.scan_interval;

        info!("Starting scan loop (interval: {:?})", scan_interval);

        self.inner.handle.spawn(async move {
            let mut ticker = tokio::time::interval(scan_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = inner.scan_once(Utc::now()).await;
                        if report.candidates > 0 {
                            debug!("Scan finished: {:?}", report);
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Scan loop stopped");
        })
    }

    /// Runs a single scan as of `now`
    pub async fn scan_once(&self, now: chrono::DateTime<Utc>) -> ScanReport {
        self.inner.scan_once(now).await
    }

    // =========================================================================
    // Job control
    // =========================================================================

    /// Pauses automatic scheduling of a job, cancelling its pending timer
    ///
    /// # Returns
    /// `true` if the job was not paused before
    pub async fn pause(&self, job_id: JobId) -> Result<bool> {
        self.inner.require_job(job_id).await?;
        let paused = self.inner.guard.pause(job_id);
        if paused {
            info!("Job {} paused", job_id);
        }
        Ok(paused)
    }

    /// Resumes a paused job
    ///
    /// A job that is due within the wheel threshold is scheduled right away.
    ///
    /// # Returns
    /// `true` if the job was paused before
    pub async fn resume(&self, job_id: JobId) -> Result<bool> {
        let job = self.inner.require_job(job_id).await?;
        let resumed = self.inner.guard.resume(job_id);
        if !resumed {
            return Ok(false);
        }

        info!("Job {} resumed", job_id);
        if job.enabled {
            match Arc::clone(&self.inner).schedule_job(job, Utc::now()).await {
                Ok(outcome) => debug!("Resumed job {}: {:?}", job_id, outcome),
                Err(e) => warn!("Failed to schedule resumed job {}: {}", job_id, e),
            }
        }
        Ok(true)
    }

    /// Runs a job immediately, outside of its schedule
    ///
    /// # Errors
    /// Fails if the job does not exist, is disabled or paused, or is already
    /// running or scheduled.
    pub async fn trigger(&self, job_id: JobId) -> Result<()> {
        let job = self.inner.require_job(job_id).await?;
        let guard = &self.inner.guard;

        let reason = if !job.enabled {
            Some("job is disabled")
        } else if guard.is_paused(job_id) {
            Some("job is paused")
        } else if guard.is_running(job_id) {
            Some("job is already running")
        } else if !guard.try_reserve_schedule(job_id) {
            Some("job is already scheduled")
        } else {
            None
        };

        if let Some(reason) = reason {
            return Err(EngineError::NotRunnable {
                job_id,
                reason: reason.to_string(),
            });
        }

        self.inner.schedule_fire(job_id, Duration::ZERO, 0)?;
        info!("Job {} triggered", job_id);
        Ok(())
    }

    pub fn status(&self, job_id: JobId) -> JobRuntimeStatus {
        let guard = &self.inner.guard;
        JobRuntimeStatus {
            running: guard.is_running(job_id),
            scheduled: guard.is_scheduled(job_id),
            paused: guard.is_paused(job_id),
        }
    }

    pub fn guard(&self) -> &ExecutionGuard {
        &self.inner.guard
    }

    // =========================================================================
    // Executor responses
    // =========================================================================

    pub fn on_streamed(&self, connection_id: &str, invocation_id: InvocationId, event: StreamedEvent) {
        self.inner
            .invoker
            .on_streamed(connection_id, invocation_id, event);
    }

    /// Routes a final outcome; returns `false` for unknown invocations
    pub fn on_final(
        &self,
        connection_id: &str,
        invocation_id: InvocationId,
        outcome: ExecutionOutcome,
    ) -> bool {
        self.inner
            .invoker
            .on_final(connection_id, invocation_id, outcome)
    }

    /// Subscribes to the streamed events of a pending invocation
    pub fn subscribe(
        &self,
        connection_id: &str,
        invocation_id: InvocationId,
    ) -> Option<mpsc::UnboundedReceiver<StreamedEvent>> {
        self.inner.invoker.subscribe(connection_id, invocation_id)
    }

    /// Fails the pending invocations of a connection that went away
    pub fn on_disconnect(&self, connection_id: &str) -> usize {
        let failed = self.inner.invoker.on_disconnect(connection_id);
        if failed > 0 {
            warn!(
                "Connection {} closed with {} pending invocations",
                connection_id, failed
            );
        }
        failed
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn pending_invocations(&self) -> usize {
        self.inner.invoker.registry().len()
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.timer.pending_timeouts()
    }

    pub fn executions_in_flight(&self) -> usize {
        self.inner.pool.in_flight()
    }

    /// Stops the scan loop and the timer wheel, failing pending invocations
    ///
    /// Executions already in the pool are not interrupted; they observe their
    /// invocations as failed. Queued executions are dropped.
    pub fn shutdown(&self) {
        if self.inner.shutdown.send_replace(true) {
            return;
        }

        self.inner.pool.close();
        // Releases the workers so a wheel blocked on a full queue can exit
        let mut failed = self.inner.invoker.fail_all("scheduler shut down");
        let unprocessed = self.inner.timer.stop();
        failed += self.inner.invoker.fail_all("scheduler shut down");
        info!(
            "Scheduler stopped ({} timers dropped, {} invocations failed)",
            unprocessed, failed
        );
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    async fn require_job(
        &self,
        job_id: JobId,
    ) -> Result<cadence_core::domain::job::JobDefinition> {
        self.store
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(job_id).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryJobStore;
    use crate::transport::ChannelTransport;
    use cadence_core::domain::job::{JobDefinition, ScheduleType};
    use cadence_core::dto::dispatch::ExecuteRequest;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingHooks {
        terminal: mpsc::UnboundedSender<JobId>,
        dispatches: AtomicUsize,
    }

    impl LifecycleHooks for RecordingHooks {
        fn before_dispatch(&self, _job_id: JobId) {
            self.dispatches.fetch_add(1, Ordering::SeqCst);
        }

        fn on_terminal_failure(&self, job_id: JobId, _error: &str) {
            let _ = self.terminal.send(job_id);
        }
    }

    struct Harness {
        scheduler: Arc<Scheduler>,
        store: Arc<InMemoryJobStore>,
        transport: Arc<ChannelTransport>,
        hooks: Arc<RecordingHooks>,
        terminal: mpsc::UnboundedReceiver<JobId>,
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            tick_duration: Duration::from_millis(10),
            wheel_size: 64,
            retry_backoff: Duration::from_millis(50),
            invocation_timeout: Duration::from_secs(5),
            ..EngineConfig::default()
        }
    }

    fn harness() -> Harness {
        harness_with(test_config())
    }

    fn harness_with(config: EngineConfig) -> Harness {
        let store = Arc::new(InMemoryJobStore::new());
        let transport = Arc::new(ChannelTransport::new());
        let (terminal_tx, terminal) = mpsc::unbounded_channel();
        let hooks = Arc::new(RecordingHooks {
            terminal: terminal_tx,
            dispatches: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::new(
            config,
            store.clone(),
            transport.clone(),
            transport.clone(),
            hooks.clone(),
            Handle::current(),
        )
        .unwrap();

        Harness {
            scheduler: Arc::new(scheduler),
            store,
            transport,
            hooks,
            terminal,
        }
    }

    async fn next_terminal(h: &mut Harness) -> JobId {
        tokio::time::timeout(Duration::from_secs(3), h.terminal.recv())
            .await
            .expect("no terminal failure")
            .expect("hooks dropped")
    }

    /// Connects an executor that answers every request with `outcome`
    fn executor(
        harness: &Harness,
        outcome: ExecutionOutcome,
    ) -> mpsc::UnboundedReceiver<ExecuteRequest> {
        let (connection_id, mut requests) = harness.transport.connect("workers");
        let scheduler = Arc::clone(&harness.scheduler);
        let (seen_tx, seen) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let invocation_id = request.invocation_id;
                let _ = seen_tx.send(request);
                scheduler.on_final(&connection_id, invocation_id, outcome.clone());
            }
        });

        seen
    }

    fn fixed_rate(expr: &str, next: DateTime<Utc>) -> JobDefinition {
        JobDefinition::new("sync", "workers", ScheduleType::FixedRate, expr)
            .with_next_execution_time(next)
    }

    async fn next_request(seen: &mut mpsc::UnboundedReceiver<ExecuteRequest>) -> ExecuteRequest {
        tokio::time::timeout(Duration::from_secs(2), seen.recv())
            .await
            .expect("no request dispatched")
            .expect("executor stopped")
    }

    async fn assert_quiet(seen: &mut mpsc::UnboundedReceiver<ExecuteRequest>, wait: Duration) {
        assert!(
            tokio::time::timeout(wait, seen.recv()).await.is_err(),
            "unexpected dispatch"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_due_late_job_dispatches_immediately() {
        let h = harness();
        let mut seen = executor(&h, ExecutionOutcome::success());
        let now = Utc::now();
        let job = fixed_rate("1h", now - chrono::Duration::seconds(5));
        h.store.insert(job.clone()).await;

        let report = h.scheduler.scan_once(now).await;
        assert_eq!(report.scheduled, 1);
        assert_eq!(report.misfired, 0);

        let request = next_request(&mut seen).await;
        assert_eq!(request.job_id, job.id);
        assert_eq!(request.attempt, 0);

        // Eagerly advanced past the occurrence that was dispatched
        let stored = h.store.get(job.id).await.unwrap();
        assert_eq!(
            stored.next_execution_time,
            Some(now - chrono::Duration::seconds(5) + chrono::Duration::hours(1))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_misfired_job_is_rebased_without_dispatch() {
        let h = harness();
        let mut seen = executor(&h, ExecutionOutcome::success());
        let now = Utc::now();
        let job = fixed_rate("30s", now - chrono::Duration::seconds(20));
        h.store.insert(job.clone()).await;

        let report = h.scheduler.scan_once(now).await;
        assert_eq!(report.misfired, 1);
        assert_eq!(report.scheduled, 0);

        let stored = h.store.get(job.id).await.unwrap();
        assert_eq!(
            stored.next_execution_time,
            Some(now + chrono::Duration::seconds(30))
        );
        assert!(!h.scheduler.status(job.id).scheduled);
        assert_quiet(&mut seen, Duration::from_millis(200)).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_scans_dispatch_once() {
        let h = harness();
        let mut seen = executor(&h, ExecutionOutcome::success());
        let now = Utc::now();
        let job = fixed_rate("1h", now + chrono::Duration::milliseconds(100));
        h.store.insert(job.clone()).await;

        let (a, b) = tokio::join!(h.scheduler.scan_once(now), h.scheduler.scan_once(now));
        assert_eq!(a.scheduled + b.scheduled, 1);
        assert_eq!(h.scheduler.pending_timers(), 1);

        assert_eq!(next_request(&mut seen).await.job_id, job.id);
        assert_quiet(&mut seen, Duration::from_millis(300)).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_running_job_is_not_scheduled_again() {
        let h = harness();
        let now = Utc::now();
        let job = fixed_rate("1h", now);
        h.store.insert(job.clone()).await;

        assert!(h.scheduler.guard().try_mark_running(job.id));
        let report = h.scheduler.scan_once(now).await;
        assert_eq!(report.skipped, 1);
        assert_eq!(report.scheduled, 0);
        assert!(!h.scheduler.status(job.id).scheduled);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bounded_retry_then_single_terminal_failure() {
        let mut h = harness();
        let mut seen = executor(&h, ExecutionOutcome::failure("exit 1"));
        let job =
            JobDefinition::new("import", "workers", ScheduleType::Manual, "").with_max_retries(3);
        h.store.insert(job.clone()).await;

        h.scheduler.trigger(job.id).await.unwrap();

        let terminal = tokio::time::timeout(Duration::from_secs(5), h.terminal.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(terminal, job.id);

        // Nothing else happens after the terminal failure
        tokio::time::sleep(Duration::from_millis(300)).await;
        let mut attempts = Vec::new();
        while let Ok(request) = seen.try_recv() {
            attempts.push(request.attempt);
        }
        assert_eq!(attempts, vec![0, 1, 2, 3]);
        assert!(h.terminal.try_recv().is_err());
        assert_eq!(h.store.get(job.id).await.unwrap().retry_count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pause_cancels_scheduled_execution() {
        let h = harness();
        let mut seen = executor(&h, ExecutionOutcome::success());
        let now = Utc::now();
        let job = fixed_rate("1h", now + chrono::Duration::milliseconds(300));
        h.store.insert(job.clone()).await;

        assert_eq!(h.scheduler.scan_once(now).await.scheduled, 1);
        assert!(h.scheduler.pause(job.id).await.unwrap());
        assert!(!h.scheduler.pause(job.id).await.unwrap());

        let status = h.scheduler.status(job.id);
        assert!(status.paused);
        assert!(!status.scheduled);
        assert_quiet(&mut seen, Duration::from_millis(600)).await;

        // Paused jobs are skipped by the scan even when due
        let now = Utc::now();
        h.store
            .update_next_execution_time(job.id, Some(now))
            .await
            .unwrap();
        assert_eq!(h.scheduler.scan_once(now).await.skipped, 1);
        assert!(h.scheduler.resume(job.id).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fixed_delay_resubmits_after_completion() {
        let h = harness();
        let mut seen = executor(&h, ExecutionOutcome::success());
        let now = Utc::now();
        let job = JobDefinition::new("poll", "workers", ScheduleType::FixedDelay, "200ms")
            .with_next_execution_time(now);
        h.store.insert(job.clone()).await;

        assert_eq!(h.scheduler.scan_once(now).await.scheduled, 1);

        // The second run comes from the completion path, not from a scan
        let first = next_request(&mut seen).await;
        let second = next_request(&mut seen).await;
        assert_eq!(first.job_id, job.id);
        assert_eq!(second.job_id, job.id);
        assert!(second.dispatched_at - first.dispatched_at >= chrono::Duration::milliseconds(150));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_executor_counts_as_failure() {
        let mut h = harness();
        let job = JobDefinition::new("import", "nobody", ScheduleType::Manual, "");
        h.store.insert(job.clone()).await;

        h.scheduler.trigger(job.id).await.unwrap();
        let terminal = tokio::time::timeout(Duration::from_secs(2), h.terminal.recv())
            .await
            .unwrap();
        assert_eq!(terminal, Some(job.id));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_executor_spends_retry_budget() {
        let mut h = harness();
        let job =
            JobDefinition::new("import", "nobody", ScheduleType::Manual, "").with_max_retries(2);
        h.store.insert(job.clone()).await;

        h.scheduler.trigger(job.id).await.unwrap();
        assert_eq!(next_terminal(&mut h).await, job.id);

        // The first run plus two retries, then nothing more
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(h.hooks.dispatches.load(Ordering::SeqCst), 3);
        assert!(h.terminal.try_recv().is_err());
        assert_eq!(h.store.get(job.id).await.unwrap().retry_count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_job_does_not_abort_scan() {
        let h = harness();
        let mut seen = executor(&h, ExecutionOutcome::success());
        let now = Utc::now();
        let broken = JobDefinition::new("report", "workers", ScheduleType::Cron, "not a cron")
            .with_next_execution_time(now);
        let valid = fixed_rate("1h", now);
        h.store.insert(broken.clone()).await;
        h.store.insert(valid.clone()).await;

        let report = h.scheduler.scan_once(now).await;
        assert_eq!(report.candidates, 2);
        assert_eq!(report.errors, 1);
        assert_eq!(report.scheduled, 1);

        assert_eq!(next_request(&mut seen).await.job_id, valid.id);
        assert!(!h.scheduler.status(broken.id).scheduled);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fixed_rate_resubmits_on_completion() {
        let h = harness();
        let mut seen = executor(&h, ExecutionOutcome::success());
        let now = Utc::now();
        let job = fixed_rate("300ms", now);
        h.store.insert(job.clone()).await;

        assert_eq!(h.scheduler.scan_once(now).await.scheduled, 1);

        // No further scan runs; the next occurrence comes from the completion path
        let first = next_request(&mut seen).await;
        let second = next_request(&mut seen).await;
        assert_eq!(second.job_id, job.id);
        assert!(second.dispatched_at - first.dispatched_at >= chrono::Duration::milliseconds(200));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_saturated_pool_still_times_out_invocations() {
        let mut h = harness_with(EngineConfig {
            execution_workers: 1,
            execution_queue: 1,
            invocation_timeout: Duration::from_millis(200),
            ..test_config()
        });
        // Accepts requests but never answers them
        let (_connection, _requests) = h.transport.connect("workers");

        let mut jobs = Vec::new();
        for _ in 0..3 {
            let job = JobDefinition::new("import", "workers", ScheduleType::Manual, "");
            h.store.insert(job.clone()).await;
            h.scheduler.trigger(job.id).await.unwrap();
            jobs.push(job.id);
        }

        // One running, one queued, one holding the wheel until a slot frees
        let mut failed = Vec::new();
        for _ in 0..3 {
            failed.push(next_terminal(&mut h).await);
        }
        failed.sort();
        jobs.sort();
        assert_eq!(failed, jobs);

        let scheduler = Arc::clone(&h.scheduler);
        tokio::time::timeout(
            Duration::from_secs(2),
            tokio::task::spawn_blocking(move || scheduler.shutdown()),
        )
        .await
        .expect("shutdown hung")
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_with_busy_pool_returns() {
        let h = harness_with(EngineConfig {
            execution_workers: 1,
            execution_queue: 1,
            invocation_timeout: Duration::from_secs(60),
            ..test_config()
        });
        let (_connection, _requests) = h.transport.connect("workers");

        for _ in 0..3 {
            let job = JobDefinition::new("import", "workers", ScheduleType::Manual, "");
            h.store.insert(job.clone()).await;
            h.scheduler.trigger(job.id).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        let scheduler = Arc::clone(&h.scheduler);
        tokio::time::timeout(
            Duration::from_secs(2),
            tokio::task::spawn_blocking(move || scheduler.shutdown()),
        )
        .await
        .expect("shutdown hung")
        .unwrap();
        assert_eq!(h.scheduler.pending_invocations(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_trigger_errors() {
        let h = harness();
        let err = h.scheduler.trigger(uuid::Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());

        let job = JobDefinition::new("import", "workers", ScheduleType::Manual, "");
        h.store.insert(job.clone()).await;
        h.scheduler.pause(job.id).await.unwrap();
        let err = h.scheduler.trigger(job.id).await.unwrap_err();
        assert!(matches!(err, EngineError::NotRunnable { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_response_is_ignored() {
        let h = harness();
        assert!(!h.scheduler.on_final("conn", 9_999, ExecutionOutcome::success()));
        assert_eq!(h.scheduler.pending_invocations(), 0);
    }
}
