//! Cadence dispatch engine
//!
//! Decides when registered jobs are due, dispatches execution requests to
//! remote executors and tracks every dispatch until it settles.

pub mod config;
pub mod error;
pub mod guard;
pub mod hooks;
pub mod invocation;
pub mod pool;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod strategy;
pub mod timer;
pub mod transport;

pub use config::EngineConfig;
pub use error::{DispatchError, EngineError, Result, ScheduleError, StoreError, TimerError};
pub use hooks::{LifecycleHooks, NoopHooks, TracingHooks};
pub use scheduler::{JobRuntimeStatus, ScanReport, Scheduler};
pub use store::{DueWindow, InMemoryJobStore, JobStore};
pub use transport::{ChannelTransport, ExecutorResolver, Transport};
