//! Timer layer
//!
//! A hashed wheel timer for cancellable delayed execution. Tasks are
//! submitted with a delay and handed to a [`TaskExecutor`] when they expire.
//! The wheel knows nothing about jobs.

mod wheel;

pub use wheel::{TaskExecutor, TimerConfig, TimerTask, TimerWheel, Timeout};
