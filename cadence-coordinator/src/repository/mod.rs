//! Repository Module
//!
//! Data access layer for the coordinator.

pub mod job;

// Re-export for convenience
pub use job as job_repository;
pub use job::PgJobStore;
