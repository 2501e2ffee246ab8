//! Service Module
//!
//! Business logic layer for the coordinator.
//! Services orchestrate between repositories and the scheduling engine.

pub mod job;

// Re-export for convenience
pub use job as job_service;
