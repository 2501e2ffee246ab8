//! Core domain types
//!
//! This module contains the core domain structures used across Cadence crates.
//! These types represent the fundamental business entities and are shared between
//! the coordinator (for persistence) and the engine (for scheduling and dispatch).

pub mod event;
pub mod invocation;
pub mod job;
