//! Data Transfer Objects
//!
//! This module contains DTOs exchanged between the coordinator, its HTTP
//! clients and remote executors. They are serialized as JSON.

pub mod dispatch;
pub mod job;
