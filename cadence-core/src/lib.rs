//! Cadence Core
//!
//! Core types shared by the Cadence scheduling engine and the coordinator.
//!
//! This crate contains:
//! - Domain types: Job definitions, schedule types, execution outcomes
//! - DTOs: Messages exchanged with remote executors

pub mod domain;
pub mod dto;
