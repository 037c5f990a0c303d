//! Shared domain types for mtaflow.
//!
//! This crate contains the domain types used across the deployment orchestrator:
//! step phases, async execution states, deployment graph nodes, cloud platform
//! resources, progress messages, configuration and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod deploy;
pub mod error;
pub mod platform;
pub mod process;
