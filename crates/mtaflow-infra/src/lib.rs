//! Infrastructure layer for mtaflow.
//!
//! Contains implementations of the storage traits defined in `mtaflow-core`:
//! SQLite persistence for process variables, progress messages and operation
//! locks, an in-memory variable store, and the `mtaflow.toml` loader.

pub mod config;
pub mod memory;
pub mod sqlite;
