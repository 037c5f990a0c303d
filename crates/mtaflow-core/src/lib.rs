//! Step execution core and port trait definitions for mtaflow.
//!
//! This crate defines the "ports" (variable store, platform client, engine
//! facade, progress messages, operation lock) that the infrastructure layer
//! and the host engine implement, plus the step phase machine, async execution
//! chaining, dependency resolution and the concrete deployment steps. It depends
//! only on `mtaflow-types` -- never on `mtaflow-infra` or any database/IO crate.

pub mod deploy;
pub mod engine;
pub mod lock;
pub mod platform;
pub mod repository;
pub mod step;
pub mod steps;
pub mod store;
pub mod subprocess;
pub mod variables;
pub mod vars;

#[cfg(test)]
pub(crate) mod testing;
