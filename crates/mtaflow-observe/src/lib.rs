//! Observability setup for hosts embedding the mtaflow step machine.

pub mod tracing_setup;
