//! Starting child process instances and monitoring them until they end.

pub mod monitor;
pub mod starter;

pub use monitor::{MonitorSubProcessExecution, SubProcessFailurePolicy};
pub use starter::StartSubProcessStep;
