//! Step execution: the EXECUTE / POLL / RETRY / WAIT phase machine, async
//! execution chaining and the helpers shared by every step.

pub mod body;
pub mod context;
pub mod controller;
pub mod error;
pub mod execution;
pub mod helper;
pub mod hooks;
pub mod iteration;
pub mod runner;

pub use body::{PollErrorPolicy, StepBody};
pub use context::{Collaborators, ProcessContext};
pub use controller::{PhaseController, StepOutcome};
pub use error::StepError;
pub use execution::AsyncExecution;
pub use runner::StepRunner;
