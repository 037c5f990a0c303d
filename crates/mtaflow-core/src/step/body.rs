//! The contract a concrete step implements.

use std::time::Duration;

use futures_util::future::BoxFuture;
use mtaflow_types::process::StepPhase;

use super::context::ProcessContext;
use super::error::StepError;
use super::execution::AsyncExecution;

/// What happens when an async execution unit reports ERROR.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PollErrorPolicy {
    /// Fail the operation with the unit's polling error message.
    #[default]
    Fail,
    /// Move the step to RETRY so the primary body runs again.
    Retry,
}

/// A unit of the deployment graph.
///
/// Implementations are stateless strategy objects: anything needed across
/// invocations goes into the [`ProcessContext`] variables. A synchronous step
/// returns [`StepPhase::Done`] from [`execute`](Self::execute); an asynchronous
/// one triggers remote work, returns [`StepPhase::Poll`] and lists the units
/// that observe that work in [`async_executions`](Self::async_executions).
pub trait StepBody: Send + Sync {
    fn name(&self) -> &str;

    /// Primary body, run on EXECUTE and RETRY.
    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<StepPhase, StepError>>;

    /// Units polled in order while the step is in POLL. Rebuilt on every call.
    fn async_executions(&self) -> Vec<Box<dyn AsyncExecution>> {
        Vec::new()
    }

    /// Human-readable description used to annotate errors of the primary body.
    fn error_message(&self, ctx: &ProcessContext) -> String;

    /// Step-specific timeout for the POLL phase.
    fn timeout(&self, _ctx: &ProcessContext) -> Option<Duration> {
        None
    }

    fn poll_error_policy(&self) -> PollErrorPolicy {
        PollErrorPolicy::Fail
    }
}
