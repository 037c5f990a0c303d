//! Chaining of async execution units across invocations.
//!
//! An async step owns an ordered list of units. The list is rebuilt from the
//! step on every invocation; only the index of the active unit is persisted
//! (`asyncStepExecutionIndex`). Each POLL invocation drives exactly one unit
//! once.

use futures_util::future::BoxFuture;
use mtaflow_types::process::{AsyncExecutionState, StepPhase};

use super::body::PollErrorPolicy;
use super::context::ProcessContext;
use super::error::StepError;
use crate::vars;

/// One unit of polling work.
pub trait AsyncExecution: Send + Sync {
    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<AsyncExecutionState, StepError>>;

    /// Names the concrete app/service being polled, for error annotation.
    fn polling_error_message(&self, ctx: &ProcessContext) -> String;
}

/// Drive the active unit once and compute the next phase.
///
/// - RUNNING keeps the step in POLL on the same unit.
/// - FINISHED advances the index; DONE once the last unit has finished.
/// - ERROR fails or retries according to `policy`.
pub async fn poll_chain(
    units: &[Box<dyn AsyncExecution>],
    ctx: &mut ProcessContext,
    policy: PollErrorPolicy,
) -> Result<StepPhase, StepError> {
    let index = ctx.get(&vars::ASYNC_STEP_EXECUTION_INDEX)?.unwrap_or(0);
    let Some(unit) = units.get(index) else {
        // Nothing (left) to poll.
        return Ok(StepPhase::Done);
    };

    let state = match unit.execute(ctx).await {
        Ok(state) => state,
        Err(err) => return Err(err.annotate(unit.polling_error_message(ctx))),
    };

    match state {
        AsyncExecutionState::Running => Ok(StepPhase::Poll),
        AsyncExecutionState::Finished => {
            let next = index + 1;
            ctx.set(&vars::ASYNC_STEP_EXECUTION_INDEX, next)?;
            if next >= units.len() {
                Ok(StepPhase::Done)
            } else {
                Ok(StepPhase::Poll)
            }
        }
        AsyncExecutionState::Error => match policy {
            PollErrorPolicy::Fail => Err(StepError::AsyncOperationFailed(unit.polling_error_message(ctx))),
            PollErrorPolicy::Retry => {
                let message = unit.polling_error_message(ctx);
                ctx.warn(message);
                Ok(StepPhase::Retry)
            }
        },
    }
}
