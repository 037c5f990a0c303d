//! Bookkeeping shared by all steps: task index, error persistence and the
//! abort check.

use mtaflow_types::process::StepPhase;

use super::context::ProcessContext;
use super::error::StepError;
use crate::vars;

pub struct ProcessStepHelper;

impl ProcessStepHelper {
    /// Prepare the bookkeeping variables before the step body runs.
    ///
    /// A fresh execution gets the next task index. Re-running a step that
    /// failed keeps its index, drops its earlier error messages and clears
    /// the stored error type.
    pub fn pre_execute_step(ctx: &mut ProcessContext, phase: StepPhase) -> Result<(), StepError> {
        let step_name = ctx.step_name().to_string();
        ctx.set(&vars::TASK_ID, step_name.clone())?;

        let in_error = ctx.get(&vars::ERROR_TYPE)?.is_some();
        if in_error {
            ctx.clear_previous_errors();
            ctx.remove(&vars::ERROR_TYPE);
        } else if phase == StepPhase::Execute {
            let index = ctx.get(&vars::TASK_INDEX)?.unwrap_or(0);
            ctx.set(&vars::TASK_INDEX, index + 1)?;
        }

        if phase != StepPhase::Poll {
            ctx.task_startup(format!("Executing step \"{step_name}\""));
        }
        Ok(())
    }

    /// Report a step failure to the operator and remember its classification.
    pub fn log_exception_and_store(ctx: &mut ProcessContext, err: &StepError) {
        ctx.error(err.to_string());
        if let Err(e) = ctx.set(&vars::ERROR_TYPE, err.error_type()) {
            tracing::warn!(instance_id = %ctx.instance_id(), error = %e, "failed to store error type");
        }
    }

    pub fn fail_step_if_process_is_aborted(ctx: &ProcessContext) -> Result<(), StepError> {
        if ctx.get(&vars::PROCESS_ABORTED)?.unwrap_or(false) {
            return Err(StepError::Aborted);
        }
        Ok(())
    }
}
