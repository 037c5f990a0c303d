//! Async execution unit that follows the children of a parallel batch to
//! their end.
//!
//! The monitor never sleeps: every POLL invocation inspects each running
//! child once. A child that is neither visible as a pending job nor as an
//! ended historic instance is still starting up and treated as running.

use futures_util::future::BoxFuture;
use mtaflow_types::error::EngineError;
use mtaflow_types::process::{AsyncExecutionState, SubProcessSlot, SubProcessState};

use crate::step::context::ProcessContext;
use crate::step::error::StepError;
use crate::step::execution::AsyncExecution;
use crate::vars;

/// How a failed or aborted child affects the parent step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubProcessFailurePolicy {
    /// Fail the parent step.
    #[default]
    Escalate,
    /// Log a warning and let the parent continue.
    WarnOnly,
}

/// What one inspection of a child found.
enum ChildStatus {
    Running,
    Completed,
    Failed(String),
    Aborted(String),
}

#[derive(Debug, Clone, Default)]
pub struct MonitorSubProcessExecution {
    policy: SubProcessFailurePolicy,
    /// Variables copied from every finished child into the parent.
    copied_variables: Vec<String>,
}

impl MonitorSubProcessExecution {
    pub fn new(policy: SubProcessFailurePolicy, copied_variables: Vec<String>) -> Self {
        Self {
            policy,
            copied_variables,
        }
    }

    /// Inspects every running slot and reports FINISHED once none is left.
    ///
    /// All slots are inspected before an escalated failure is returned, so
    /// siblings that ended in the same round are recorded too. A failed
    /// query stops the round; slots already inspected keep their new state.
    async fn monitor(&self, ctx: &mut ProcessContext) -> Result<AsyncExecutionState, StepError> {
        let mut slots = ctx.get(&vars::SUB_PROCESSES)?.unwrap_or_default();
        let mut failure = None;

        for slot in slots.iter_mut().filter(|s| s.is_running()) {
            match self.check(ctx, &slot.instance_id).await {
                Ok(status) => {
                    if let Err(e) = self.apply(ctx, slot, status).await {
                        failure.get_or_insert(e);
                    }
                }
                Err(e) => {
                    failure = Some(StepError::Monitoring {
                        instance_id: slot.instance_id.clone(),
                        message: e.to_string(),
                    });
                    break;
                }
            }
        }

        let finished = slots.iter().all(|s| !s.is_running());
        ctx.set(&vars::SUB_PROCESSES, slots)?;
        match failure {
            Some(e) => Err(e),
            None if finished => Ok(AsyncExecutionState::Finished),
            None => Ok(AsyncExecutionState::Running),
        }
    }

    async fn check(&self, ctx: &ProcessContext, sub_process_id: &str) -> Result<ChildStatus, EngineError> {
        let engine = ctx.engine().clone();

        if let Some(job) = engine.pending_job(sub_process_id).await? {
            return Ok(match job.exception_message {
                Some(message) => ChildStatus::Failed(message),
                None => ChildStatus::Running,
            });
        }

        let Some(instance) = engine.historic_instance(sub_process_id).await? else {
            ctx.debug(&format!("sub-process {sub_process_id} not visible yet"));
            return Ok(ChildStatus::Running);
        };
        if instance.end_time.is_none() {
            return Ok(ChildStatus::Running);
        }

        Ok(match instance.delete_reason {
            Some(reason) => ChildStatus::Aborted(reason),
            None => ChildStatus::Completed,
        })
    }

    async fn apply(&self, ctx: &mut ProcessContext, slot: &mut SubProcessSlot, status: ChildStatus) -> Result<(), StepError> {
        match status {
            ChildStatus::Running => Ok(()),
            ChildStatus::Completed => {
                self.on_success(ctx, slot).await?;
                slot.state = SubProcessState::Succeeded;
                Ok(())
            }
            ChildStatus::Failed(message) => {
                slot.state = SubProcessState::Failed;
                self.on_error(ctx, slot, &message)
            }
            ChildStatus::Aborted(reason) => {
                slot.state = SubProcessState::Failed;
                self.on_abort(ctx, slot, &reason)
            }
        }
    }

    async fn on_success(&self, ctx: &mut ProcessContext, slot: &SubProcessSlot) -> Result<(), StepError> {
        let engine = ctx.engine().clone();
        for name in &self.copied_variables {
            let value = engine
                .historic_variable(&slot.instance_id, name)
                .await
                .map_err(|e| StepError::Monitoring {
                    instance_id: slot.instance_id.clone(),
                    message: e.to_string(),
                })?;
            if let Some(value) = value {
                ctx.vars_mut().set_raw(name.clone(), value);
            }
        }
        ctx.debug(&format!("sub-process {} of module {} ended", slot.instance_id, slot.node));
        Ok(())
    }

    fn on_error(&self, ctx: &mut ProcessContext, slot: &SubProcessSlot, message: &str) -> Result<(), StepError> {
        let text = format!(
            "Sub-process \"{}\" of module \"{}\" failed: {message}",
            slot.instance_id, slot.node
        );
        match self.policy {
            SubProcessFailurePolicy::Escalate => Err(StepError::AsyncOperationFailed(text)),
            SubProcessFailurePolicy::WarnOnly => {
                ctx.warn(text);
                Ok(())
            }
        }
    }

    fn on_abort(&self, ctx: &mut ProcessContext, slot: &SubProcessSlot, reason: &str) -> Result<(), StepError> {
        let text = format!(
            "Sub-process \"{}\" of module \"{}\" was aborted ({reason})",
            slot.instance_id, slot.node
        );
        match self.policy {
            SubProcessFailurePolicy::Escalate => Err(StepError::Aborted.annotate(text)),
            SubProcessFailurePolicy::WarnOnly => {
                ctx.warn(text);
                Ok(())
            }
        }
    }
}

impl AsyncExecution for MonitorSubProcessExecution {
    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<AsyncExecutionState, StepError>> {
        Box::pin(self.monitor(ctx))
    }

    fn polling_error_message(&self, ctx: &ProcessContext) -> String {
        let running: Vec<String> = ctx
            .get(&vars::SUB_PROCESSES)
            .ok()
            .flatten()
            .unwrap_or_default()
            .into_iter()
            .filter(|s| s.is_running())
            .map(|s| s.instance_id)
            .collect();
        format!("Error monitoring sub-processes [{}]", running.join(", "))
    }
}
