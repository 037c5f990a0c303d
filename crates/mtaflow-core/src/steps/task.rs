//! Running one-off application tasks listed in `tasksToExecute`.

use futures_util::future::BoxFuture;
use mtaflow_types::platform::TaskState;
use mtaflow_types::process::{AsyncExecutionState, StepPhase};

use crate::step::body::StepBody;
use crate::step::context::ProcessContext;
use crate::step::error::StepError;
use crate::step::execution::AsyncExecution;
use crate::vars;

pub const EXECUTE_TASK: &str = "executeTask";

/// Starts the task at `tasksIndex` on the application being processed.
#[derive(Debug, Default)]
pub struct ExecuteTaskStep;

impl ExecuteTaskStep {
    async fn run_task(&self, ctx: &mut ProcessContext) -> Result<StepPhase, StepError> {
        let app = ctx.require(&vars::APP_TO_PROCESS)?;
        let tasks = ctx.require(&vars::TASKS_TO_EXECUTE)?;
        let index = ctx.get(&vars::index(vars::TASKS_PREFIX))?.unwrap_or(0);
        let task = tasks.get(index).cloned().ok_or_else(|| {
            StepError::Content(format!("no task at index {index}, {} configured", tasks.len()))
        })?;

        ctx.info(format!("Executing task \"{}\" on application \"{}\"", task.name, app.name));
        let started = ctx.platform().clone().run_task(&app.name, &task).await?;
        ctx.set(&vars::STARTED_TASK, started)?;
        Ok(StepPhase::Poll)
    }
}

impl StepBody for ExecuteTaskStep {
    fn name(&self) -> &str {
        EXECUTE_TASK
    }

    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<StepPhase, StepError>> {
        Box::pin(self.run_task(ctx))
    }

    fn async_executions(&self) -> Vec<Box<dyn AsyncExecution>> {
        vec![Box::new(PollTaskExecution)]
    }

    fn error_message(&self, ctx: &ProcessContext) -> String {
        let app = ctx.get(&vars::APP_TO_PROCESS).ok().flatten().map(|a| a.name).unwrap_or_default();
        format!("Error executing task on application \"{app}\"")
    }
}

/// Polls the task recorded in `startedTask`.
#[derive(Debug, Default)]
pub struct PollTaskExecution;

impl PollTaskExecution {
    async fn poll(&self, ctx: &mut ProcessContext) -> Result<AsyncExecutionState, StepError> {
        let started = ctx.require(&vars::STARTED_TASK)?;
        let guid = started
            .guid
            .ok_or_else(|| StepError::Content(format!("task \"{}\" has no guid", started.name)))?;

        let task = ctx.platform().clone().get_task(&guid).await?;
        match task.state {
            Some(TaskState::Succeeded) => {
                ctx.info(format!("Task \"{}\" succeeded", started.name));
                Ok(AsyncExecutionState::Finished)
            }
            Some(TaskState::Failed) => {
                let reason = task.failure_reason.unwrap_or_else(|| "unknown reason".to_string());
                ctx.error(format!("Task \"{}\" failed: {reason}", started.name));
                Ok(AsyncExecutionState::Error)
            }
            _ => Ok(AsyncExecutionState::Running),
        }
    }
}

impl AsyncExecution for PollTaskExecution {
    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<AsyncExecutionState, StepError>> {
        Box::pin(self.poll(ctx))
    }

    fn polling_error_message(&self, ctx: &ProcessContext) -> String {
        let task = ctx.get(&vars::STARTED_TASK).ok().flatten().map(|t| t.name).unwrap_or_default();
        format!("Error executing task \"{task}\"")
    }
}
