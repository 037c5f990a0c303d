//! Application lifecycle steps: create or update, start, stop and undeploy.

use futures_util::future::BoxFuture;
use mtaflow_types::platform::{AppState, CloudApplication};
use mtaflow_types::process::{AsyncExecutionState, StepPhase};

use super::tolerate_missing_permissions;
use crate::step::body::{PollErrorPolicy, StepBody};
use crate::step::context::ProcessContext;
use crate::step::error::StepError;
use crate::step::execution::AsyncExecution;
use crate::vars;

pub const CREATE_OR_UPDATE_APP: &str = "createOrUpdateApp";
pub const START_APP: &str = "startApp";
pub const STOP_APP: &str = "stopApp";
pub const UNDEPLOY_APP: &str = "undeployApp";

fn app_name(ctx: &ProcessContext) -> String {
    ctx.get(&vars::APP_TO_PROCESS)
        .ok()
        .flatten()
        .map(|a| a.name)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Create or update
// ---------------------------------------------------------------------------

/// Creates the application, or updates it in place when it already exists,
/// then binds its services and maps its routes.
#[derive(Debug, Default)]
pub struct CreateOrUpdateAppStep;

impl CreateOrUpdateAppStep {
    async fn create_or_update(&self, ctx: &mut ProcessContext) -> Result<StepPhase, StepError> {
        let app = ctx.require(&vars::APP_TO_PROCESS)?;
        let platform = ctx.platform().clone();

        let existing = match platform.get_application(&app.name).await {
            Ok(existing) => Some(existing),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };

        match existing {
            Some(existing) => {
                ctx.info(format!("Updating application \"{}\"", app.name));
                platform.update_application(&app).await?;
                if existing.env != app.env {
                    platform.update_application_env(&app.name, &app.env).await?;
                }
                self.unbind_removed_services(ctx, &existing, &app).await?;
            }
            None => {
                ctx.info(format!("Creating application \"{}\"", app.name));
                platform.create_application(&app).await?;
            }
        }

        for service in &app.services {
            match platform.bind_service(&app.name, service).await {
                Ok(()) => ctx.debug(&format!("bound service \"{service}\" to \"{}\"", app.name)),
                Err(e) if e.is_conflict() => ctx.info(format!(
                    "Service \"{service}\" is already bound to application \"{}\"",
                    app.name
                )),
                Err(e) => return Err(e.into()),
            }
        }
        for uri in &app.routes {
            platform.add_route(&app.name, uri).await?;
        }

        ctx.info(format!("Application \"{}\" is up to date", app.name));
        Ok(StepPhase::Done)
    }

    async fn unbind_removed_services(
        &self,
        ctx: &mut ProcessContext,
        existing: &CloudApplication,
        desired: &CloudApplication,
    ) -> Result<(), StepError> {
        let platform = ctx.platform().clone();
        for service in existing.services.iter().filter(|s| !desired.services.contains(s)) {
            match platform.unbind_service(&desired.name, service).await {
                Ok(()) => ctx.info(format!("Unbound service \"{service}\" from \"{}\"", desired.name)),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl StepBody for CreateOrUpdateAppStep {
    fn name(&self) -> &str {
        CREATE_OR_UPDATE_APP
    }

    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<StepPhase, StepError>> {
        Box::pin(self.create_or_update(ctx))
    }

    fn error_message(&self, ctx: &ProcessContext) -> String {
        format!("Error creating or updating application \"{}\"", app_name(ctx))
    }
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

/// Starts the application and waits for its instances to run.
///
/// A crash while starting moves the step to RETRY instead of failing it, so
/// a restart of the operation starts the application again.
#[derive(Debug, Default)]
pub struct StartAppStep;

impl StartAppStep {
    async fn start(&self, ctx: &mut ProcessContext) -> Result<StepPhase, StepError> {
        let app = ctx.require(&vars::APP_TO_PROCESS)?;
        ctx.info(format!("Starting application \"{}\"", app.name));
        ctx.platform().clone().start_application(&app.name).await?;
        Ok(StepPhase::Poll)
    }
}

impl StepBody for StartAppStep {
    fn name(&self) -> &str {
        START_APP
    }

    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<StepPhase, StepError>> {
        Box::pin(self.start(ctx))
    }

    fn async_executions(&self) -> Vec<Box<dyn AsyncExecution>> {
        vec![Box::new(PollAppStartExecution)]
    }

    fn error_message(&self, ctx: &ProcessContext) -> String {
        format!("Error starting application \"{}\"", app_name(ctx))
    }

    fn poll_error_policy(&self) -> PollErrorPolicy {
        PollErrorPolicy::Retry
    }
}

/// Polls the state of the application started by [`StartAppStep`].
#[derive(Debug, Default)]
pub struct PollAppStartExecution;

impl PollAppStartExecution {
    async fn poll(&self, ctx: &mut ProcessContext) -> Result<AsyncExecutionState, StepError> {
        let app = ctx.require(&vars::APP_TO_PROCESS)?;
        let platform = ctx.platform().clone();

        match platform.get_application_state(&app.name).await? {
            AppState::Running => {
                ctx.info(format!("Application \"{}\" started", app.name));
                Ok(AsyncExecutionState::Finished)
            }
            AppState::Staging | AppState::Starting => Ok(AsyncExecutionState::Running),
            state @ (AppState::Crashed | AppState::Stopped) => {
                match platform.get_recent_logs(&app.name).await {
                    Ok(logs) => {
                        for line in logs {
                            ctx.debug(&line);
                        }
                    }
                    Err(e) => ctx.warn(format!("Could not fetch recent logs of application \"{}\": {e}", app.name)),
                }
                ctx.warn(format!("Application \"{}\" did not start, state is {state:?}", app.name));
                Ok(AsyncExecutionState::Error)
            }
        }
    }
}

impl AsyncExecution for PollAppStartExecution {
    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<AsyncExecutionState, StepError>> {
        Box::pin(self.poll(ctx))
    }

    fn polling_error_message(&self, ctx: &ProcessContext) -> String {
        format!("Error starting application \"{}\"", app_name(ctx))
    }
}

// ---------------------------------------------------------------------------
// Stop
// ---------------------------------------------------------------------------

/// Stops the application. Usually wrapped in
/// [`WithHooks`](crate::step::hooks::WithHooks) with the stop hook phases.
#[derive(Debug, Default)]
pub struct StopAppStep;

impl StopAppStep {
    async fn stop(&self, ctx: &mut ProcessContext) -> Result<StepPhase, StepError> {
        let app = ctx.require(&vars::APP_TO_PROCESS)?;
        match ctx.platform().clone().stop_application(&app.name).await {
            Ok(()) => ctx.info(format!("Stopped application \"{}\"", app.name)),
            Err(e) if e.is_not_found() => ctx.info(format!("Application \"{}\" does not exist", app.name)),
            Err(e) => return Err(e.into()),
        }
        Ok(StepPhase::Done)
    }
}

impl StepBody for StopAppStep {
    fn name(&self) -> &str {
        STOP_APP
    }

    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<StepPhase, StepError>> {
        Box::pin(self.stop(ctx))
    }

    fn error_message(&self, ctx: &ProcessContext) -> String {
        format!("Error stopping application \"{}\"", app_name(ctx))
    }
}

// ---------------------------------------------------------------------------
// Undeploy
// ---------------------------------------------------------------------------

/// Unbinds the services of the application and deletes it.
#[derive(Debug, Default)]
pub struct UndeployAppStep;

impl UndeployAppStep {
    async fn undeploy(&self, ctx: &mut ProcessContext) -> Result<StepPhase, StepError> {
        let app = ctx.require(&vars::APP_TO_PROCESS)?;
        let platform = ctx.platform().clone();

        for service in &app.services {
            match platform.unbind_service(&app.name, service).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    let activity = format!("unbinding service \"{service}\"");
                    tolerate_missing_permissions(ctx, e, &activity)?;
                }
            }
        }

        match platform.delete_application(&app.name).await {
            Ok(()) => ctx.info(format!("Deleted application \"{}\"", app.name)),
            Err(e) if e.is_not_found() => ctx.info(format!("Application \"{}\" is already deleted", app.name)),
            Err(e) => return Err(e.into()),
        }
        Ok(StepPhase::Done)
    }
}

impl StepBody for UndeployAppStep {
    fn name(&self) -> &str {
        UNDEPLOY_APP
    }

    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<StepPhase, StepError>> {
        Box::pin(self.undeploy(ctx))
    }

    fn error_message(&self, ctx: &ProcessContext) -> String {
        format!("Error undeploying application \"{}\"", app_name(ctx))
    }
}
