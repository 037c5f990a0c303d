use futures_util::future::BoxFuture;
use mtaflow_types::process::StepPhase;

use super::tolerate_missing_permissions;
use crate::step::body::StepBody;
use crate::step::context::ProcessContext;
use crate::step::error::StepError;
use crate::vars;

pub const DELETE_ROUTES: &str = "deleteRoutes";

/// Deletes the routes of the application being processed.
#[derive(Debug, Default)]
pub struct DeleteRoutesStep;

impl DeleteRoutesStep {
    async fn delete_routes(&self, ctx: &mut ProcessContext) -> Result<StepPhase, StepError> {
        let app = ctx.require(&vars::APP_TO_PROCESS)?;
        let platform = ctx.platform().clone();

        for uri in &app.routes {
            match platform.delete_route(uri).await {
                Ok(()) => ctx.info(format!("Deleted route \"{uri}\"")),
                Err(e) if e.is_not_found() => ctx.info(format!("Route \"{uri}\" is already deleted")),
                Err(e) if e.is_conflict() => {
                    ctx.info(format!("Route \"{uri}\" is still in use and will not be deleted"))
                }
                Err(e) => tolerate_missing_permissions(ctx, e, &format!("deleting route \"{uri}\""))?,
            }
        }
        Ok(StepPhase::Done)
    }
}

impl StepBody for DeleteRoutesStep {
    fn name(&self) -> &str {
        DELETE_ROUTES
    }

    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<StepPhase, StepError>> {
        Box::pin(self.delete_routes(ctx))
    }

    fn error_message(&self, ctx: &ProcessContext) -> String {
        let app = ctx.get(&vars::APP_TO_PROCESS).ok().flatten().map(|a| a.name).unwrap_or_default();
        format!("Error deleting routes of application \"{app}\"")
    }
}
