//! Service instance creation and deletion, and polling of the operations the
//! service broker performs asynchronously for them.

use std::collections::BTreeMap;

use futures_util::future::BoxFuture;
use mtaflow_types::platform::{ServiceOperation, ServiceOperationState, ServiceOperationType};
use mtaflow_types::process::{AsyncExecutionState, StepPhase};

use super::tolerate_missing_permissions;
use crate::step::body::StepBody;
use crate::step::context::ProcessContext;
use crate::step::error::StepError;
use crate::step::execution::AsyncExecution;
use crate::vars;

pub const CREATE_SERVICE: &str = "createService";
pub const DELETE_SERVICES: &str = "deleteServices";

const DEFAULT_FAILED_OPERATION_DESCRIPTION: &str = "Operation failed without a description from the service broker";

fn start_polling(ctx: &mut ProcessContext, triggered: BTreeMap<String, ServiceOperationType>) -> Result<StepPhase, StepError> {
    let has_operations = !triggered.is_empty();
    ctx.set(&vars::TRIGGERED_SERVICE_OPERATIONS, triggered)?;
    ctx.remove(&vars::SERVICES_TO_POLL);
    Ok(if has_operations { StepPhase::Poll } else { StepPhase::Done })
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// Creates the service instance being processed unless it already exists.
#[derive(Debug, Default)]
pub struct CreateServiceStep;

impl CreateServiceStep {
    async fn create(&self, ctx: &mut ProcessContext) -> Result<StepPhase, StepError> {
        let service = ctx.require(&vars::SERVICE_TO_PROCESS)?;
        let platform = ctx.platform().clone();

        match platform.get_service_instance(&service.name).await {
            Ok(_) => {
                ctx.info(format!("Service \"{}\" already exists", service.name));
                return start_polling(ctx, BTreeMap::new());
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        ctx.info(format!("Creating service \"{}\" from offering \"{}\"", service.name, service.label));
        if let Err(e) = platform.create_service_instance(&service).await {
            if service.optional {
                ctx.warn(format!(
                    "Could not create optional service \"{}\": {}",
                    service.name, e.description
                ));
                return start_polling(ctx, BTreeMap::new());
            }
            return Err(e.into());
        }

        start_polling(ctx, BTreeMap::from([(service.name, ServiceOperationType::Create)]))
    }
}

impl StepBody for CreateServiceStep {
    fn name(&self) -> &str {
        CREATE_SERVICE
    }

    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<StepPhase, StepError>> {
        Box::pin(self.create(ctx))
    }

    fn async_executions(&self) -> Vec<Box<dyn AsyncExecution>> {
        vec![Box::new(PollServiceOperationsExecution)]
    }

    fn error_message(&self, ctx: &ProcessContext) -> String {
        let name = ctx.get(&vars::SERVICE_TO_PROCESS).ok().flatten().map(|s| s.name).unwrap_or_default();
        format!("Error creating service \"{name}\"")
    }
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// Deletes every service listed in `servicesToDelete`.
#[derive(Debug, Default)]
pub struct DeleteServicesStep;

impl DeleteServicesStep {
    async fn delete(&self, ctx: &mut ProcessContext) -> Result<StepPhase, StepError> {
        let services = ctx.get(&vars::SERVICES_TO_DELETE)?.unwrap_or_default();
        let platform = ctx.platform().clone();
        let mut triggered = BTreeMap::new();

        for name in services {
            match platform.delete_service_instance(&name).await {
                Ok(()) => {
                    ctx.info(format!("Deleting service \"{name}\""));
                    triggered.insert(name, ServiceOperationType::Delete);
                }
                Err(e) if e.is_not_found() => ctx.info(format!("Service \"{name}\" is already deleted")),
                Err(e) if e.is_conflict() => {
                    ctx.info(format!("Service \"{name}\" has an operation in progress, waiting for it"));
                    triggered.insert(name, ServiceOperationType::Delete);
                }
                Err(e) => {
                    let activity = format!("deleting service \"{name}\"");
                    tolerate_missing_permissions(ctx, e, &activity)?;
                }
            }
        }

        start_polling(ctx, triggered)
    }
}

impl StepBody for DeleteServicesStep {
    fn name(&self) -> &str {
        DELETE_SERVICES
    }

    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<StepPhase, StepError>> {
        Box::pin(self.delete(ctx))
    }

    fn async_executions(&self) -> Vec<Box<dyn AsyncExecution>> {
        vec![Box::new(PollServiceOperationsExecution)]
    }

    fn error_message(&self, _ctx: &ProcessContext) -> String {
        "Error deleting services".to_string()
    }
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// Polls the last operation of every service with a triggered operation.
///
/// Only services whose operation is still in progress are kept in
/// `servicesToPoll` for the next invocation.
#[derive(Debug, Default)]
pub struct PollServiceOperationsExecution;

impl PollServiceOperationsExecution {
    async fn poll(&self, ctx: &mut ProcessContext) -> Result<AsyncExecutionState, StepError> {
        let triggered = ctx.get(&vars::TRIGGERED_SERVICE_OPERATIONS)?.unwrap_or_default();
        let to_poll = match ctx.get(&vars::SERVICES_TO_POLL)? {
            Some(services) if !services.is_empty() => services,
            _ => triggered.keys().cloned().collect::<Vec<_>>(),
        };
        if to_poll.is_empty() {
            return Ok(AsyncExecutionState::Finished);
        }

        let platform = ctx.platform().clone();
        let mut remaining = Vec::new();
        for name in to_poll {
            let op_type = triggered.get(&name).copied().unwrap_or(ServiceOperationType::Create);
            let last_operation = match platform.get_last_service_operation(&name).await {
                Ok(op) => op,
                Err(e) if e.is_not_found() && op_type == ServiceOperationType::Delete => None,
                Err(e) => return Err(StepError::Platform(e).annotate(format!("Error polling service \"{name}\""))),
            };

            let Some(operation) = last_operation else {
                handle_missing_operation(ctx, &name, op_type)?;
                continue;
            };
            let operation = with_default_description(operation);
            ctx.debug(&format!("last operation of service \"{name}\": {operation:?}"));

            match operation.state {
                ServiceOperationState::InProgress => remaining.push(name),
                ServiceOperationState::Succeeded => ctx.info(format!("Service \"{name}\" {}", done_verb(op_type))),
                ServiceOperationState::Failed => {
                    let description = operation.description.unwrap_or_default();
                    if is_optional(ctx, &name)? {
                        ctx.warn(format!("Optional service \"{name}\" failed: {description}"));
                    } else {
                        return Err(StepError::AsyncOperationFailed(format!(
                            "Service \"{name}\" {} failed: {description}",
                            noun(op_type)
                        )));
                    }
                }
            }
        }

        let finished = remaining.is_empty();
        ctx.set(&vars::SERVICES_TO_POLL, remaining)?;
        Ok(if finished {
            AsyncExecutionState::Finished
        } else {
            AsyncExecutionState::Running
        })
    }
}

fn with_default_description(operation: ServiceOperation) -> ServiceOperation {
    if operation.state == ServiceOperationState::Failed && operation.description.is_none() {
        return operation.with_description(DEFAULT_FAILED_OPERATION_DESCRIPTION);
    }
    operation
}

fn handle_missing_operation(ctx: &mut ProcessContext, name: &str, op_type: ServiceOperationType) -> Result<(), StepError> {
    match op_type {
        ServiceOperationType::Delete => {
            ctx.info(format!("Service \"{name}\" deleted"));
            Ok(())
        }
        _ => Err(StepError::AsyncOperationFailed(format!(
            "Cannot retrieve the last operation of service \"{name}\""
        ))),
    }
}

fn is_optional(ctx: &ProcessContext, name: &str) -> Result<bool, StepError> {
    Ok(ctx
        .get(&vars::SERVICE_TO_PROCESS)?
        .is_some_and(|s| s.name == name && s.optional))
}

fn noun(op_type: ServiceOperationType) -> &'static str {
    match op_type {
        ServiceOperationType::Create => "creation",
        ServiceOperationType::Update => "update",
        ServiceOperationType::Delete => "deletion",
    }
}

fn done_verb(op_type: ServiceOperationType) -> &'static str {
    match op_type {
        ServiceOperationType::Create => "created",
        ServiceOperationType::Update => "updated",
        ServiceOperationType::Delete => "deleted",
    }
}

impl AsyncExecution for PollServiceOperationsExecution {
    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<AsyncExecutionState, StepError>> {
        Box::pin(self.poll(ctx))
    }

    fn polling_error_message(&self, ctx: &ProcessContext) -> String {
        let names: Vec<String> = ctx
            .get(&vars::TRIGGERED_SERVICE_OPERATIONS)
            .ok()
            .flatten()
            .map(|t| t.into_keys().collect())
            .unwrap_or_default();
        format!("Error monitoring operations of services [{}]", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::step::controller::PhaseController;
    use crate::testing::TestEnv;
    use mtaflow_types::config::OrchestratorConfig;
    use mtaflow_types::error::PlatformError;
    use mtaflow_types::platform::CloudServiceInstance;
    use mtaflow_types::platform::ServiceOperationState::{Failed, InProgress, Succeeded};
    use mtaflow_types::platform::ServiceOperationType::{Create, Delete};

    fn db_service(optional: bool) -> CloudServiceInstance {
        CloudServiceInstance {
            name: "db".to_string(),
            label: "postgresql".to_string(),
            plan: "small".to_string(),
            optional,
            ..Default::default()
        }
    }

    fn controller() -> PhaseController {
        PhaseController::new(Arc::new(OrchestratorConfig::default()))
    }

    #[tokio::test]
    async fn create_then_poll_twice_then_finish_takes_four_invocations() {
        let env = TestEnv::new();
        env.platform.script_last_operations(
            "db",
            vec![
                Some(ServiceOperation::new(Create, InProgress)),
                Some(ServiceOperation::new(Create, InProgress)),
                Some(ServiceOperation::new(Create, Succeeded)),
            ],
        );
        let mut ctx = env.context(CREATE_SERVICE);
        ctx.set(&vars::SERVICE_TO_PROCESS, db_service(false)).unwrap();
        let controller = controller();

        let mut phases = Vec::new();
        for _ in 0..4 {
            phases.push(controller.run(&CreateServiceStep, &mut ctx).await.unwrap().phase);
        }

        assert_eq!(
            phases,
            vec![StepPhase::Poll, StepPhase::Poll, StepPhase::Poll, StepPhase::Done]
        );
        assert_eq!(env.platform.count_calls("create_service_instance:db"), 1);
        assert_eq!(env.platform.count_calls("get_last_service_operation:db"), 3);
    }

    #[tokio::test]
    async fn existing_service_is_not_recreated() {
        let env = TestEnv::new();
        env.platform.with_service(db_service(false));
        let mut ctx = env.context(CREATE_SERVICE);
        ctx.set(&vars::SERVICE_TO_PROCESS, db_service(false)).unwrap();

        assert_eq!(CreateServiceStep.execute(&mut ctx).await.unwrap(), StepPhase::Done);
        assert_eq!(env.platform.count_calls("create_service_instance:"), 0);
    }

    #[tokio::test]
    async fn failed_operation_without_description_gets_default() {
        let env = TestEnv::new();
        env.platform
            .script_last_operations("db", vec![Some(ServiceOperation::new(Create, Failed))]);
        let mut ctx = env.context(CREATE_SERVICE);
        ctx.set(&vars::SERVICE_TO_PROCESS, db_service(false)).unwrap();
        ctx.set(&vars::TRIGGERED_SERVICE_OPERATIONS, BTreeMap::from([("db".to_string(), Create)]))
            .unwrap();

        let err = PollServiceOperationsExecution.execute(&mut ctx).await.unwrap_err();
        assert!(err.to_string().contains(DEFAULT_FAILED_OPERATION_DESCRIPTION));
    }

    #[tokio::test]
    async fn failed_optional_service_only_warns() {
        let env = TestEnv::new();
        env.platform.script_last_operations(
            "db",
            vec![Some(ServiceOperation::new(Create, Failed).with_description("quota exceeded"))],
        );
        let mut ctx = env.context(CREATE_SERVICE);
        ctx.set(&vars::SERVICE_TO_PROCESS, db_service(true)).unwrap();
        ctx.set(&vars::TRIGGERED_SERVICE_OPERATIONS, BTreeMap::from([("db".to_string(), Create)]))
            .unwrap();

        let state = PollServiceOperationsExecution.execute(&mut ctx).await.unwrap();
        assert_eq!(state, AsyncExecutionState::Finished);
    }

    #[tokio::test]
    async fn only_in_progress_services_are_polled_again() {
        let env = TestEnv::new();
        env.platform
            .script_last_operations("a", vec![Some(ServiceOperation::new(Delete, Succeeded))])
            .script_last_operations("b", vec![Some(ServiceOperation::new(Delete, InProgress))]);
        let mut ctx = env.context(DELETE_SERVICES);
        ctx.set(
            &vars::TRIGGERED_SERVICE_OPERATIONS,
            BTreeMap::from([("a".to_string(), Delete), ("b".to_string(), Delete)]),
        )
        .unwrap();

        let state = PollServiceOperationsExecution.execute(&mut ctx).await.unwrap();
        assert_eq!(state, AsyncExecutionState::Running);
        assert_eq!(ctx.get(&vars::SERVICES_TO_POLL).unwrap(), Some(vec!["b".to_string()]));

        PollServiceOperationsExecution.execute(&mut ctx).await.unwrap();
        assert_eq!(env.platform.count_calls("get_last_service_operation:a"), 1);
        assert_eq!(env.platform.count_calls("get_last_service_operation:b"), 2);
    }

    #[tokio::test]
    async fn delete_handles_missing_conflicting_and_forbidden_services() {
        let env = TestEnv::new();
        env.platform
            .with_service(db_service(false))
            .fail_on("delete_service_instance:busy", PlatformError::new(409, "operation in progress"))
            .fail_on("delete_service_instance:locked", PlatformError::new(403, "not authorized"));
        let mut ctx = env.context(DELETE_SERVICES);
        ctx.set(
            &vars::SERVICES_TO_DELETE,
            vec!["db".to_string(), "gone".to_string(), "busy".to_string(), "locked".to_string()],
        )
        .unwrap();
        ctx.set(&vars::NO_FAIL_ON_MISSING_PERMISSIONS, true).unwrap();

        let phase = DeleteServicesStep.execute(&mut ctx).await.unwrap();

        assert_eq!(phase, StepPhase::Poll);
        let triggered = ctx.get(&vars::TRIGGERED_SERVICE_OPERATIONS).unwrap().unwrap();
        assert_eq!(triggered.keys().cloned().collect::<Vec<_>>(), vec!["busy", "db"]);
    }

    #[tokio::test]
    async fn deleted_service_without_operation_is_finished() {
        let env = TestEnv::new();
        env.platform
            .fail_on("get_last_service_operation:db", PlatformError::new(404, "gone"));
        let mut ctx = env.context(DELETE_SERVICES);
        ctx.set(&vars::TRIGGERED_SERVICE_OPERATIONS, BTreeMap::from([("db".to_string(), Delete)]))
            .unwrap();

        let state = PollServiceOperationsExecution.execute(&mut ctx).await.unwrap();
        assert_eq!(state, AsyncExecutionState::Finished);
    }
}
