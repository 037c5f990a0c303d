//! Names of the process variables shared between steps and invocations.
//!
//! The names are part of the persisted state of running operations and must
//! stay stable across releases.

use std::collections::BTreeMap;

use mtaflow_types::deploy::{DeploymentNode, ExecutedHooks, ModuleHook};
use mtaflow_types::platform::{CloudApplication, CloudServiceInstance, CloudTask, ServiceOperationType};
use mtaflow_types::process::{ErrorType, StepPhase, SubProcessSlot};

use crate::variables::Variable;

// ---------------------------------------------------------------------------
// Step machine
// ---------------------------------------------------------------------------

pub const STEP_PHASE: Variable<StepPhase> = Variable::new("stepPhase");
pub const ASYNC_STEP_EXECUTION_INDEX: Variable<usize> = Variable::new("asyncStepExecutionIndex");
pub const PROCESS_ABORTED: Variable<bool> = Variable::new("processAborted");
pub const ERROR_TYPE: Variable<ErrorType> = Variable::new("errorType");
pub const CORRELATION_ID: Variable<String> = Variable::new("correlationId");
/// Name of the step currently executing, used to attribute progress messages.
pub const TASK_ID: Variable<String> = Variable::new("taskId");
pub const TASK_INDEX: Variable<i64> = Variable::new("taskIndex");
pub const NO_FAIL_ON_MISSING_PERMISSIONS: Variable<bool> = Variable::new("noFailOnMissingPermissions");

/// Epoch millis at which the current logical attempt of `step_name` started.
pub fn step_start_time(step_name: &str) -> Variable<i64> {
    Variable::dynamic(format!("stepStartTime_{step_name}"))
}

// ---------------------------------------------------------------------------
// Iteration and dependency-ordered loops
// ---------------------------------------------------------------------------

/// `<prefix>Index` of an index/count loop.
pub fn index(prefix: &str) -> Variable<usize> {
    Variable::dynamic(format!("{prefix}Index"))
}

/// `<prefix>Count` of an index/count loop.
pub fn count(prefix: &str) -> Variable<usize> {
    Variable::dynamic(format!("{prefix}Count"))
}

pub const NODES_TO_DEPLOY: Variable<Vec<DeploymentNode>> = Variable::new("nodesToDeploy");
pub const COMPLETED_NODES: Variable<Vec<String>> = Variable::new("completedNodes");
/// Nodes of the batch currently iterated in parallel.
pub const NODES_BATCH: Variable<Vec<DeploymentNode>> = Variable::new("nodesBatch");
/// Prefix of the `<x>Index` / `<x>Count` pair iterating [`NODES_BATCH`].
pub const NODES_BATCH_PREFIX: &str = "nodesBatch";
/// Node processed by a child process, written by the sub-process starter.
pub const CURRENT_NODE: Variable<DeploymentNode> = Variable::new("currentNode");

// ---------------------------------------------------------------------------
// Sub-processes
// ---------------------------------------------------------------------------

/// Children started for the slots of the current batch.
pub const SUB_PROCESSES: Variable<Vec<SubProcessSlot>> = Variable::new("subProcesses");

/// `subProcessId_<index>`: child instance deploying slot `index` of the batch.
pub fn sub_process_id(index: usize) -> Variable<String> {
    Variable::dynamic(format!("subProcessId_{index}"))
}

pub const INDEX_VARIABLE_NAME: Variable<String> = Variable::new("indexVariableName");
pub const PARENT_PROCESS_ID: Variable<String> = Variable::new("parentProcessId");

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

pub const HOOKS_FOR_EXECUTION: Variable<Vec<ModuleHook>> = Variable::new("hooksForExecution");

pub fn executed_hooks(module_name: &str) -> Variable<ExecutedHooks> {
    Variable::dynamic(format!("executedHooks_{module_name}"))
}

// ---------------------------------------------------------------------------
// Concrete steps
// ---------------------------------------------------------------------------

pub const MTA_ID: Variable<String> = Variable::new("mtaId");
pub const APP_TO_PROCESS: Variable<CloudApplication> = Variable::new("appToProcess");
pub const SERVICE_TO_PROCESS: Variable<CloudServiceInstance> = Variable::new("serviceToProcess");
pub const SERVICES_TO_DELETE: Variable<Vec<String>> = Variable::new("servicesToDelete");
/// Service name -> operation triggered on it by the current step.
pub const TRIGGERED_SERVICE_OPERATIONS: Variable<BTreeMap<String, ServiceOperationType>> =
    Variable::new("triggeredServiceOperations");
/// Subset of the triggered services whose last operation is still in progress.
pub const SERVICES_TO_POLL: Variable<Vec<String>> = Variable::new("servicesToPoll");
pub const TASKS_TO_EXECUTE: Variable<Vec<CloudTask>> = Variable::new("tasksToExecute");
pub const TASKS_PREFIX: &str = "tasks";
pub const STARTED_TASK: Variable<CloudTask> = Variable::new("startedTask");
pub const UPDATED_SUBSCRIBERS: Variable<Vec<CloudApplication>> = Variable::new("updatedSubscribers");
pub const UPDATED_SERVICE_BROKER_SUBSCRIBERS: Variable<Vec<CloudApplication>> =
    Variable::new("updatedServiceBrokerSubscribers");
