//! In-memory doubles of the ports, shared by the unit tests of this crate.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde_json::Value;

use mtaflow_types::error::{EngineError, PlatformError, RepositoryError};
use mtaflow_types::platform::{AppState, CloudApplication, CloudServiceInstance, CloudTask, ServiceOperation, TaskState};
use mtaflow_types::process::{
    AsyncExecutionState, HistoricProcessInstance, PendingJob, ProgressMessage, ProgressMessageType, StepPhase,
};

use crate::engine::{BoxProcessEngine, ProcessEngine};
use crate::lock::{BoxOperationLock, LockAcquisition, OperationLock};
use crate::platform::{BoxPlatformClient, PlatformClient};
use crate::repository::progress::ProgressMessageRepository;
use crate::step::body::{PollErrorPolicy, StepBody};
use crate::step::context::{Collaborators, ProcessContext};
use crate::step::error::StepError;
use crate::step::execution::AsyncExecution;
use crate::store::VariableStore;
use crate::variables::VariableSet;

// ---------------------------------------------------------------------------
// Scripts: the last element repeats forever
// ---------------------------------------------------------------------------

fn next_scripted<T: Clone>(script: &mut VecDeque<T>) -> Option<T> {
    if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().cloned()
    }
}

// ---------------------------------------------------------------------------
// Variable store
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryVariableStore {
    instances: Arc<DashMap<String, HashMap<String, Value>>>,
}

impl VariableStore for MemoryVariableStore {
    async fn get(&self, instance_id: &str, name: &str) -> Result<Option<Value>, RepositoryError> {
        Ok(self.instances.get(instance_id).and_then(|vars| vars.get(name).cloned()))
    }

    async fn set(&self, instance_id: &str, name: &str, value: &Value) -> Result<(), RepositoryError> {
        self.instances
            .entry(instance_id.to_string())
            .or_default()
            .insert(name.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, instance_id: &str, name: &str) -> Result<(), RepositoryError> {
        if let Some(mut vars) = self.instances.get_mut(instance_id) {
            vars.remove(name);
        }
        Ok(())
    }

    async fn list(&self, instance_id: &str) -> Result<Vec<String>, RepositoryError> {
        let mut names: Vec<String> = self
            .instances
            .get(instance_id)
            .map(|vars| vars.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    async fn load_all(&self, instance_id: &str) -> Result<HashMap<String, Value>, RepositoryError> {
        Ok(self.instances.get(instance_id).map(|v| v.clone()).unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Progress messages
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryProgressRepository {
    messages: Arc<Mutex<Vec<ProgressMessage>>>,
}

impl ProgressMessageRepository for MemoryProgressRepository {
    async fn add(&self, message: &ProgressMessage) -> Result<(), RepositoryError> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn list_by_instance(&self, instance_id: &str) -> Result<Vec<ProgressMessage>, RepositoryError> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.instance_id == instance_id)
            .cloned()
            .collect())
    }

    async fn delete_by_type(
        &self,
        instance_id: &str,
        task_id: &str,
        message_type: ProgressMessageType,
    ) -> Result<u64, RepositoryError> {
        let mut messages = self.messages.lock().unwrap();
        let before = messages.len();
        messages.retain(|m| !(m.instance_id == instance_id && m.task_id == task_id && m.message_type == message_type));
        Ok((before - messages.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Operation lock
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryOperationLock {
    holders: Arc<DashMap<String, String>>,
}

impl MemoryOperationLock {
    pub fn holder(&self, mta_id: &str) -> Option<String> {
        self.holders.get(mta_id).map(|h| h.clone())
    }
}

impl OperationLock for MemoryOperationLock {
    async fn try_acquire(&self, mta_id: &str, instance_id: &str) -> Result<LockAcquisition, RepositoryError> {
        let holder = self
            .holders
            .entry(mta_id.to_string())
            .or_insert_with(|| instance_id.to_string())
            .clone();
        if holder == instance_id {
            Ok(LockAcquisition::Acquired)
        } else {
            Ok(LockAcquisition::HeldBy(holder))
        }
    }

    async fn release(&self, mta_id: &str, instance_id: &str) -> Result<(), RepositoryError> {
        self.holders.remove_if(mta_id, |_, holder| holder == instance_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Platform client
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PlatformState {
    apps: HashMap<String, CloudApplication>,
    services: HashMap<String, CloudServiceInstance>,
    app_states: HashMap<String, VecDeque<AppState>>,
    last_operations: HashMap<String, VecDeque<Option<ServiceOperation>>>,
    task_states: HashMap<String, VecDeque<TaskState>>,
    failures: HashMap<String, PlatformError>,
    calls: Vec<String>,
    next_task: usize,
}

/// Scriptable platform client recording every call as `"method:arg"`.
#[derive(Clone, Default)]
pub struct MockPlatformClient {
    state: Arc<Mutex<PlatformState>>,
}

impl MockPlatformClient {
    pub fn with_app(&self, app: CloudApplication) -> &Self {
        self.state.lock().unwrap().apps.insert(app.name.clone(), app);
        self
    }

    pub fn with_service(&self, service: CloudServiceInstance) -> &Self {
        self.state.lock().unwrap().services.insert(service.name.clone(), service);
        self
    }

    pub fn script_app_states(&self, app: &str, states: Vec<AppState>) -> &Self {
        self.state.lock().unwrap().app_states.insert(app.to_string(), states.into());
        self
    }

    pub fn script_last_operations(&self, service: &str, ops: Vec<Option<ServiceOperation>>) -> &Self {
        self.state.lock().unwrap().last_operations.insert(service.to_string(), ops.into());
        self
    }

    pub fn script_task_states(&self, guid: &str, states: Vec<TaskState>) -> &Self {
        self.state.lock().unwrap().task_states.insert(guid.to_string(), states.into());
        self
    }

    /// Make the call `"method:arg"` fail with `err`.
    pub fn fail_on(&self, call: &str, err: PlatformError) -> &Self {
        self.state.lock().unwrap().failures.insert(call.to_string(), err);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.clone());
        match state.failures.get(&call) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn not_found(what: &str) -> PlatformError {
        PlatformError::new(PlatformError::NOT_FOUND, format!("{what} not found"))
    }
}

impl PlatformClient for MockPlatformClient {
    async fn get_application(&self, name: &str) -> Result<CloudApplication, PlatformError> {
        self.record(format!("get_application:{name}"))?;
        let state = self.state.lock().unwrap();
        state.apps.get(name).cloned().ok_or_else(|| Self::not_found(name))
    }

    async fn create_application(&self, app: &CloudApplication) -> Result<(), PlatformError> {
        self.record(format!("create_application:{}", app.name))?;
        self.state.lock().unwrap().apps.insert(app.name.clone(), app.clone());
        Ok(())
    }

    async fn update_application(&self, app: &CloudApplication) -> Result<(), PlatformError> {
        self.record(format!("update_application:{}", app.name))?;
        self.state.lock().unwrap().apps.insert(app.name.clone(), app.clone());
        Ok(())
    }

    async fn update_application_env(&self, name: &str, env: &BTreeMap<String, String>) -> Result<(), PlatformError> {
        self.record(format!("update_application_env:{name}"))?;
        if let Some(app) = self.state.lock().unwrap().apps.get_mut(name) {
            app.env = env.clone();
        }
        Ok(())
    }

    async fn delete_application(&self, name: &str) -> Result<(), PlatformError> {
        self.record(format!("delete_application:{name}"))?;
        self.state.lock().unwrap().apps.remove(name).map(|_| ()).ok_or_else(|| Self::not_found(name))
    }

    async fn start_application(&self, name: &str) -> Result<(), PlatformError> {
        self.record(format!("start_application:{name}"))
    }

    async fn stop_application(&self, name: &str) -> Result<(), PlatformError> {
        self.record(format!("stop_application:{name}"))
    }

    async fn get_application_state(&self, name: &str) -> Result<AppState, PlatformError> {
        self.record(format!("get_application_state:{name}"))?;
        let mut state = self.state.lock().unwrap();
        Ok(state
            .app_states
            .get_mut(name)
            .and_then(next_scripted)
            .unwrap_or(AppState::Running))
    }

    async fn get_recent_logs(&self, app_name: &str) -> Result<Vec<String>, PlatformError> {
        self.record(format!("get_recent_logs:{app_name}"))?;
        Ok(vec![format!("[{app_name}] exited with status 1")])
    }

    async fn get_service_instance(&self, name: &str) -> Result<CloudServiceInstance, PlatformError> {
        self.record(format!("get_service_instance:{name}"))?;
        let state = self.state.lock().unwrap();
        state.services.get(name).cloned().ok_or_else(|| Self::not_found(name))
    }

    async fn create_service_instance(&self, service: &CloudServiceInstance) -> Result<(), PlatformError> {
        self.record(format!("create_service_instance:{}", service.name))?;
        self.state
            .lock()
            .unwrap()
            .services
            .insert(service.name.clone(), service.clone());
        Ok(())
    }

    async fn delete_service_instance(&self, name: &str) -> Result<(), PlatformError> {
        self.record(format!("delete_service_instance:{name}"))?;
        self.state
            .lock()
            .unwrap()
            .services
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(name))
    }

    async fn get_last_service_operation(&self, name: &str) -> Result<Option<ServiceOperation>, PlatformError> {
        self.record(format!("get_last_service_operation:{name}"))?;
        let mut state = self.state.lock().unwrap();
        Ok(state.last_operations.get_mut(name).and_then(next_scripted).flatten())
    }

    async fn bind_service(&self, app_name: &str, service_name: &str) -> Result<(), PlatformError> {
        self.record(format!("bind_service:{app_name}/{service_name}"))
    }

    async fn unbind_service(&self, app_name: &str, service_name: &str) -> Result<(), PlatformError> {
        self.record(format!("unbind_service:{app_name}/{service_name}"))
    }

    async fn add_route(&self, app_name: &str, uri: &str) -> Result<(), PlatformError> {
        self.record(format!("add_route:{app_name}/{uri}"))
    }

    async fn delete_route(&self, uri: &str) -> Result<(), PlatformError> {
        self.record(format!("delete_route:{uri}"))
    }

    async fn run_task(&self, app_name: &str, task: &CloudTask) -> Result<CloudTask, PlatformError> {
        self.record(format!("run_task:{app_name}/{}", task.name))?;
        let mut state = self.state.lock().unwrap();
        state.next_task += 1;
        let mut started = task.clone();
        started.guid = Some(format!("task-{}", state.next_task));
        started.state = Some(TaskState::Pending);
        Ok(started)
    }

    async fn get_task(&self, guid: &str) -> Result<CloudTask, PlatformError> {
        self.record(format!("get_task:{guid}"))?;
        let mut state = self.state.lock().unwrap();
        let task_state = state
            .task_states
            .get_mut(guid)
            .and_then(next_scripted)
            .unwrap_or(TaskState::Succeeded);
        let mut task = CloudTask::new(guid, "");
        task.guid = Some(guid.to_string());
        task.state = Some(task_state);
        if task_state == TaskState::Failed {
            task.failure_reason = Some("exit status 1".to_string());
        }
        Ok(task)
    }
}

// ---------------------------------------------------------------------------
// Engine facade
// ---------------------------------------------------------------------------

#[derive(Default)]
struct EngineState {
    started: Vec<(String, HashMap<String, Value>)>,
    historic: HashMap<String, VecDeque<Option<HistoricProcessInstance>>>,
    jobs: HashMap<String, VecDeque<Option<PendingJob>>>,
    historic_variables: HashMap<(String, String), Value>,
    fail_queries: bool,
}

#[derive(Clone, Default)]
pub struct MockProcessEngine {
    state: Arc<Mutex<EngineState>>,
}

impl MockProcessEngine {
    pub fn started(&self) -> Vec<(String, HashMap<String, Value>)> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn script_historic(&self, instance_id: &str, script: Vec<Option<HistoricProcessInstance>>) -> &Self {
        self.state.lock().unwrap().historic.insert(instance_id.to_string(), script.into());
        self
    }

    pub fn script_jobs(&self, instance_id: &str, script: Vec<Option<PendingJob>>) -> &Self {
        self.state.lock().unwrap().jobs.insert(instance_id.to_string(), script.into());
        self
    }

    pub fn with_historic_variable(&self, instance_id: &str, name: &str, value: Value) -> &Self {
        self.state
            .lock()
            .unwrap()
            .historic_variables
            .insert((instance_id.to_string(), name.to_string()), value);
        self
    }

    pub fn fail_queries(&self) -> &Self {
        self.state.lock().unwrap().fail_queries = true;
        self
    }
}

impl ProcessEngine for MockProcessEngine {
    async fn start_instance(&self, definition_key: &str, variables: &HashMap<String, Value>) -> Result<String, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.started.push((definition_key.to_string(), variables.clone()));
        Ok(format!("child-{}", state.started.len()))
    }

    async fn historic_instance(&self, instance_id: &str) -> Result<Option<HistoricProcessInstance>, EngineError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_queries {
            return Err(EngineError::Internal("history service unavailable".to_string()));
        }
        Ok(state.historic.get_mut(instance_id).and_then(next_scripted).flatten())
    }

    async fn pending_job(&self, instance_id: &str) -> Result<Option<PendingJob>, EngineError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_queries {
            return Err(EngineError::Internal("job service unavailable".to_string()));
        }
        Ok(state.jobs.get_mut(instance_id).and_then(next_scripted).flatten())
    }

    async fn historic_variable(&self, instance_id: &str, name: &str) -> Result<Option<Value>, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .historic_variables
            .get(&(instance_id.to_string(), name.to_string()))
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct TestEnv {
    pub store: MemoryVariableStore,
    pub progress: MemoryProgressRepository,
    pub platform: MockPlatformClient,
    pub engine: MockProcessEngine,
    pub lock: MemoryOperationLock,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            BoxPlatformClient::new(self.platform.clone()),
            BoxProcessEngine::new(self.engine.clone()),
            BoxOperationLock::new(self.lock.clone()),
        )
    }

    /// A context with no variables for instance `p-1`.
    pub fn context(&self, step_name: &str) -> ProcessContext {
        ProcessContext::new("p-1", step_name, VariableSet::new(), self.collaborators())
    }
}

// ---------------------------------------------------------------------------
// Scripted steps and async executions
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ScriptedExecution {
    label: String,
    script: Arc<Mutex<VecDeque<AsyncExecutionState>>>,
    fails: bool,
}

impl ScriptedExecution {
    pub fn new(label: impl Into<String>, script: Vec<AsyncExecutionState>) -> Self {
        Self {
            label: label.into(),
            script: Arc::new(Mutex::new(script.into())),
            fails: false,
        }
    }

    /// A unit whose `execute` returns a controller error.
    pub fn failing(label: impl Into<String>) -> Self {
        Self {
            fails: true,
            ..Self::new(label, vec![])
        }
    }
}

impl AsyncExecution for ScriptedExecution {
    fn execute<'a>(&'a self, _ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<AsyncExecutionState, StepError>> {
        Box::pin(async move {
            if self.fails {
                return Err(StepError::Platform(PlatformError::new(500, "internal error")));
            }
            let mut script = self.script.lock().unwrap();
            Ok(script.pop_front().unwrap_or(AsyncExecutionState::Finished))
        })
    }

    fn polling_error_message(&self, _ctx: &ProcessContext) -> String {
        format!("Error polling {}", self.label)
    }
}

type FailureFn = Arc<dyn Fn() -> StepError + Send + Sync>;

pub struct ScriptedStep {
    name: String,
    units: Vec<ScriptedExecution>,
    failure: Option<FailureFn>,
    timeout: Option<Duration>,
    policy: PollErrorPolicy,
    executions: Arc<AtomicUsize>,
}

impl ScriptedStep {
    pub fn sync(name: &str) -> Self {
        Self {
            name: name.to_string(),
            units: Vec::new(),
            failure: None,
            timeout: None,
            policy: PollErrorPolicy::Fail,
            executions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_units(name: &str, scripts: Vec<Vec<AsyncExecutionState>>) -> Self {
        let units = scripts
            .into_iter()
            .enumerate()
            .map(|(i, script)| ScriptedExecution::new(format!("unit-{i}"), script))
            .collect();
        Self { units, ..Self::sync(name) }
    }

    pub fn with_execution(name: &str, unit: ScriptedExecution) -> Self {
        Self {
            units: vec![unit],
            ..Self::sync(name)
        }
    }

    pub fn failing(name: &str, err: PlatformError) -> Self {
        Self::failing_with(name, move || StepError::Platform(err.clone()))
    }

    pub fn failing_with(name: &str, failure: impl Fn() -> StepError + Send + Sync + 'static) -> Self {
        Self {
            failure: Some(Arc::new(failure)),
            ..Self::sync(name)
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_poll_error_policy(mut self, policy: PollErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

impl StepBody for ScriptedStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute<'a>(&'a self, _ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<StepPhase, StepError>> {
        Box::pin(async move {
            self.executions.fetch_add(1, Ordering::SeqCst);
            if let Some(failure) = &self.failure {
                return Err(failure());
            }
            if self.units.is_empty() {
                Ok(StepPhase::Done)
            } else {
                Ok(StepPhase::Poll)
            }
        })
    }

    fn async_executions(&self) -> Vec<Box<dyn AsyncExecution>> {
        self.units
            .iter()
            .cloned()
            .map(|unit| Box::new(unit) as Box<dyn AsyncExecution>)
            .collect()
    }

    fn error_message(&self, _ctx: &ProcessContext) -> String {
        format!("Error executing {}", self.name)
    }

    fn timeout(&self, _ctx: &ProcessContext) -> Option<Duration> {
        self.timeout
    }

    fn poll_error_policy(&self) -> PollErrorPolicy {
        self.policy
    }
}
