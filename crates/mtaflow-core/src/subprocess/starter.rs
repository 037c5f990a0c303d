//! Step that starts one child process instance per node of a parallel batch.

use std::collections::HashMap;

use futures_util::future::BoxFuture;
use mtaflow_types::deploy::DeploymentNode;
use mtaflow_types::process::{StepPhase, SubProcessSlot, SubProcessState};
use serde_json::Value;

use super::monitor::{MonitorSubProcessExecution, SubProcessFailurePolicy};
use crate::step::body::StepBody;
use crate::step::context::ProcessContext;
use crate::step::error::StepError;
use crate::step::execution::AsyncExecution;
use crate::vars;

pub const START_MODULE_SUB_PROCESS: &str = "startModuleSubProcess";

/// Whether a parent variable is passed on to a child. Variables describing
/// the parent's own step state are not; the child starts with a clean slate.
fn is_inherited(name: &str) -> bool {
    let step_state = name == vars::STEP_PHASE.name()
        || name == vars::ASYNC_STEP_EXECUTION_INDEX.name()
        || name == vars::ERROR_TYPE.name()
        || name == vars::TASK_ID.name()
        || name == vars::TASK_INDEX.name()
        || name == vars::SUB_PROCESSES.name()
        || name == vars::INDEX_VARIABLE_NAME.name()
        || name == vars::HOOKS_FOR_EXECUTION.name();
    !step_state && !name.starts_with("stepStartTime_") && !name.starts_with("subProcessId_")
}

/// Starts a child process for every node of the current batch in one
/// invocation, then monitors all of them until each has ended.
///
/// Every child gets the loop index of its slot, so `subProcessId_<index>`
/// and the child's `<x>Index` correlate it with the slot it deploys. When
/// the step is executed again after a failure, slots whose child is still
/// running or has succeeded are kept and only failed slots are restarted.
pub struct StartSubProcessStep {
    name: String,
    definition_key: String,
    index_prefix: String,
    policy: SubProcessFailurePolicy,
    copied_variables: Vec<String>,
}

impl StartSubProcessStep {
    pub fn new(name: impl Into<String>, definition_key: impl Into<String>, index_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition_key: definition_key.into(),
            index_prefix: index_prefix.into(),
            policy: SubProcessFailurePolicy::Escalate,
            copied_variables: Vec::new(),
        }
    }

    /// Deploys the nodes of the current parallel batch.
    pub fn for_modules(definition_key: impl Into<String>) -> Self {
        Self::new(START_MODULE_SUB_PROCESS, definition_key, vars::NODES_BATCH_PREFIX)
    }

    pub fn with_failure_policy(mut self, policy: SubProcessFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn copying_variables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.copied_variables = names.into_iter().map(Into::into).collect();
        self
    }

    fn inherited_variables(&self, ctx: &ProcessContext) -> HashMap<String, Value> {
        let mut variables: HashMap<String, Value> = ctx
            .vars()
            .values()
            .iter()
            .filter(|(name, _)| is_inherited(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        variables.insert(vars::PARENT_PROCESS_ID.name().to_string(), Value::from(ctx.instance_id()));
        variables
    }

    async fn start_child(
        &self,
        ctx: &mut ProcessContext,
        inherited: &HashMap<String, Value>,
        index: usize,
        node: &DeploymentNode,
    ) -> Result<SubProcessSlot, StepError> {
        let mut variables = inherited.clone();
        variables.insert(vars::index(&self.index_prefix).name().to_string(), Value::from(index));
        variables.insert(
            vars::CURRENT_NODE.name().to_string(),
            serde_json::to_value(node).map_err(|e| StepError::Content(e.to_string()))?,
        );

        let instance_id = ctx.engine().clone().start_instance(&self.definition_key, &variables).await?;
        ctx.info(format!(
            "Started sub-process \"{instance_id}\" for module \"{}\"",
            node.name
        ));
        ctx.set(&vars::sub_process_id(index), instance_id.clone())?;
        Ok(SubProcessSlot::new(index, node.name.clone(), instance_id))
    }

    async fn start(&self, ctx: &mut ProcessContext) -> Result<StepPhase, StepError> {
        let batch = ctx.get(&vars::NODES_BATCH)?.unwrap_or_default();
        let index_var = vars::index(&self.index_prefix);
        let previous = ctx.get(&vars::SUB_PROCESSES)?.unwrap_or_default();
        let inherited = self.inherited_variables(ctx);

        let mut slots: Vec<SubProcessSlot> = previous
            .into_iter()
            .filter(|s| s.state != SubProcessState::Failed)
            .filter(|s| batch.get(s.index).is_some_and(|n| n.name == s.node))
            .collect();
        ctx.set(&vars::SUB_PROCESSES, slots.clone())?;

        for (index, node) in batch.iter().enumerate() {
            if slots.iter().any(|s| s.index == index) {
                continue;
            }
            let slot = self.start_child(ctx, &inherited, index, node).await?;
            slots.push(slot);
            slots.sort_by_key(|s| s.index);
            // Persisted per start: a later failing start must not lose running children.
            ctx.set(&vars::SUB_PROCESSES, slots.clone())?;
        }

        ctx.set(&index_var, batch.len())?;
        ctx.set(&vars::INDEX_VARIABLE_NAME, index_var.name().to_string())?;
        Ok(if batch.is_empty() { StepPhase::Done } else { StepPhase::Poll })
    }
}

fn batch_names(ctx: &ProcessContext) -> String {
    ctx.get(&vars::NODES_BATCH)
        .ok()
        .flatten()
        .unwrap_or_default()
        .into_iter()
        .map(|n| n.name)
        .collect::<Vec<_>>()
        .join(", ")
}

impl StepBody for StartSubProcessStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<StepPhase, StepError>> {
        Box::pin(self.start(ctx))
    }

    fn async_executions(&self) -> Vec<Box<dyn AsyncExecution>> {
        vec![Box::new(MonitorSubProcessExecution::new(
            self.policy,
            self.copied_variables.clone(),
        ))]
    }

    fn error_message(&self, ctx: &ProcessContext) -> String {
        format!("Error starting sub-processes for modules [{}]", batch_names(ctx))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::step::controller::PhaseController;
    use crate::step::iteration::start_loop;
    use crate::testing::TestEnv;
    use chrono::Utc;
    use mtaflow_types::config::OrchestratorConfig;
    use mtaflow_types::process::HistoricProcessInstance;
    use serde_json::json;

    fn ended(id: &str) -> Option<HistoricProcessInstance> {
        Some(HistoricProcessInstance {
            id: id.to_string(),
            end_time: Some(Utc::now()),
            delete_reason: None,
        })
    }

    fn batch_context(env: &TestEnv) -> ProcessContext {
        let mut ctx = env.context(START_MODULE_SUB_PROCESS);
        ctx.set(&vars::NODES_BATCH, vec![DeploymentNode::new("B"), DeploymentNode::new("C")])
            .unwrap();
        start_loop(&mut ctx, vars::NODES_BATCH_PREFIX, 2).unwrap();
        ctx.set(&vars::MTA_ID, "com.example.shop".to_string()).unwrap();
        ctx
    }

    fn slots(ctx: &ProcessContext) -> Vec<SubProcessSlot> {
        ctx.get(&vars::SUB_PROCESSES).unwrap().unwrap_or_default()
    }

    #[tokio::test]
    async fn start_launches_one_child_per_batch_node() {
        let env = TestEnv::new();
        let mut ctx = batch_context(&env);
        ctx.set(&vars::TASK_INDEX, 4).unwrap();
        let step = StartSubProcessStep::for_modules("deployModule");

        let phase = step.execute(&mut ctx).await.unwrap();

        assert_eq!(phase, StepPhase::Poll);
        let started = env.engine.started();
        assert_eq!(started.len(), 2);
        for (index, (node, (key, variables))) in ["B", "C"].iter().zip(&started).enumerate() {
            assert_eq!(key, "deployModule");
            assert_eq!(variables["parentProcessId"], json!("p-1"));
            assert_eq!(variables["mtaId"], json!("com.example.shop"));
            assert_eq!(variables["currentNode"]["name"], json!(node));
            assert_eq!(variables["nodesBatchIndex"], json!(index));
            assert!(!variables.contains_key("taskIndex"));
        }

        assert_eq!(ctx.get(&vars::sub_process_id(0)).unwrap().as_deref(), Some("child-1"));
        assert_eq!(ctx.get(&vars::sub_process_id(1)).unwrap().as_deref(), Some("child-2"));
        assert_eq!(
            slots(&ctx),
            vec![SubProcessSlot::new(0, "B", "child-1"), SubProcessSlot::new(1, "C", "child-2")]
        );
        assert_eq!(
            ctx.get(&vars::INDEX_VARIABLE_NAME).unwrap().as_deref(),
            Some("nodesBatchIndex")
        );
    }

    #[tokio::test]
    async fn batch_children_run_side_by_side_until_all_end() {
        let env = TestEnv::new();
        // B's child keeps running, C's child ends right away.
        env.engine.script_historic("child-2", vec![ended("child-2")]);
        let mut ctx = batch_context(&env);
        let controller = PhaseController::new(Arc::new(OrchestratorConfig::default()));
        let step = StartSubProcessStep::for_modules("deployModule");

        for _ in 0..5 {
            assert_eq!(controller.run(&step, &mut ctx).await.unwrap().phase, StepPhase::Poll);
        }
        assert_eq!(env.engine.started().len(), 2);
        let current = slots(&ctx);
        assert_eq!(current[0].state, SubProcessState::Running);
        assert_eq!(current[1].state, SubProcessState::Succeeded);

        env.engine.script_historic("child-1", vec![ended("child-1")]);
        assert!(controller.run(&step, &mut ctx).await.unwrap().is_done());
        assert_eq!(env.engine.started().len(), 2);
    }

    #[tokio::test]
    async fn reexecution_restarts_only_failed_slots() {
        let env = TestEnv::new();
        let mut ctx = batch_context(&env);
        let mut failed = SubProcessSlot::new(1, "C", "child-8");
        failed.state = SubProcessState::Failed;
        ctx.set(&vars::SUB_PROCESSES, vec![SubProcessSlot::new(0, "B", "child-9"), failed])
            .unwrap();

        let phase = StartSubProcessStep::for_modules("deployModule")
            .execute(&mut ctx)
            .await
            .unwrap();

        assert_eq!(phase, StepPhase::Poll);
        let started = env.engine.started();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].1["currentNode"]["name"], json!("C"));
        assert_eq!(started[0].1["nodesBatchIndex"], json!(1));
        assert_eq!(
            slots(&ctx),
            vec![SubProcessSlot::new(0, "B", "child-9"), SubProcessSlot::new(1, "C", "child-1")]
        );
    }

    #[tokio::test]
    async fn empty_batch_is_done_without_children() {
        let env = TestEnv::new();
        let mut ctx = env.context(START_MODULE_SUB_PROCESS);
        ctx.set(&vars::NODES_BATCH, Vec::<DeploymentNode>::new()).unwrap();

        let phase = StartSubProcessStep::for_modules("deployModule")
            .execute(&mut ctx)
            .await
            .unwrap();

        assert_eq!(phase, StepPhase::Done);
        assert!(env.engine.started().is_empty());
    }
}
