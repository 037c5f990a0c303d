//! Steps of the parallel module deployment loop.
//!
//! PREPARE -> COMPUTE_NEXT_BATCH -> START_MODULE_SUB_PROCESS ->
//! MARK_BATCH_COMPLETED -> COMPUTE_NEXT_BATCH ... until no node remains.
//! The start step launches one child per batch node at once and waits for
//! all of them.

use futures_util::future::BoxFuture;
use mtaflow_types::process::StepPhase;

use super::resolver::{next_batch, validate_graph};
use crate::step::body::StepBody;
use crate::step::context::ProcessContext;
use crate::step::error::StepError;
use crate::step::iteration::{LoopMetadata, start_loop};
use crate::variables::VariableSet;
use crate::vars;

pub const PREPARE_MODULES_DEPLOYMENT: &str = "prepareModulesDeployment";
pub const COMPUTE_NEXT_MODULES_BATCH: &str = "computeNextModulesBatch";
pub const MARK_MODULES_BATCH_COMPLETED: &str = "markModulesBatchCompleted";

/// The loop over batches; each iteration deploys one batch in parallel
/// sub-processes.
pub const PARALLEL_MODULES_LOOP: LoopMetadata = LoopMetadata {
    id: "deployModulesInParallel",
    display_name: "Deploy modules in parallel",
    children: &[
        COMPUTE_NEXT_MODULES_BATCH,
        crate::subprocess::starter::START_MODULE_SUB_PROCESS,
        MARK_MODULES_BATCH_COMPLETED,
    ],
    variable_prefix: vars::NODES_BATCH_PREFIX,
};

/// Whether some node of the graph is not completed yet.
pub fn has_remaining_nodes(variables: &VariableSet) -> Result<bool, StepError> {
    let nodes = variables.get(&vars::NODES_TO_DEPLOY)?.unwrap_or_default();
    let completed = variables.get(&vars::COMPLETED_NODES)?.unwrap_or_default();
    Ok(nodes.iter().any(|n| !completed.contains(&n.name)))
}

/// Forget the children of the previous batch.
fn clear_sub_processes(ctx: &mut ProcessContext) -> Result<(), StepError> {
    for slot in ctx.get(&vars::SUB_PROCESSES)?.unwrap_or_default() {
        ctx.remove(&vars::sub_process_id(slot.index));
    }
    ctx.remove(&vars::SUB_PROCESSES);
    Ok(())
}

// ---------------------------------------------------------------------------
// PREPARE
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct PrepareModulesDeploymentStep;

impl PrepareModulesDeploymentStep {
    async fn prepare(&self, ctx: &mut ProcessContext) -> Result<StepPhase, StepError> {
        let nodes = ctx.require(&vars::NODES_TO_DEPLOY)?;
        validate_graph(&nodes)?;

        ctx.set(&vars::COMPLETED_NODES, Vec::<String>::new())?;
        ctx.remove(&vars::NODES_BATCH);
        clear_sub_processes(ctx)?;
        start_loop(ctx, vars::NODES_BATCH_PREFIX, 0)?;
        ctx.info(format!("Deploying {} modules", nodes.len()));
        Ok(StepPhase::Done)
    }
}

impl StepBody for PrepareModulesDeploymentStep {
    fn name(&self) -> &str {
        PREPARE_MODULES_DEPLOYMENT
    }

    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<StepPhase, StepError>> {
        Box::pin(self.prepare(ctx))
    }

    fn error_message(&self, _ctx: &ProcessContext) -> String {
        "Error preparing modules deployment".to_string()
    }
}

// ---------------------------------------------------------------------------
// COMPUTE_NEXT_BATCH
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ComputeNextModulesBatchStep;

impl ComputeNextModulesBatchStep {
    async fn compute(&self, ctx: &mut ProcessContext) -> Result<StepPhase, StepError> {
        let nodes = ctx.require(&vars::NODES_TO_DEPLOY)?;
        let completed = ctx.get(&vars::COMPLETED_NODES)?.unwrap_or_default();

        let batch: Vec<_> = next_batch(&nodes, &completed)?.into_iter().cloned().collect();
        let names: Vec<&str> = batch.iter().map(|n| n.name.as_str()).collect();
        if batch.is_empty() {
            ctx.debug("no modules left to deploy");
        } else {
            ctx.info(format!("Modules to deploy in parallel: {}", names.join(", ")));
        }

        clear_sub_processes(ctx)?;
        start_loop(ctx, vars::NODES_BATCH_PREFIX, batch.len())?;
        ctx.set(&vars::NODES_BATCH, batch)?;
        Ok(StepPhase::Done)
    }
}

impl StepBody for ComputeNextModulesBatchStep {
    fn name(&self) -> &str {
        COMPUTE_NEXT_MODULES_BATCH
    }

    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<StepPhase, StepError>> {
        Box::pin(self.compute(ctx))
    }

    fn error_message(&self, _ctx: &ProcessContext) -> String {
        "Error computing next modules for parallel deployment".to_string()
    }
}

// ---------------------------------------------------------------------------
// MARK_BATCH_COMPLETED
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MarkModulesBatchCompletedStep;

impl MarkModulesBatchCompletedStep {
    async fn mark(&self, ctx: &mut ProcessContext) -> Result<StepPhase, StepError> {
        let batch = ctx.get(&vars::NODES_BATCH)?.unwrap_or_default();
        let mut completed = ctx.get(&vars::COMPLETED_NODES)?.unwrap_or_default();
        for node in batch {
            if !completed.contains(&node.name) {
                completed.push(node.name);
            }
        }
        ctx.set(&vars::COMPLETED_NODES, completed)?;
        ctx.remove(&vars::NODES_BATCH);
        clear_sub_processes(ctx)?;
        Ok(StepPhase::Done)
    }
}

impl StepBody for MarkModulesBatchCompletedStep {
    fn name(&self) -> &str {
        MARK_MODULES_BATCH_COMPLETED
    }

    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<StepPhase, StepError>> {
        Box::pin(self.mark(ctx))
    }

    fn error_message(&self, _ctx: &ProcessContext) -> String {
        "Error marking deployed modules as completed".to_string()
    }
}
