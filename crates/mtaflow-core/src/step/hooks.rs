//! Module lifecycle hooks around a step body.
//!
//! [`WithHooks`] wraps a step. Before the primary body runs it looks up the
//! hooks of the current module registered for the step's "before" phases; if
//! any have not run yet they are handed to the engine via
//! `hooksForExecution` and the step returns its current phase, so the engine
//! runs the hooks and re-invokes the step. Once the body reports DONE the
//! "after" hooks are scheduled the same way. Executed hooks are tracked per
//! module in `executedHooks_<module>` so each hook runs once per phase.

use std::time::Duration;

use futures_util::future::BoxFuture;
use mtaflow_types::deploy::{DeploymentNode, HookPhase, ModuleHook};
use mtaflow_types::process::StepPhase;

use super::body::{PollErrorPolicy, StepBody};
use super::context::ProcessContext;
use super::error::StepError;
use super::execution::AsyncExecution;
use crate::vars;

pub struct WithHooks<B> {
    inner: B,
    before: Vec<HookPhase>,
    after: Vec<HookPhase>,
}

impl<B: StepBody> WithHooks<B> {
    pub fn new(inner: B, before: Vec<HookPhase>, after: Vec<HookPhase>) -> Self {
        Self { inner, before, after }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    async fn execute_with_hooks(&self, ctx: &mut ProcessContext) -> Result<StepPhase, StepError> {
        ctx.remove(&vars::HOOKS_FOR_EXECUTION);
        let Some(node) = ctx.get(&vars::CURRENT_NODE)? else {
            return self.inner.execute(ctx).await;
        };

        let current_phase = ctx.get(&vars::STEP_PHASE)?.unwrap_or_default();
        if schedule_pending_hooks(ctx, &node, &self.before)? {
            return Ok(current_phase);
        }

        let next = self.inner.execute(ctx).await?;
        if next == StepPhase::Done {
            schedule_pending_hooks(ctx, &node, &self.after)?;
        }
        Ok(next)
    }
}

/// Hooks of `node` registered for any of `phases` that have not run for
/// those phases yet, together with the phases still due.
pub fn pending_hooks(
    ctx: &ProcessContext,
    node: &DeploymentNode,
    phases: &[HookPhase],
) -> Result<Vec<(ModuleHook, Vec<HookPhase>)>, StepError> {
    let executed = ctx.get(&vars::executed_hooks(&node.name))?.unwrap_or_default();
    let pending = node
        .hooks
        .iter()
        .filter_map(|hook| {
            let done = executed.get(&hook.name);
            let due: Vec<HookPhase> = hook
                .phases
                .iter()
                .filter(|p| phases.contains(p))
                .filter(|p| !done.is_some_and(|d| d.contains(p)))
                .copied()
                .collect();
            (!due.is_empty()).then(|| (hook.clone(), due))
        })
        .collect();
    Ok(pending)
}

/// Returns true when hooks were handed to the engine.
fn schedule_pending_hooks(ctx: &mut ProcessContext, node: &DeploymentNode, phases: &[HookPhase]) -> Result<bool, StepError> {
    if phases.is_empty() {
        return Ok(false);
    }
    let pending = pending_hooks(ctx, node, phases)?;
    if pending.is_empty() {
        return Ok(false);
    }

    let executed_var = vars::executed_hooks(&node.name);
    let mut executed = ctx.get(&executed_var)?.unwrap_or_default();
    let mut hooks = Vec::with_capacity(pending.len());
    for (hook, due) in pending {
        executed.entry(hook.name.clone()).or_default().extend(due);
        hooks.push(hook);
    }

    let names: Vec<&str> = hooks.iter().map(|h| h.name.as_str()).collect();
    ctx.info(format!("Executing hooks {names:?} of module \"{}\"", node.name));
    ctx.set(&executed_var, executed)?;
    ctx.set(&vars::HOOKS_FOR_EXECUTION, hooks)?;
    Ok(true)
}

impl<B: StepBody> StepBody for WithHooks<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<StepPhase, StepError>> {
        Box::pin(self.execute_with_hooks(ctx))
    }

    fn async_executions(&self) -> Vec<Box<dyn AsyncExecution>> {
        self.inner.async_executions()
    }

    fn error_message(&self, ctx: &ProcessContext) -> String {
        self.inner.error_message(ctx)
    }

    fn timeout(&self, ctx: &ProcessContext) -> Option<Duration> {
        self.inner.timeout(ctx)
    }

    fn poll_error_policy(&self) -> PollErrorPolicy {
        self.inner.poll_error_policy()
    }
}
