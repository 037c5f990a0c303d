//! Index/count loops driven by the engine.
//!
//! A loop is represented by the variables `<x>Index` and `<x>Count` with
//! `0 <= index <= count`; the loop is finished when `index == count`.

use futures_util::future::BoxFuture;
use mtaflow_types::process::StepPhase;

use super::body::StepBody;
use super::context::ProcessContext;
use super::error::StepError;
use crate::variables::VariableSet;
use crate::vars;

/// Static description of a loop, exposed to the host engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopMetadata {
    pub id: &'static str,
    pub display_name: &'static str,
    /// Step names executed per iteration, in order.
    pub children: &'static [&'static str],
    /// Prefix of the `<x>Index` / `<x>Count` variables.
    pub variable_prefix: &'static str,
}

impl LoopMetadata {
    pub fn count_variable_name(&self) -> String {
        vars::count(self.variable_prefix).name().to_string()
    }

    pub fn index_variable_name(&self) -> String {
        vars::index(self.variable_prefix).name().to_string()
    }
}

/// Start a loop over `count` elements.
pub fn start_loop(ctx: &mut ProcessContext, prefix: &str, count: usize) -> Result<(), StepError> {
    ctx.set(&vars::index(prefix), 0)?;
    ctx.set(&vars::count(prefix), count)?;
    Ok(())
}

/// Whether the loop has elements left to process.
pub fn has_next(vars_set: &VariableSet, prefix: &str) -> Result<bool, StepError> {
    let index = vars_set.get(&vars::index(prefix))?.unwrap_or(0);
    let count = vars_set.get(&vars::count(prefix))?.unwrap_or(0);
    Ok(index < count)
}

/// Advances `<x>Index` by one, never beyond `<x>Count`.
pub struct IncrementIndexStep {
    name: String,
    prefix: String,
}

impl IncrementIndexStep {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
        }
    }

    async fn increment(&self, ctx: &mut ProcessContext) -> Result<StepPhase, StepError> {
        let index_var = vars::index(&self.prefix);
        let index = ctx.get(&index_var)?.unwrap_or(0);
        let count = ctx.require(&vars::count(&self.prefix))?;
        if index >= count {
            return Err(StepError::Content(format!(
                "index {index} of loop \"{}\" is already at its count {count}",
                self.prefix
            )));
        }
        ctx.set(&index_var, index + 1)?;
        Ok(StepPhase::Done)
    }
}

impl StepBody for IncrementIndexStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<StepPhase, StepError>> {
        Box::pin(self.increment(ctx))
    }

    fn error_message(&self, _ctx: &ProcessContext) -> String {
        format!("Error incrementing index of loop \"{}\"", self.prefix)
    }
}
