//! Entry point the workflow engine calls to invoke a step.
//!
//! The runner loads the instance's variables, runs the phase controller
//! inside a span carrying the correlation id and always flushes the
//! variable changes and progress messages afterwards, also on failure.

use std::sync::Arc;

use mtaflow_types::config::OrchestratorConfig;
use mtaflow_types::process::ProgressMessageType;
use tracing::Instrument;

use super::body::StepBody;
use super::context::{Collaborators, ProcessContext};
use super::controller::{PhaseController, StepOutcome};
use super::error::StepError;
use crate::repository::progress::ProgressMessageRepository;
use crate::store::VariableStore;
use crate::variables::VariableSet;
use crate::vars;

pub struct StepRunner<S: VariableStore, P: ProgressMessageRepository> {
    store: S,
    progress: P,
    collaborators: Collaborators,
    controller: PhaseController,
}

impl<S: VariableStore, P: ProgressMessageRepository> StepRunner<S, P> {
    pub fn new(store: S, progress: P, collaborators: Collaborators, config: Arc<OrchestratorConfig>) -> Self {
        Self {
            store,
            progress,
            collaborators,
            controller: PhaseController::new(config),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn progress(&self) -> &P {
        &self.progress
    }

    /// Invoke `step` once for the operation instance `instance_id`.
    pub async fn invoke(&self, instance_id: &str, step: &dyn StepBody) -> Result<StepOutcome, StepError> {
        let variables = VariableSet::from_map(self.store.load_all(instance_id).await?);
        let correlation_id = variables
            .get(&vars::CORRELATION_ID)
            .ok()
            .flatten()
            .unwrap_or_else(|| instance_id.to_string());

        let span = tracing::info_span!(
            "step",
            instance_id = %instance_id,
            step = step.name(),
            correlation_id = %correlation_id,
        );

        async move {
            let mut ctx = ProcessContext::new(instance_id, step.name(), variables, self.collaborators.clone());
            let outcome = self.controller.run(step, &mut ctx).await;
            let flushed = self.flush(&mut ctx).await;

            match (outcome, flushed) {
                (Ok(outcome), Ok(())) => {
                    tracing::debug!(phase = %outcome.phase, "step invocation finished");
                    Ok(outcome)
                }
                (Err(err), flushed) => {
                    if let Err(flush_err) = flushed {
                        tracing::error!(error = %flush_err, "failed to persist state of failed step");
                    }
                    Err(err)
                }
                (Ok(_), Err(flush_err)) => Err(flush_err),
            }
        }
        .instrument(span)
        .await
    }

    async fn flush(&self, ctx: &mut ProcessContext) -> Result<(), StepError> {
        let changes = ctx.take_variable_changes();
        if !changes.is_empty() {
            self.store.apply(ctx.instance_id(), &changes).await?;
        }

        let batch = ctx.take_progress();
        if batch.clear_previous_errors {
            let deleted = self
                .progress
                .delete_by_type(ctx.instance_id(), ctx.step_name(), ProgressMessageType::Error)
                .await?;
            tracing::debug!(deleted, "removed error messages of previous attempt");
        }
        for message in &batch.messages {
            self.progress.add(message).await?;
        }
        Ok(())
    }
}
