//! The generic EXECUTE / POLL / RETRY / WAIT state machine.
//!
//! Per invocation the controller reads the persisted `stepPhase`, runs the
//! primary body (EXECUTE, RETRY) or drives one async unit (POLL), checks the
//! abort flag and persists the resulting phase on both the success and the
//! failure path. How failures are reported back to the engine is decided by
//! the configured [`ErrorConvention`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mtaflow_types::config::{ErrorConvention, OrchestratorConfig};
use mtaflow_types::process::StepPhase;

use super::body::StepBody;
use super::context::ProcessContext;
use super::error::StepError;
use super::execution::poll_chain;
use super::helper::ProcessStepHelper;
use crate::vars;

/// What the engine should do after an invocation that did not fail.
///
/// An `Ok` outcome with phase RETRY always asks the host to invoke the step
/// again; the body then runs again. It comes from an async unit reporting
/// ERROR under `PollErrorPolicy::Retry`, under either convention, or from a
/// transient failure under `PersistRetry` (`retry_reason` is set). Under
/// `Propagate` only an `Err` means a failed job that waits for an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Phase persisted for the next invocation.
    pub phase: StepPhase,
    /// Set when a failure was turned into an automatic retry.
    pub retry_reason: Option<String>,
}

impl StepOutcome {
    pub fn new(phase: StepPhase) -> Self {
        Self {
            phase,
            retry_reason: None,
        }
    }

    pub fn retrying(reason: impl Into<String>) -> Self {
        Self {
            phase: StepPhase::Retry,
            retry_reason: Some(reason.into()),
        }
    }

    pub fn is_done(&self) -> bool {
        self.phase == StepPhase::Done
    }
}

/// Phase machine shared by every step.
#[derive(Debug, Clone)]
pub struct PhaseController {
    config: Arc<OrchestratorConfig>,
}

impl PhaseController {
    pub fn new(config: Arc<OrchestratorConfig>) -> Self {
        Self { config }
    }

    pub fn convention(&self) -> ErrorConvention {
        self.config.error_convention
    }

    /// Phase an invocation starts in, given the persisted one.
    ///
    /// A phase that ended the previous logical attempt starts a new one.
    pub fn initial_step_phase(&self, persisted: StepPhase) -> StepPhase {
        match (self.config.error_convention, persisted) {
            (_, StepPhase::Done) => StepPhase::Execute,
            (ErrorConvention::Propagate, StepPhase::Retry) => StepPhase::Execute,
            (_, phase) => phase,
        }
    }

    /// Run one invocation of `body`.
    pub async fn run(&self, body: &dyn StepBody, ctx: &mut ProcessContext) -> Result<StepOutcome, StepError> {
        let persisted = ctx.get(&vars::STEP_PHASE)?.unwrap_or_default();
        let phase = self.initial_step_phase(persisted);
        if phase == StepPhase::Wait {
            ctx.debug("step is waiting, nothing to do");
            return Ok(StepOutcome::new(StepPhase::Wait));
        }
        ctx.set(&vars::STEP_PHASE, phase)?;

        let (next, outcome) = match self.run_phase(body, ctx, phase).await {
            Ok(next) => (next, Ok(StepOutcome::new(next))),
            Err(err) => {
                ProcessStepHelper::log_exception_and_store(ctx, &err);
                let outcome = match self.config.error_convention {
                    ErrorConvention::PersistRetry if !err.is_fatal() => Ok(StepOutcome::retrying(err.to_string())),
                    _ => Err(err),
                };
                (StepPhase::Retry, outcome)
            }
        };

        self.persist_phase(body, ctx, next)?;
        outcome
    }

    async fn run_phase(
        &self,
        body: &dyn StepBody,
        ctx: &mut ProcessContext,
        phase: StepPhase,
    ) -> Result<StepPhase, StepError> {
        ProcessStepHelper::pre_execute_step(ctx, phase)?;
        let next = match phase {
            StepPhase::Poll => self.poll(body, ctx).await?,
            _ => self.execute(body, ctx, phase).await?,
        };
        ProcessStepHelper::fail_step_if_process_is_aborted(ctx)?;
        Ok(next)
    }

    async fn execute(
        &self,
        body: &dyn StepBody,
        ctx: &mut ProcessContext,
        phase: StepPhase,
    ) -> Result<StepPhase, StepError> {
        ctx.set(&vars::ASYNC_STEP_EXECUTION_INDEX, 0)?;
        let start_time = vars::step_start_time(body.name());
        // An automatic retry stays within the time budget of its attempt.
        if phase == StepPhase::Execute || ctx.get(&start_time)?.is_none() {
            ctx.set(&start_time, Utc::now().timestamp_millis())?;
        }

        match body.execute(ctx).await {
            Ok(next) => Ok(next),
            Err(err) => Err(err.annotate(body.error_message(ctx))),
        }
    }

    async fn poll(&self, body: &dyn StepBody, ctx: &mut ProcessContext) -> Result<StepPhase, StepError> {
        self.check_timeout(body, ctx)?;
        let units = body.async_executions();
        poll_chain(&units, ctx, body.poll_error_policy()).await
    }

    fn check_timeout(&self, body: &dyn StepBody, ctx: &mut ProcessContext) -> Result<(), StepError> {
        let timeout = self.timeout_for(body, ctx);
        let start_time = vars::step_start_time(body.name());
        let now = Utc::now().timestamp_millis();
        let Some(started) = ctx.get(&start_time)? else {
            ctx.set(&start_time, now)?;
            return Ok(());
        };

        let elapsed = Duration::from_millis(now.saturating_sub(started).max(0) as u64);
        if elapsed > timeout {
            return Err(StepError::Timeout {
                step: body.name().to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }
        Ok(())
    }

    /// Configured override, then the step's own timeout, then the default.
    pub fn timeout_for(&self, body: &dyn StepBody, ctx: &ProcessContext) -> Duration {
        self.config
            .step_timeout(body.name())
            .or_else(|| body.timeout(ctx))
            .unwrap_or_else(|| self.config.default_step_timeout())
    }

    fn persist_phase(&self, body: &dyn StepBody, ctx: &mut ProcessContext, phase: StepPhase) -> Result<(), StepError> {
        ctx.set(&vars::STEP_PHASE, phase)?;
        if phase == StepPhase::Done {
            ctx.remove(&vars::step_start_time(body.name()));
        }
        tracing::debug!(instance_id = %ctx.instance_id(), step = body.name(), phase = %phase, "step phase persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::body::PollErrorPolicy;
    use crate::testing::{ScriptedExecution, ScriptedStep, TestEnv};
    use mtaflow_types::process::{AsyncExecutionState, ErrorType, ProgressMessageType};
    use mtaflow_types::error::PlatformError;

    fn controller(convention: ErrorConvention) -> PhaseController {
        PhaseController::new(Arc::new(OrchestratorConfig {
            error_convention: convention,
            ..Default::default()
        }))
    }

    #[test]
    fn initial_phase_per_convention() {
        let propagate = controller(ErrorConvention::Propagate);
        assert_eq!(propagate.initial_step_phase(StepPhase::Done), StepPhase::Execute);
        assert_eq!(propagate.initial_step_phase(StepPhase::Retry), StepPhase::Execute);
        assert_eq!(propagate.initial_step_phase(StepPhase::Poll), StepPhase::Poll);

        let persist = controller(ErrorConvention::PersistRetry);
        assert_eq!(persist.initial_step_phase(StepPhase::Done), StepPhase::Execute);
        assert_eq!(persist.initial_step_phase(StepPhase::Retry), StepPhase::Retry);
        assert_eq!(persist.initial_step_phase(StepPhase::Wait), StepPhase::Wait);
    }

    #[tokio::test]
    async fn synchronous_step_completes_without_polling() {
        let env = TestEnv::new();
        let mut ctx = env.context("syncStep");
        let step = ScriptedStep::sync("syncStep");

        let outcome = controller(ErrorConvention::Propagate).run(&step, &mut ctx).await.unwrap();
        assert!(outcome.is_done());
        assert_eq!(ctx.get(&vars::STEP_PHASE).unwrap(), Some(StepPhase::Done));
        assert!(ctx.get(&vars::step_start_time("syncStep")).unwrap().is_none());
    }

    #[tokio::test]
    async fn async_step_moves_to_poll_with_index_zero() {
        let env = TestEnv::new();
        let mut ctx = env.context("asyncStep");
        let step = ScriptedStep::with_units("asyncStep", vec![vec![AsyncExecutionState::Finished]]);

        let outcome = controller(ErrorConvention::Propagate).run(&step, &mut ctx).await.unwrap();
        assert_eq!(outcome.phase, StepPhase::Poll);
        assert_eq!(ctx.get(&vars::ASYNC_STEP_EXECUTION_INDEX).unwrap(), Some(0));
        assert!(ctx.get(&vars::step_start_time("asyncStep")).unwrap().is_some());
    }

    #[tokio::test]
    async fn wait_returns_without_touching_state() {
        let env = TestEnv::new();
        let mut ctx = env.context("waiting");
        ctx.set(&vars::STEP_PHASE, StepPhase::Wait).unwrap();
        ctx.take_variable_changes();
        let step = ScriptedStep::sync("waiting");

        let outcome = controller(ErrorConvention::Propagate).run(&step, &mut ctx).await.unwrap();
        assert_eq!(outcome.phase, StepPhase::Wait);
        assert_eq!(step.executions(), 0);
        assert!(ctx.take_variable_changes().is_empty());
    }

    #[tokio::test]
    async fn propagate_persists_retry_and_returns_error() {
        let env = TestEnv::new();
        let mut ctx = env.context("failing");
        let step = ScriptedStep::failing("failing", PlatformError::new(500, "controller down"));

        let err = controller(ErrorConvention::Propagate).run(&step, &mut ctx).await.unwrap_err();
        assert!(err.to_string().starts_with("Error executing failing"));
        assert_eq!(ctx.get(&vars::STEP_PHASE).unwrap(), Some(StepPhase::Retry));
        assert_eq!(ctx.get(&vars::ERROR_TYPE).unwrap(), Some(ErrorType::CloudControllerError));
        assert!(
            ctx.progress_messages()
                .iter()
                .any(|m| m.message_type == ProgressMessageType::Error)
        );
    }

    #[tokio::test]
    async fn persist_retry_turns_transient_error_into_resumable_outcome() {
        let env = TestEnv::new();
        let mut ctx = env.context("failing");
        let step = ScriptedStep::failing("failing", PlatformError::new(500, "controller down"));
        let controller = controller(ErrorConvention::PersistRetry);

        let outcome = controller.run(&step, &mut ctx).await.unwrap();
        assert_eq!(outcome.phase, StepPhase::Retry);
        assert!(outcome.retry_reason.unwrap().contains("controller down"));

        // Re-invocation re-runs the primary body.
        let _ = controller.run(&step, &mut ctx).await;
        assert_eq!(step.executions(), 2);
    }

    #[tokio::test]
    async fn persist_retry_still_fails_on_fatal_error() {
        let env = TestEnv::new();
        let mut ctx = env.context("bad");
        let step = ScriptedStep::failing_with("bad", || StepError::Content("missing module".into()));

        let err = controller(ErrorConvention::PersistRetry).run(&step, &mut ctx).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::ContentError);
        assert_eq!(ctx.get(&vars::STEP_PHASE).unwrap(), Some(StepPhase::Retry));
    }

    #[tokio::test]
    async fn timeout_on_poll_names_step() {
        let env = TestEnv::new();
        let mut ctx = env.context("slowStep");
        let step = ScriptedStep::with_units("slowStep", vec![vec![AsyncExecutionState::Running]])
            .with_timeout(Duration::from_secs(60));
        ctx.set(&vars::STEP_PHASE, StepPhase::Poll).unwrap();
        let long_ago = Utc::now().timestamp_millis() - 61_000;
        ctx.set(&vars::step_start_time("slowStep"), long_ago).unwrap();

        let err = controller(ErrorConvention::Propagate).run(&step, &mut ctx).await.unwrap_err();
        assert!(matches!(err, StepError::Timeout { ref step, timeout_secs: 60 } if step == "slowStep"));
        assert!(err.to_string().contains("slowStep"));
    }

    #[tokio::test]
    async fn configured_timeout_overrides_step_timeout() {
        let mut config = OrchestratorConfig::default();
        config.step_timeouts.insert("slowStep".to_string(), 600);
        let controller = PhaseController::new(Arc::new(config));
        let env = TestEnv::new();
        let ctx = env.context("slowStep");
        let step = ScriptedStep::sync("slowStep").with_timeout(Duration::from_secs(60));

        assert_eq!(controller.timeout_for(&step, &ctx), Duration::from_secs(600));
        let other = ScriptedStep::sync("other");
        assert_eq!(controller.timeout_for(&other, &ctx), Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn abort_flag_fails_step_after_body() {
        let env = TestEnv::new();
        let mut ctx = env.context("syncStep");
        ctx.set(&vars::PROCESS_ABORTED, true).unwrap();
        let step = ScriptedStep::sync("syncStep");

        let err = controller(ErrorConvention::PersistRetry).run(&step, &mut ctx).await.unwrap_err();
        assert!(matches!(err, StepError::Aborted));
        assert_eq!(step.executions(), 1);
    }

    #[tokio::test]
    async fn poll_errors_are_annotated_with_unit_message() {
        let env = TestEnv::new();
        let mut ctx = env.context("asyncStep");
        ctx.set(&vars::STEP_PHASE, StepPhase::Poll).unwrap();
        let step = ScriptedStep::with_execution("asyncStep", ScriptedExecution::failing("service \"db\""));

        let err = controller(ErrorConvention::Propagate).run(&step, &mut ctx).await.unwrap_err();
        assert!(err.to_string().starts_with("Error polling service \"db\""));
    }

    #[tokio::test]
    async fn unit_error_under_retry_policy_reruns_body_next_invocation() {
        for convention in [ErrorConvention::Propagate, ErrorConvention::PersistRetry] {
            let env = TestEnv::new();
            let mut ctx = env.context("startApp");
            let step = ScriptedStep::with_units("startApp", vec![vec![AsyncExecutionState::Error]])
                .with_poll_error_policy(PollErrorPolicy::Retry);
            let machine = controller(convention);

            assert_eq!(machine.run(&step, &mut ctx).await.unwrap().phase, StepPhase::Poll);

            let outcome = machine.run(&step, &mut ctx).await.unwrap();
            assert_eq!(outcome, StepOutcome::new(StepPhase::Retry));
            assert_eq!(ctx.get(&vars::STEP_PHASE).unwrap(), Some(StepPhase::Retry));
            assert_eq!(step.executions(), 1);

            assert_eq!(machine.run(&step, &mut ctx).await.unwrap().phase, StepPhase::Poll);
            assert_eq!(step.executions(), 2);
        }
    }
}
