//! Steps guarding an MTA against concurrent operations.

use futures_util::future::BoxFuture;
use mtaflow_types::process::StepPhase;

use crate::lock::LockAcquisition;
use crate::step::body::StepBody;
use crate::step::context::ProcessContext;
use crate::step::error::StepError;
use crate::vars;

pub const ACQUIRE_OPERATION_LOCK: &str = "acquireOperationLock";
pub const RELEASE_OPERATION_LOCK: &str = "releaseOperationLock";

/// Takes the per-MTA lock for the running process instance.
#[derive(Debug, Default)]
pub struct AcquireOperationLockStep;

impl AcquireOperationLockStep {
    async fn acquire(&self, ctx: &mut ProcessContext) -> Result<StepPhase, StepError> {
        let mta_id = ctx.require(&vars::MTA_ID)?;
        let instance_id = ctx.instance_id().to_string();

        match ctx.lock().clone().try_acquire(&mta_id, &instance_id).await? {
            LockAcquisition::Acquired => {
                ctx.debug(&format!("acquired operation lock for \"{mta_id}\""));
                Ok(StepPhase::Done)
            }
            LockAcquisition::HeldBy(holder) => Err(StepError::ConflictingOperation { mta_id, holder }),
        }
    }
}

impl StepBody for AcquireOperationLockStep {
    fn name(&self) -> &str {
        ACQUIRE_OPERATION_LOCK
    }

    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<StepPhase, StepError>> {
        Box::pin(self.acquire(ctx))
    }

    fn error_message(&self, ctx: &ProcessContext) -> String {
        let mta_id = ctx.get(&vars::MTA_ID).ok().flatten().unwrap_or_default();
        format!("Error acquiring the operation lock of MTA \"{mta_id}\"")
    }
}

/// Releases the per-MTA lock held by the running process instance.
#[derive(Debug, Default)]
pub struct ReleaseOperationLockStep;

impl ReleaseOperationLockStep {
    async fn release(&self, ctx: &mut ProcessContext) -> Result<StepPhase, StepError> {
        let mta_id = ctx.require(&vars::MTA_ID)?;
        let instance_id = ctx.instance_id().to_string();
        ctx.lock().clone().release(&mta_id, &instance_id).await?;
        ctx.debug(&format!("released operation lock for \"{mta_id}\""));
        Ok(StepPhase::Done)
    }
}

impl StepBody for ReleaseOperationLockStep {
    fn name(&self) -> &str {
        RELEASE_OPERATION_LOCK
    }

    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<StepPhase, StepError>> {
        Box::pin(self.release(ctx))
    }

    fn error_message(&self, ctx: &ProcessContext) -> String {
        let mta_id = ctx.get(&vars::MTA_ID).ok().flatten().unwrap_or_default();
        format!("Error releasing the operation lock of MTA \"{mta_id}\"")
    }
}
