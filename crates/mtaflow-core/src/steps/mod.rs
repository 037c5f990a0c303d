//! Concrete deployment steps built on the step machine.
//!
//! Platform error policy shared by these steps: a 404 on a lookup means the
//! resource does not exist, a 409 on deletion is benign, and a 403 fails the
//! step unless `noFailOnMissingPermissions` is set.

pub mod app;
pub mod lock;
pub mod route;
pub mod service;
pub mod subscribers;
pub mod task;

use mtaflow_types::error::PlatformError;

use crate::step::context::ProcessContext;
use crate::step::error::StepError;
use crate::vars;

/// Downgrade a 403 to a warning when the operator allowed missing permissions.
pub(crate) fn tolerate_missing_permissions(
    ctx: &mut ProcessContext,
    err: PlatformError,
    activity: &str,
) -> Result<(), StepError> {
    if err.is_forbidden() && ctx.get(&vars::NO_FAIL_ON_MISSING_PERMISSIONS)?.unwrap_or(false) {
        ctx.warn(format!("Missing permissions for {activity}: {}", err.description));
        return Ok(());
    }
    Err(StepError::Platform(err))
}
