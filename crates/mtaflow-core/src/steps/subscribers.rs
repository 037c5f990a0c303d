//! Restarting applications that subscribe to configuration published by the
//! deployed MTA.
//!
//! Restarts are best effort: a subscriber that cannot be restarted produces a
//! warning and the step still succeeds.

use futures_util::future::BoxFuture;
use mtaflow_types::platform::CloudApplication;
use mtaflow_types::process::StepPhase;

use crate::step::body::StepBody;
use crate::step::context::ProcessContext;
use crate::step::error::StepError;
use crate::variables::Variable;
use crate::vars;

pub const RESTART_SUBSCRIBERS: &str = "restartSubscribers";
pub const RESTART_SERVICE_BROKER_SUBSCRIBERS: &str = "restartServiceBrokerSubscribers";

/// Which list of updated subscribers a [`RestartSubscribersStep`] works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberKind {
    Regular,
    ServiceBroker,
}

impl SubscriberKind {
    fn variable(self) -> Variable<Vec<CloudApplication>> {
        match self {
            SubscriberKind::Regular => vars::UPDATED_SUBSCRIBERS,
            SubscriberKind::ServiceBroker => vars::UPDATED_SERVICE_BROKER_SUBSCRIBERS,
        }
    }
}

#[derive(Debug)]
pub struct RestartSubscribersStep {
    kind: SubscriberKind,
}

impl RestartSubscribersStep {
    pub fn new(kind: SubscriberKind) -> Self {
        Self { kind }
    }

    async fn restart_all(&self, ctx: &mut ProcessContext) -> Result<StepPhase, StepError> {
        let subscribers = ctx.get(&self.kind.variable())?.unwrap_or_default();
        for subscriber in subscribers {
            if let Err(e) = restart(ctx, &subscriber.name).await {
                ctx.warn(format!(
                    "Could not restart subscriber \"{}\": {}",
                    subscriber.name, e.description
                ));
            }
        }
        Ok(StepPhase::Done)
    }
}

async fn restart(ctx: &mut ProcessContext, name: &str) -> Result<(), mtaflow_types::error::PlatformError> {
    let platform = ctx.platform().clone();
    ctx.info(format!("Restarting subscriber \"{name}\""));
    platform.stop_application(name).await?;
    platform.start_application(name).await
}

impl StepBody for RestartSubscribersStep {
    fn name(&self) -> &str {
        match self.kind {
            SubscriberKind::Regular => RESTART_SUBSCRIBERS,
            SubscriberKind::ServiceBroker => RESTART_SERVICE_BROKER_SUBSCRIBERS,
        }
    }

    fn execute<'a>(&'a self, ctx: &'a mut ProcessContext) -> BoxFuture<'a, Result<StepPhase, StepError>> {
        Box::pin(self.restart_all(ctx))
    }

    fn error_message(&self, _ctx: &ProcessContext) -> String {
        "Error restarting subscribers".to_string()
    }
}
