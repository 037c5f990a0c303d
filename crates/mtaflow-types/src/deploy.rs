//! Deployment graph nodes and the lifecycle hooks attached to them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::platform::{CloudApplication, CloudServiceInstance};

/// One node of the deployment dependency graph (typically a module).
///
/// `deployed_after` names the nodes that must complete before this one starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentNode {
    pub name: String,
    #[serde(default)]
    pub deployed_after: Vec<String>,
    #[serde(default)]
    pub application: Option<CloudApplication>,
    #[serde(default)]
    pub services: Vec<CloudServiceInstance>,
    #[serde(default)]
    pub hooks: Vec<ModuleHook>,
}

impl DeploymentNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn after<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deployed_after = deps.into_iter().map(Into::into).collect();
        self
    }
}

/// Lifecycle point at which a module hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookPhase {
    BeforeStop,
    AfterStop,
    BeforeStart,
    AfterStart,
}

/// A command executed as a one-off task at certain lifecycle phases of a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleHook {
    pub name: String,
    pub phases: Vec<HookPhase>,
    pub command: String,
}

/// Hooks already executed for one module, keyed by hook name.
pub type ExecutedHooks = BTreeMap<String, Vec<HookPhase>>;
