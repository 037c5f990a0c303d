//! In-memory process variable store.
//!
//! Useful for embedding the step machine in a host engine that keeps its own
//! durable state, and for local runs without a database.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use mtaflow_core::store::VariableStore;
use mtaflow_types::error::RepositoryError;
use serde_json::Value;

/// `VariableStore` backed by a concurrent map of instance id to variables.
#[derive(Clone, Default)]
pub struct InMemoryVariableStore {
    instances: Arc<DashMap<String, HashMap<String, Value>>>,
}

impl InMemoryVariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instances that currently hold at least one variable.
    pub fn instance_count(&self) -> usize {
        self.instances.iter().filter(|entry| !entry.value().is_empty()).count()
    }
}

impl VariableStore for InMemoryVariableStore {
    async fn get(&self, instance_id: &str, name: &str) -> Result<Option<Value>, RepositoryError> {
        Ok(self
            .instances
            .get(instance_id)
            .and_then(|vars| vars.get(name).cloned()))
    }

    async fn set(&self, instance_id: &str, name: &str, value: &Value) -> Result<(), RepositoryError> {
        self.instances
            .entry(instance_id.to_string())
            .or_default()
            .insert(name.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, instance_id: &str, name: &str) -> Result<(), RepositoryError> {
        if let Some(mut vars) = self.instances.get_mut(instance_id) {
            vars.remove(name);
        }
        Ok(())
    }

    async fn list(&self, instance_id: &str) -> Result<Vec<String>, RepositoryError> {
        let mut names: Vec<String> = self
            .instances
            .get(instance_id)
            .map(|vars| vars.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    async fn load_all(&self, instance_id: &str) -> Result<HashMap<String, Value>, RepositoryError> {
        Ok(self
            .instances
            .get(instance_id)
            .map(|vars| vars.clone())
            .unwrap_or_default())
    }
}
