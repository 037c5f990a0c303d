//! Typed access to an operation instance's process variables.
//!
//! A [`VariableSet`] is a snapshot of the durable variables of one operation
//! instance, loaded before a step runs. Writes are tracked so that only the
//! changed and removed names are flushed back to the [`VariableStore`]
//! afterwards.
//!
//! [`VariableStore`]: crate::store::VariableStore

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Errors reading or writing process variables.
#[derive(Debug, Error)]
pub enum VariableError {
    #[error("required variable '{0}' is not set")]
    Missing(String),

    #[error("variable '{name}' has an unexpected value: {reason}")]
    Invalid { name: String, reason: String },
}

/// Name of a process variable together with the type stored under it.
pub struct Variable<T> {
    name: Cow<'static, str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Variable<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            _marker: PhantomData,
        }
    }

    /// A variable whose name is computed at runtime (e.g. `<x>Index`).
    pub fn dynamic(name: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for Variable<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Variable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Variable").field(&self.name).finish()
    }
}

/// Pending writes produced by a step invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableChanges {
    pub set: Vec<(String, Value)>,
    pub removed: Vec<String>,
}

impl VariableChanges {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.removed.is_empty()
    }
}

/// In-memory snapshot of an instance's variables with change tracking.
#[derive(Debug, Clone, Default)]
pub struct VariableSet {
    values: HashMap<String, Value>,
    changed: BTreeSet<String>,
    removed: BTreeSet<String>,
}

impl VariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap variables loaded from the store; nothing is marked dirty.
    pub fn from_map(values: HashMap<String, Value>) -> Self {
        Self {
            values,
            ..Default::default()
        }
    }

    /// Read a variable. JSON `null` is treated as unset.
    pub fn get<T: DeserializeOwned>(&self, var: &Variable<T>) -> Result<Option<T>, VariableError> {
        match self.values.get(var.name()) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| VariableError::Invalid {
                    name: var.name().to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    pub fn get_or<T: DeserializeOwned>(&self, var: &Variable<T>, default: T) -> Result<T, VariableError> {
        Ok(self.get(var)?.unwrap_or(default))
    }

    /// Read a variable that must be present.
    pub fn require<T: DeserializeOwned>(&self, var: &Variable<T>) -> Result<T, VariableError> {
        self.get(var)?
            .ok_or_else(|| VariableError::Missing(var.name().to_string()))
    }

    pub fn set<T: Serialize>(&mut self, var: &Variable<T>, value: T) -> Result<(), VariableError> {
        let value = serde_json::to_value(value).map_err(|e| VariableError::Invalid {
            name: var.name().to_string(),
            reason: e.to_string(),
        })?;
        self.set_raw(var.name(), value);
        Ok(())
    }

    pub fn remove<T>(&mut self, var: &Variable<T>) {
        self.remove_raw(var.name());
    }

    pub fn contains<T>(&self, var: &Variable<T>) -> bool {
        matches!(self.values.get(var.name()), Some(v) if !v.is_null())
    }

    pub fn get_raw(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set_raw(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.removed.remove(&name);
        self.changed.insert(name.clone());
        self.values.insert(name, value);
    }

    pub fn remove_raw(&mut self, name: &str) {
        if self.values.remove(name).is_some() || self.changed.contains(name) {
            self.removed.insert(name.to_string());
        }
        self.changed.remove(name);
    }

    /// All current values, e.g. to seed a child process.
    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }

    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty() || !self.removed.is_empty()
    }

    /// Drain the pending writes, leaving the values in place.
    pub fn take_changes(&mut self) -> VariableChanges {
        let set = std::mem::take(&mut self.changed)
            .into_iter()
            .filter_map(|name| self.values.get(&name).map(|v| (name, v.clone())))
            .collect();
        let removed = std::mem::take(&mut self.removed).into_iter().collect();
        VariableChanges { set, removed }
    }
}
