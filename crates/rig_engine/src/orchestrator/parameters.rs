//! UI parameter bindings
//!
//! A binding ties a stable input id (e.g. `"monitor-distance"`) to a payload
//! entry addressed as `"<node name>.<payload key>"`. Continuous inputs are
//! debounced so a dragged slider produces one scene mutation once it settles;
//! discrete inputs apply immediately.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::foundation::time::Debouncer;
use crate::scene::{NodeId, PayloadValue, SceneError, SceneResult, SceneTree};

/// Value delivered by a UI input
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    /// Numeric field or slider
    Number(f64),
    /// Checkbox
    Flag(bool),
    /// Text field or dropdown
    Text(String),
}

impl From<ParameterValue> for PayloadValue {
    fn from(value: ParameterValue) -> Self {
        match value {
            ParameterValue::Number(n) => PayloadValue::Number(n),
            ParameterValue::Flag(b) => PayloadValue::Bool(b),
            ParameterValue::Text(t) => PayloadValue::Text(t),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        ParameterValue::Number(value)
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        ParameterValue::Flag(value)
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::Text(value.to_string())
    }
}

/// How an input delivers changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Many intermediate values; debounced
    Continuous,
    /// One deliberate value; applied immediately
    Discrete,
}

/// Parameter binding errors
#[derive(Error, Debug)]
pub enum ParameterError {
    /// No binding for this input id
    #[error("No parameter bound to input '{0}'")]
    UnknownSource(String),

    /// Path is not `<node>.<key>`
    #[error("Invalid parameter path '{0}': expected '<node>.<key>'")]
    InvalidPath(String),

    /// Bound node does not exist
    #[error("Parameter target node '{0}' not found")]
    NodeNotFound(String),

    /// Numbers must be finite
    #[error("Invalid value for '{source_id}': {reason}")]
    InvalidValue {
        /// Input id
        source_id: String,
        /// What was wrong
        reason: String,
    },

    /// Orchestrator is not running
    #[error("Orchestrator is not initialized")]
    NotInitialized,

    /// Scene mutation failed
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Follow-up run after the payload entry is written
pub type ParameterHandler = Box<dyn FnMut(&mut SceneTree, NodeId, &ParameterValue) -> SceneResult<()>>;

/// `<node name>.<payload key>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterPath {
    /// Target node name
    pub node: String,
    /// Payload key
    pub key: String,
}

impl ParameterPath {
    /// Parse `<node>.<key>`; both parts must be non-empty
    pub fn parse(path: &str) -> Result<Self, ParameterError> {
        match path.split_once('.') {
            Some((node, key)) if !node.is_empty() && !key.is_empty() && !key.contains('.') => Ok(Self {
                node: node.to_string(),
                key: key.to_string(),
            }),
            _ => Err(ParameterError::InvalidPath(path.to_string())),
        }
    }
}

struct Binding {
    path: ParameterPath,
    kind: InputKind,
    handler: Option<ParameterHandler>,
}

/// Registered bindings plus the debounce queue for continuous inputs
pub struct ParameterBindings {
    bindings: HashMap<String, Binding>,
    pending: Debouncer<String, ParameterValue>,
}

impl ParameterBindings {
    /// Bindings with the given debounce delay
    pub fn new(debounce: Duration) -> Self {
        Self {
            bindings: HashMap::new(),
            pending: Debouncer::new(debounce),
        }
    }

    /// Register or replace a binding
    pub fn bind(
        &mut self,
        source_id: &str,
        path: &str,
        kind: InputKind,
        handler: Option<ParameterHandler>,
    ) -> Result<(), ParameterError> {
        let path = ParameterPath::parse(path)?;
        let binding = Binding { path, kind, handler };
        if self.bindings.insert(source_id.to_string(), binding).is_some() {
            log::debug!("Rebound parameter input '{}'", source_id);
        }
        Ok(())
    }

    /// Remove a binding and any pending value for it
    pub fn unbind(&mut self, source_id: &str) -> bool {
        self.pending.cancel(source_id);
        self.bindings.remove(source_id).is_some()
    }

    /// Whether an input id is bound
    pub fn contains(&self, source_id: &str) -> bool {
        self.bindings.contains_key(source_id)
    }

    /// Target path of a binding
    pub fn path(&self, source_id: &str) -> Option<&ParameterPath> {
        self.bindings.get(source_id).map(|b| &b.path)
    }

    /// Bound input ids, sorted
    pub fn sources(&self) -> Vec<&str> {
        let mut sources: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        sources.sort_unstable();
        sources
    }

    /// Continuous values waiting for their quiet period
    pub fn pending_count(&self) -> usize {
        self.pending.pending_count()
    }

    /// Accept a changed value.
    ///
    /// Discrete values are returned for immediate application; continuous
    /// values are held until `take_due`.
    pub fn submit(
        &mut self,
        source_id: &str,
        value: ParameterValue,
        now: Instant,
    ) -> Result<Option<ParameterValue>, ParameterError> {
        let binding = self
            .bindings
            .get(source_id)
            .ok_or_else(|| ParameterError::UnknownSource(source_id.to_string()))?;
        if let ParameterValue::Number(n) = value {
            if !n.is_finite() {
                return Err(ParameterError::InvalidValue {
                    source_id: source_id.to_string(),
                    reason: format!("{} is not a finite number", n),
                });
            }
        }
        match binding.kind {
            InputKind::Discrete => Ok(Some(value)),
            InputKind::Continuous => {
                self.pending.push(source_id.to_string(), value, now);
                Ok(None)
            }
        }
    }

    /// Continuous values whose quiet period has passed
    pub fn take_due(&mut self, now: Instant) -> Vec<(String, ParameterValue)> {
        self.pending.take_due(now)
    }

    /// Every pending continuous value, due or not
    pub fn take_all(&mut self) -> Vec<(String, ParameterValue)> {
        self.pending.take_all()
    }

    /// Write `value` to the bound payload entry, then run the handler.
    ///
    /// Empty text removes the entry.
    pub fn apply(
        &mut self,
        tree: &mut SceneTree,
        source_id: &str,
        value: &ParameterValue,
    ) -> Result<NodeId, ParameterError> {
        let binding = self
            .bindings
            .get_mut(source_id)
            .ok_or_else(|| ParameterError::UnknownSource(source_id.to_string()))?;
        let node = tree
            .find_by_name(&binding.path.node)
            .ok_or_else(|| ParameterError::NodeNotFound(binding.path.node.clone()))?;

        match value {
            ParameterValue::Text(text) if text.is_empty() => {
                tree.remove_data(node, &binding.path.key)?;
            }
            _ => tree.set_data(node, &binding.path.key, value.clone())?,
        }
        if let Some(handler) = binding.handler.as_mut() {
            handler(tree, node, value)?;
        }
        log::debug!("Parameter '{}' -> {}.{} = {:?}", source_id, binding.path.node, binding.path.key, value);
        Ok(node)
    }

    /// Drop every binding and pending value
    pub fn clear(&mut self) {
        self.bindings.clear();
        self.pending.clear();
    }
}
