//! Labelled, immutable state nodes

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A labelled state with read-only context attributes
///
/// Nodes are shared as `Arc<StateNode>`; neither the label nor the context
/// can change after the node is added to a machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateNode {
    /// The label the node was registered under
    pub label: String,
    /// Arbitrary attributes attached at registration
    pub context: Map<String, Value>,
}

impl StateNode {
    /// Create a node with an empty context
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            context: Map::new(),
        })
    }

    /// Create a node with context attributes
    pub fn with_context(label: impl Into<String>, context: Map<String, Value>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            context,
        })
    }

    /// Look up a context attribute
    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }
}

impl std::fmt::Display for StateNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label)
    }
}
