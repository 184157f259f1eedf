//! Typed model of a workflow graph document.
//!
//! A workflow is a flat JSON object whose keys are node ids and whose values
//! are node definitions: a `class_type` tag identifying the remote operation,
//! named inputs, and optional `_meta` diagnostics. An input is either a
//! literal JSON value or a two-element `["<node-id>", <slot>]` array
//! referencing one output of another node. Reference integrity is a caller
//! contract; the remote engine does not verify it at parse time either.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A complete job-description document, keyed by node id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Workflow(BTreeMap<String, Node>);

/// One operation in the graph document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub class_type: String,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<NodeMeta>,
}

/// Diagnostics-only metadata attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    pub title: String,
}

/// Build a positional reference to another node's output slot.
pub fn node_ref(id: &str, slot: u32) -> Value {
    json!([id, slot])
}

impl Node {
    pub fn new(class_type: &str) -> Self {
        Node {
            class_type: class_type.to_string(),
            inputs: Map::new(),
            meta: None,
        }
    }

    /// Set a literal input value, builder-style.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.inputs.insert(key.to_string(), value.into());
        self
    }

    /// Wire an input to another node's output slot, builder-style.
    pub fn with_ref(mut self, key: &str, id: &str, slot: u32) -> Self {
        self.inputs.insert(key.to_string(), node_ref(id, slot));
        self
    }

    pub fn titled(mut self, title: &str) -> Self {
        self.meta = Some(NodeMeta {
            title: title.to_string(),
        });
        self
    }

    pub fn set_input(&mut self, key: &str, value: impl Into<Value>) {
        self.inputs.insert(key.to_string(), value.into());
    }

    pub fn input(&self, key: &str) -> Option<&Value> {
        self.inputs.get(key)
    }
}

impl Workflow {
    pub fn new() -> Self {
        Workflow(BTreeMap::new())
    }

    pub fn insert(&mut self, id: &str, node: Node) {
        self.0.insert(id.to_string(), node);
    }

    pub fn remove(&mut self, id: &str) -> Option<Node> {
        self.0.remove(id)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.0.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.0.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Node)> {
        self.0.iter()
    }
}
