//! Core types for job graphs
//!
//! A job graph is the host's "API format" prompt: a mapping from node id
//! to the node's class type and input values. It is what gets submitted
//! to the remote service.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{GraphError, Result};

/// Identifier of a node in the job graph (the key of the API prompt)
pub type NodeId = String;

/// One translated node of a submitted workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobNode {
    /// Host node class (e.g., "LoadImage", "SaveImage")
    pub class_type: String,
    /// Input values keyed by field name
    #[serde(default)]
    pub inputs: Map<String, Value>,
    /// Any other fields the host attaches (e.g., `_meta`), passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobNode {
    /// Create a node with no inputs
    pub fn new(class_type: impl Into<String>) -> Self {
        Self {
            class_type: class_type.into(),
            inputs: Map::new(),
            extra: Map::new(),
        }
    }

    /// Set an input value
    pub fn with_input(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(field.into(), value.into());
        self
    }

    /// Get an input as a non-empty string
    pub fn input_str(&self, field: &str) -> Option<&str> {
        self.inputs
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// The translated graph: node id -> job node
///
/// Iteration order is stable: integer-like ids ascending numerically,
/// followed by any other ids in lexical order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobGraph {
    nodes: BTreeMap<NodeId, JobNode>,
}

impl JobGraph {
    /// Create an empty job graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from (id, node) pairs
    pub fn from_nodes<I, K>(nodes: I) -> Self
    where
        I: IntoIterator<Item = (K, JobNode)>,
        K: Into<NodeId>,
    {
        Self {
            nodes: nodes.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Decode a job graph from the host's JSON prompt output
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(GraphError::InvalidPayload(format!(
                "expected an object of nodes, got {}",
                json_kind(&value)
            )));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Encode the graph back into the JSON prompt format
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get a node by id
    pub fn get(&self, node_id: &str) -> Option<&JobNode> {
        self.nodes.get(node_id)
    }

    /// Get a mutable node by id
    pub fn get_mut(&mut self, node_id: &str) -> Option<&mut JobNode> {
        self.nodes.get_mut(node_id)
    }

    /// Insert or replace a node
    pub fn insert(&mut self, node_id: impl Into<NodeId>, node: JobNode) -> Option<JobNode> {
        self.nodes.insert(node_id.into(), node)
    }

    /// Overwrite one input field of a node
    ///
    /// Returns the previous value, or `None` if the node does not exist
    /// or had no value for the field.
    pub fn set_input(&mut self, node_id: &str, field: &str, value: Value) -> Option<Value> {
        self.nodes
            .get_mut(node_id)
            .and_then(|node| node.inputs.insert(field.to_string(), value))
    }

    /// Iterate nodes in stable order
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &JobNode)> {
        let mut entries: Vec<_> = self.nodes.iter().collect();
        entries.sort_by(|(a, _), (b, _)| compare_node_ids(a, b));
        entries.into_iter()
    }
}

/// Order node ids the way the host enumerates prompt keys
fn compare_node_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_api_prompt() {
        let value = json!({
            "3": {"class_type": "KSampler", "inputs": {"seed": 5}, "_meta": {"title": "Sampler"}},
            "9": {"class_type": "SaveImage", "inputs": {"images": ["8", 0]}}
        });

        let graph = JobGraph::from_value(value.clone()).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get("3").unwrap().class_type, "KSampler");
        assert!(graph.get("3").unwrap().extra.contains_key("_meta"));

        // Extra fields survive the round trip
        assert_eq!(graph.to_value().unwrap(), value);
    }

    #[test]
    fn test_rejects_non_object_payload() {
        let err = JobGraph::from_value(json!([1, 2])).unwrap_err();
        assert!(matches!(err, GraphError::InvalidPayload(_)));
    }

    #[test]
    fn test_iteration_order_is_numeric_first() {
        let graph = JobGraph::from_nodes([
            ("10", JobNode::new("A")),
            ("2", JobNode::new("B")),
            ("extra", JobNode::new("C")),
            ("1", JobNode::new("D")),
        ]);

        let ids: Vec<&str> = graph.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "10", "extra"]);
    }

    #[test]
    fn test_set_input() {
        let mut graph =
            JobGraph::from_nodes([("1", JobNode::new("LoadImage").with_input("image", "a.png"))]);

        let previous = graph.set_input("1", "image", json!("https://cdn/a.png"));
        assert_eq!(previous, Some(json!("a.png")));
        assert_eq!(graph.get("1").unwrap().input_str("image"), Some("https://cdn/a.png"));
        assert_eq!(graph.set_input("missing", "image", json!("x")), None);
    }

    #[test]
    fn test_input_str_ignores_empty_and_links() {
        let node = JobNode::new("LoadImage")
            .with_input("image", "")
            .with_input("mask", json!(["4", 0]));
        assert_eq!(node.input_str("image"), None);
        assert_eq!(node.input_str("mask"), None);
    }
}
