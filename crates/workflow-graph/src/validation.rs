//! Static validation of job graphs before submission
//!
//! Runs every check and returns all findings together; no check
//! short-circuits another. Pure: no I/O.

use serde::{Deserialize, Serialize};

use crate::types::JobGraph;

/// Class types recognized as producing a retrievable result
pub const OUTPUT_NODE_TYPES: &[&str] = &["SaveImage", "Image Save", "SaveTextNode", "VHS_VideoCombine"];

/// Substrings (matched case-insensitively) of class types that must not be submitted
pub const BLOCKED_NODE_PATTERNS: &[&str] = &["easy blocker"];

/// Minimum number of nodes for a submittable workflow
const MIN_NODE_COUNT: usize = 2;

/// A node that matched a blocked pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedNode {
    pub node_id: String,
    pub class_type: String,
}

/// Validation finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationError {
    /// The graph has too few nodes to be a real pipeline
    #[serde(rename_all = "camelCase")]
    InsufficientNodes {
        node_count: usize,
        minimum_required: usize,
    },
    /// No node produces a recognized output
    #[serde(rename_all = "camelCase")]
    NoOutputNode { supported_nodes: Vec<String> },
    /// One or more forbidden nodes are present
    #[serde(rename_all = "camelCase")]
    BlockedNode { nodes: Vec<BlockedNode> },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientNodes { node_count, .. } => {
                write!(
                    f,
                    "The workflow only has {} node(s), which is not a valid workflow. \
                     A workflow needs an input node, a processing node and an output node; \
                     make sure it is fully loaded and no node was deleted by mistake.",
                    node_count
                )
            }
            Self::NoOutputNode { supported_nodes } => {
                write!(
                    f,
                    "The workflow has no output node, so no result can be retrieved. \
                     Add one of: {}.",
                    supported_nodes.join(", ")
                )
            }
            Self::BlockedNode { nodes } => {
                let listed: Vec<String> = nodes
                    .iter()
                    .map(|n| format!("{} ({})", n.node_id, n.class_type))
                    .collect();
                write!(
                    f,
                    "The workflow contains forbidden nodes, remove them and resubmit: {}",
                    listed.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Outcome of validating a job graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

/// Validate a job graph
///
/// Returns all validation errors found (not just the first).
pub fn validate_job_graph(graph: &JobGraph) -> ValidationReport {
    let mut errors = Vec::new();

    check_node_count(graph, &mut errors);
    check_output_nodes(graph, &mut errors);
    check_blocked_nodes(graph, &mut errors);

    if errors.is_empty() {
        log::debug!("Job graph with {} nodes passed validation", graph.len());
    } else {
        for error in &errors {
            log::info!("Job graph validation failed: {}", error);
        }
    }

    ValidationReport {
        is_valid: errors.is_empty(),
        errors,
    }
}

/// A single node cannot constitute a pipeline
fn check_node_count(graph: &JobGraph, errors: &mut Vec<ValidationError>) {
    let node_count = graph.len();
    if node_count < MIN_NODE_COUNT {
        errors.push(ValidationError::InsufficientNodes {
            node_count,
            minimum_required: MIN_NODE_COUNT,
        });
    }
}

/// At least one node must be a recognized saver (exact, case-sensitive match)
fn check_output_nodes(graph: &JobGraph, errors: &mut Vec<ValidationError>) {
    let found = graph
        .iter()
        .filter(|(_, node)| OUTPUT_NODE_TYPES.contains(&node.class_type.as_str()))
        .count();

    if found == 0 {
        errors.push(ValidationError::NoOutputNode {
            supported_nodes: OUTPUT_NODE_TYPES.iter().map(|s| s.to_string()).collect(),
        });
    }
}

/// Collect every node whose class type contains a blocked pattern
fn check_blocked_nodes(graph: &JobGraph, errors: &mut Vec<ValidationError>) {
    let nodes: Vec<BlockedNode> = graph
        .iter()
        .filter(|(_, node)| is_blocked(&node.class_type))
        .map(|(id, node)| BlockedNode {
            node_id: id.clone(),
            class_type: node.class_type.clone(),
        })
        .collect();

    if !nodes.is_empty() {
        errors.push(ValidationError::BlockedNode { nodes });
    }
}

fn is_blocked(class_type: &str) -> bool {
    let lowered = class_type.to_lowercase();
    BLOCKED_NODE_PATTERNS
        .iter()
        .any(|pattern| lowered.contains(&pattern.to_lowercase()))
}
