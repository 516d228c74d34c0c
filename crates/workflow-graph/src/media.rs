//! Detection of media-bearing nodes
//!
//! Loader nodes reference files that live on the host's local file server.
//! Those files must be promoted to remote URLs before the job can run
//! elsewhere.

use serde::{Deserialize, Serialize};

use crate::types::{JobGraph, NodeId};

/// Kind of media a loader node references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

/// Recognized (class type, field, kind) combinations
const MEDIA_FIELDS: &[(&str, &str, MediaKind)] = &[
    ("LoadImage", "image", MediaKind::Image),
    ("LoadVideo", "file", MediaKind::Video),
    ("VHS_LoadVideo", "video", MediaKind::Video),
];

/// A node field holding a local filename
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaReference {
    pub node_id: NodeId,
    pub class_type: String,
    pub field_name: String,
    pub filename: String,
    pub kind: MediaKind,
}

/// Scan every node for recognized media fields
///
/// Nodes whose media field is empty or not a plain string are ignored.
pub fn find_media_references(graph: &JobGraph) -> Vec<MediaReference> {
    let mut references = Vec::new();

    for (node_id, node) in graph.iter() {
        let Some((_, field, kind)) = MEDIA_FIELDS
            .iter()
            .find(|(class_type, _, _)| *class_type == node.class_type)
        else {
            continue;
        };

        if let Some(filename) = node.input_str(field) {
            log::debug!(
                "Found media node {} ({}), field '{}' = {}",
                node_id,
                node.class_type,
                field,
                filename
            );
            references.push(MediaReference {
                node_id: node_id.clone(),
                class_type: node.class_type.clone(),
                field_name: field.to_string(),
                filename: filename.to_string(),
                kind: *kind,
            });
        }
    }

    references
}

/// Descriptor of one resolved media input, sent alongside the job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputParam {
    /// Key of the node in the job graph
    pub api_json_key: NodeId,
    /// Always empty; the service correlates by `api_json_key`
    pub node_id: String,
    pub node_name: String,
    pub node_param_name: String,
    pub node_param: String,
}

/// Extract one input-parameter descriptor per media-bearing node
///
/// Meant to run after media fields have been rewritten, so `node_param`
/// carries the resolved URL.
pub fn input_params(graph: &JobGraph) -> Vec<InputParam> {
    find_media_references(graph)
        .into_iter()
        .map(|reference| InputParam {
            api_json_key: reference.node_id,
            node_id: String::new(),
            node_name: reference.class_type,
            node_param_name: reference.field_name,
            node_param: reference.filename,
        })
        .collect()
}
