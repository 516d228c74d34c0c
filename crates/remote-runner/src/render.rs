//! Result renderer bridge
//!
//! Turns a finished task's raw status payload into preview cards attached
//! to the host graph's output nodes.
//!
//! Each result item carries a JSON string (`workflow_extra_info`) naming
//! the job node it came from. Those strings are decoded into a
//! `ResourceMap` keyed by node id; items whose metadata cannot be decoded
//! are skipped. Every node found in the host graph then gets a preview
//! surface (reused while it stays attached) whose content is replaced
//! with one card per item.
//!
//! Node identities are not stable across graph loads, so the surface
//! cache is dropped by `on_graph_loaded`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{defaults, preview};

/// Host graph node id
pub type CanvasNodeId = i64;

/// Preview layout options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Max height of a single preview card in pixels
    pub max_height: u32,
    /// Number of grid columns in a preview surface
    pub columns: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_height: defaults::PREVIEW_MAX_HEIGHT,
            columns: defaults::PREVIEW_COLUMNS,
        }
    }
}

/// Kind of a result item, as tagged in its metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Text,
    Image,
    Video,
}

impl ResourceKind {
    fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Text),
            3 => Some(Self::Image),
            4 => Some(Self::Video),
            _ => None,
        }
    }

    /// Node height once content of this kind is shown
    pub fn node_height(&self) -> u32 {
        match self {
            Self::Text => preview::TEXT_NODE_HEIGHT,
            Self::Image => preview::IMAGE_NODE_HEIGHT,
            Self::Video => preview::VIDEO_NODE_HEIGHT,
        }
    }
}

/// Decoded per-item correlation metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemMetadata {
    pub node_id: CanvasNodeId,
    /// The correlation key as written by the service
    pub node_name: String,
    /// `None` when the item carries no (or an unknown) type tag
    pub kind: Option<ResourceKind>,
}

/// Decode an item's `workflow_extra_info` string
///
/// Returns `None` (skip the item) when the string is missing, is not
/// JSON, or holds no integer `apiJsonKey`.
pub fn decode_item_metadata(item: &Value) -> Option<ItemMetadata> {
    let raw = item.get("workflow_extra_info")?.as_str()?;
    let info: Value = match serde_json::from_str(raw) {
        Ok(info) => info,
        Err(e) => {
            log::warn!("Unreadable workflow_extra_info {:?}: {}", raw, e);
            return None;
        }
    };

    let (node_id, node_name) = match info.get("apiJsonKey") {
        Some(Value::Number(n)) => (n.as_i64()?, n.to_string()),
        Some(Value::String(s)) => (s.trim().parse::<CanvasNodeId>().ok()?, s.clone()),
        _ => return None,
    };
    let kind = match info.get("type") {
        Some(Value::Number(n)) => n.as_i64().and_then(ResourceKind::from_code),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok().and_then(ResourceKind::from_code),
        _ => None,
    };

    Some(ItemMetadata {
        node_id,
        node_name,
        kind,
    })
}

/// One preview card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PreviewCard {
    Text { node_name: String, text: String },
    Image { node_name: String, url: String },
    Video { node_name: String, url: String },
}

/// Result content of one node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeResources {
    pub text_items: Vec<PreviewCard>,
    pub image_items: Vec<PreviewCard>,
    pub video_items: Vec<PreviewCard>,
}

impl NodeResources {
    /// Cards in display order: text, then images, then videos
    pub fn cards(&self) -> Vec<PreviewCard> {
        self.text_items
            .iter()
            .chain(&self.image_items)
            .chain(&self.video_items)
            .cloned()
            .collect()
    }

    /// Kind that decides the node height (video over image over text)
    pub fn dominant_kind(&self) -> ResourceKind {
        if !self.video_items.is_empty() {
            ResourceKind::Video
        } else if !self.image_items.is_empty() {
            ResourceKind::Image
        } else {
            ResourceKind::Text
        }
    }
}

/// Node id to result content
pub type ResourceMap = BTreeMap<CanvasNodeId, NodeResources>;

const IMAGE_URL_FIELDS: &[&str] = &["image_url_medium", "image_url_big", "image_url_small"];
const VIDEO_URL_FIELDS: &[&str] = &[
    "video_url",
    "mp4_url",
    "url",
    "image_url_medium",
    "image_url_big",
    "image_url_small",
];

fn first_url(item: &Value, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|field| item.get(*field).and_then(Value::as_str))
        .find(|url| !url.is_empty())
        .map(str::to_string)
}

fn item_text(item: &Value) -> String {
    item.get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Build the resource map of a status payload
pub fn build_resource_map(payload: &Value) -> ResourceMap {
    let mut map = ResourceMap::new();
    let groups = payload
        .get("design_ai_resources")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for group in groups {
        let text_items = group
            .get("design_ai_text_resource_items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for item in text_items {
            let Some(meta) = decode_item_metadata(item) else {
                log::warn!("Skipping text item without a node id");
                continue;
            };
            map.entry(meta.node_id).or_default().text_items.push(PreviewCard::Text {
                node_name: meta.node_name,
                text: item_text(item),
            });
        }

        let media_items = group
            .get("design_ai_resource_items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for item in media_items {
            let Some(meta) = decode_item_metadata(item) else {
                log::warn!("Skipping media item without a node id");
                continue;
            };

            match meta.kind {
                Some(ResourceKind::Image) => {
                    if let Some(url) = first_url(item, IMAGE_URL_FIELDS) {
                        map.entry(meta.node_id).or_default().image_items.push(PreviewCard::Image {
                            node_name: meta.node_name,
                            url,
                        });
                    }
                }
                Some(ResourceKind::Video) => match first_url(item, VIDEO_URL_FIELDS) {
                    Some(url) => {
                        map.entry(meta.node_id).or_default().video_items.push(PreviewCard::Video {
                            node_name: meta.node_name,
                            url,
                        });
                    }
                    None => log::warn!("No video URL on item for node {}", meta.node_id),
                },
                Some(ResourceKind::Text) => {
                    map.entry(meta.node_id).or_default().text_items.push(PreviewCard::Text {
                        node_name: meta.node_name,
                        text: item_text(item),
                    });
                }
                None => log::debug!("Ignoring untyped media item for node {}", meta.node_id),
            }
        }
    }

    map
}

/// Handle of a preview surface owned by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

/// Host canvas operation failure
#[derive(Debug, Clone, thiserror::Error)]
#[error("Canvas error: {0}")]
pub struct CanvasError(pub String);

/// What the bridge needs from the host canvas
pub trait HostCanvas: Send + Sync {
    /// Type of a node in the current graph, `None` if it does not exist
    fn node_type(&self, node_id: CanvasNodeId) -> Option<String>;

    /// Attach a new preview surface to a node
    fn create_surface(
        &self,
        node_id: CanvasNodeId,
        options: &RenderOptions,
    ) -> Result<SurfaceHandle, CanvasError>;

    /// Whether a surface is still attached to the live canvas
    fn is_surface_attached(&self, surface: SurfaceHandle) -> bool;

    /// Replace every card of a surface
    fn replace_content(&self, surface: SurfaceHandle, cards: &[PreviewCard]) -> Result<(), CanvasError>;

    /// Apply new layout options to an existing surface
    fn apply_options(&self, surface: SurfaceHandle, options: &RenderOptions);

    /// Resize a node, keeping its width
    fn set_node_height(&self, node_id: CanvasNodeId, height: u32);

    /// Request a redraw of the canvas
    fn redraw(&self);
}

/// Per-node outcome of a render
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRenderSummary {
    pub node_id: CanvasNodeId,
    pub text_count: usize,
    pub image_count: usize,
    pub video_count: usize,
}

/// Outcome of one render call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSummary {
    pub rendered: Vec<NodeRenderSummary>,
    /// Correlated nodes that were missing, unsupported or failed
    pub skipped: usize,
}

/// Renders task results into the host graph
pub struct RenderBridge {
    canvas: Arc<dyn HostCanvas>,
    surfaces: Mutex<HashMap<CanvasNodeId, SurfaceHandle>>,
    options: RwLock<RenderOptions>,
}

impl RenderBridge {
    pub fn new(canvas: Arc<dyn HostCanvas>, options: RenderOptions) -> Self {
        Self {
            canvas,
            surfaces: Mutex::new(HashMap::new()),
            options: RwLock::new(options),
        }
    }

    pub fn options(&self) -> RenderOptions {
        self.options.read().clone()
    }

    /// Render a status payload into the host graph
    pub fn render(&self, payload: &Value) -> RenderSummary {
        let mut summary = RenderSummary::default();
        if payload.is_null() {
            log::warn!("Render called with an empty payload");
            return summary;
        }

        let map = build_resource_map(payload);
        log::info!("Rendering results for {} node(s)", map.len());

        for (node_id, resources) in &map {
            match self.render_node(*node_id, resources) {
                Ok(()) => summary.rendered.push(NodeRenderSummary {
                    node_id: *node_id,
                    text_count: resources.text_items.len(),
                    image_count: resources.image_items.len(),
                    video_count: resources.video_items.len(),
                }),
                Err(reason) => {
                    log::warn!("Skipping node {}: {}", node_id, reason);
                    summary.skipped += 1;
                }
            }
        }

        self.canvas.redraw();
        log::info!(
            "Render complete: {} rendered, {} skipped",
            summary.rendered.len(),
            summary.skipped
        );
        summary
    }

    fn render_node(&self, node_id: CanvasNodeId, resources: &NodeResources) -> Result<(), String> {
        let node_type = self
            .canvas
            .node_type(node_id)
            .ok_or_else(|| "not found in graph".to_string())?;

        if !is_supported_output_node(&node_type) {
            return Err(format!("type '{}' cannot show previews", node_type));
        }

        let surface = self.ensure_surface(node_id).map_err(|e| e.to_string())?;
        self.canvas
            .replace_content(surface, &resources.cards())
            .map_err(|e| e.to_string())?;
        self.canvas
            .set_node_height(node_id, resources.dominant_kind().node_height());
        Ok(())
    }

    fn ensure_surface(&self, node_id: CanvasNodeId) -> Result<SurfaceHandle, CanvasError> {
        let mut surfaces = self.surfaces.lock();
        if let Some(surface) = surfaces.get(&node_id).copied() {
            if self.canvas.is_surface_attached(surface) {
                return Ok(surface);
            }
            log::debug!("Cached surface of node {} is detached, recreating", node_id);
            surfaces.remove(&node_id);
        }

        let surface = self.canvas.create_surface(node_id, &self.options.read())?;
        surfaces.insert(node_id, surface);
        Ok(surface)
    }

    /// Empty the preview of one node
    pub fn clear(&self, node_id: CanvasNodeId) {
        if self.canvas.node_type(node_id).is_none() {
            log::warn!("Node {} not found for clear", node_id);
            return;
        }
        match self.surfaces.lock().get(&node_id) {
            Some(surface) => {
                if let Err(e) = self.canvas.replace_content(*surface, &[]) {
                    log::warn!("Failed to clear node {}: {}", node_id, e);
                }
            }
            None => log::debug!("No preview surface on node {}", node_id),
        }
        self.canvas.redraw();
    }

    /// Empty every cached preview
    pub fn clear_all(&self) {
        for (node_id, surface) in self.surfaces.lock().iter() {
            if let Err(e) = self.canvas.replace_content(*surface, &[]) {
                log::warn!("Failed to clear node {}: {}", node_id, e);
            }
        }
        self.canvas.redraw();
    }

    /// Update layout options and re-apply them to every cached surface
    ///
    /// A column count below 1 is ignored.
    pub fn set_options(&self, max_height: Option<u32>, columns: Option<u32>) {
        let options = {
            let mut options = self.options.write();
            if let Some(max_height) = max_height {
                options.max_height = max_height;
            }
            if let Some(columns) = columns.filter(|c| *c >= 1) {
                options.columns = columns;
            }
            options.clone()
        };

        for surface in self.surfaces.lock().values() {
            self.canvas.apply_options(*surface, &options);
        }
        self.canvas.redraw();
    }

    /// Drop every cached surface after the host loaded a new graph
    pub fn on_graph_loaded(&self) {
        let mut surfaces = self.surfaces.lock();
        log::debug!("Graph loaded, dropping {} cached surface(s)", surfaces.len());
        surfaces.clear();
    }

    /// Number of cached surfaces
    pub fn cached_surfaces(&self) -> usize {
        self.surfaces.lock().len()
    }
}

/// Whether a host node type can hold a result preview
pub fn is_supported_output_node(node_type: &str) -> bool {
    let normalized = node_type.to_lowercase();
    normalized.trim() == preview::SUPPORTED_EXACT_TYPE
        || preview::SUPPORTED_TYPE_FRAGMENTS
            .iter()
            .any(|fragment| normalized.contains(fragment))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Canvas double recording every call
    #[derive(Default)]
    pub(crate) struct RecordingCanvas {
        pub nodes: HashMap<CanvasNodeId, String>,
        pub detached: Mutex<Vec<SurfaceHandle>>,
        pub created: Mutex<Vec<CanvasNodeId>>,
        pub contents: Mutex<HashMap<SurfaceHandle, Vec<PreviewCard>>>,
        pub heights: Mutex<HashMap<CanvasNodeId, u32>>,
        pub applied: Mutex<Vec<RenderOptions>>,
        pub redraws: Mutex<usize>,
        next_surface: Mutex<u64>,
    }

    impl RecordingCanvas {
        pub(crate) fn with_nodes(nodes: &[(CanvasNodeId, &str)]) -> Self {
            Self {
                nodes: nodes.iter().map(|(id, t)| (*id, t.to_string())).collect(),
                ..Default::default()
            }
        }
    }

    impl HostCanvas for RecordingCanvas {
        fn node_type(&self, node_id: CanvasNodeId) -> Option<String> {
            self.nodes.get(&node_id).cloned()
        }

        fn create_surface(
            &self,
            node_id: CanvasNodeId,
            _options: &RenderOptions,
        ) -> Result<SurfaceHandle, CanvasError> {
            self.created.lock().push(node_id);
            let mut next = self.next_surface.lock();
            *next += 1;
            Ok(SurfaceHandle(*next))
        }

        fn is_surface_attached(&self, surface: SurfaceHandle) -> bool {
            !self.detached.lock().contains(&surface)
        }

        fn replace_content(&self, surface: SurfaceHandle, cards: &[PreviewCard]) -> Result<(), CanvasError> {
            self.contents.lock().insert(surface, cards.to_vec());
            Ok(())
        }

        fn apply_options(&self, _surface: SurfaceHandle, options: &RenderOptions) {
            self.applied.lock().push(options.clone());
        }

        fn set_node_height(&self, node_id: CanvasNodeId, height: u32) {
            self.heights.lock().insert(node_id, height);
        }

        fn redraw(&self) {
            *self.redraws.lock() += 1;
        }
    }

    fn extra(key: Value, kind: i64) -> String {
        json!({"apiJsonKey": key, "type": kind}).to_string()
    }

    pub(crate) fn payload() -> Value {
        json!({
            "code": 200,
            "design_ai_resources": [{
                "status": 4,
                "design_ai_text_resource_items": [
                    {"text": "a red fox", "workflow_extra_info": extra(json!("12"), 1)},
                    {"text": "orphan", "workflow_extra_info": "{not json"}
                ],
                "design_ai_resource_items": [
                    {"image_url_big": "https://cdn/big.png", "image_url_medium": "https://cdn/medium.png",
                     "workflow_extra_info": extra(json!(9), 3)},
                    {"mp4_url": "https://cdn/clip.mp4", "workflow_extra_info": extra(json!("30"), 4)},
                    {"image_url_small": "https://cdn/small.png", "workflow_extra_info": extra(json!("99"), 3)},
                    {"url": "https://cdn/other", "workflow_extra_info": extra(json!("9"), 7)}
                ]
            }]
        })
    }

    #[test]
    fn test_decode_item_metadata() {
        let meta = decode_item_metadata(&json!({"workflow_extra_info": extra(json!("12"), 3)})).unwrap();
        assert_eq!(meta.node_id, 12);
        assert_eq!(meta.node_name, "12");
        assert_eq!(meta.kind, Some(ResourceKind::Image));

        let untyped = decode_item_metadata(&json!({"workflow_extra_info": r#"{"apiJsonKey": 4}"#})).unwrap();
        assert_eq!(untyped.kind, None);

        assert!(decode_item_metadata(&json!({})).is_none());
        assert!(decode_item_metadata(&json!({"workflow_extra_info": "{oops"})).is_none());
        assert!(decode_item_metadata(&json!({"workflow_extra_info": r#"{"apiJsonKey": "abc"}"#})).is_none());
        assert!(decode_item_metadata(&json!({"workflow_extra_info": r#"{"type": 3}"#})).is_none());
    }

    #[test]
    fn test_build_resource_map() {
        let map = build_resource_map(&payload());

        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![9, 12, 30, 99]);
        assert_eq!(
            map[&12].text_items,
            vec![PreviewCard::Text {
                node_name: "12".to_string(),
                text: "a red fox".to_string()
            }]
        );
        assert_eq!(
            map[&9].image_items,
            vec![PreviewCard::Image {
                node_name: "9".to_string(),
                url: "https://cdn/medium.png".to_string()
            }]
        );
        assert_eq!(map[&30].dominant_kind(), ResourceKind::Video);
        assert_eq!(map[&99].image_items.len(), 1);
    }

    #[test]
    fn test_supported_output_nodes() {
        assert!(is_supported_output_node("SaveTextNode"));
        assert!(is_supported_output_node("Image Save"));
        assert!(is_supported_output_node("VHS_VideoCombine"));
        assert!(!is_supported_output_node("SaveImage"));
        assert!(!is_supported_output_node("Image Saver"));
    }

    #[test]
    fn test_render_skips_missing_and_unsupported_nodes() {
        let canvas = Arc::new(RecordingCanvas::with_nodes(&[
            (9, "Image Save"),
            (12, "SaveTextNode"),
            (30, "VHS_VideoCombine"),
        ]));
        let bridge = RenderBridge::new(canvas.clone(), RenderOptions::default());

        let summary = bridge.render(&payload());

        assert_eq!(summary.skipped, 1);
        assert_eq!(
            summary.rendered.iter().map(|n| n.node_id).collect::<Vec<_>>(),
            vec![9, 12, 30]
        );
        let heights = canvas.heights.lock();
        assert_eq!(heights[&9], 800);
        assert_eq!(heights[&12], 400);
        assert_eq!(heights[&30], 800);
        assert_eq!(*canvas.redraws.lock(), 1);
        assert_eq!(bridge.cached_surfaces(), 3);
    }

    #[test]
    fn test_render_reuses_attached_surfaces_and_recreates_detached() {
        let canvas = Arc::new(RecordingCanvas::with_nodes(&[(9, "Image Save"), (12, "SaveTextNode")]));
        let bridge = RenderBridge::new(canvas.clone(), RenderOptions::default());

        bridge.render(&payload());
        assert_eq!(canvas.created.lock().len(), 2);

        canvas.detached.lock().push(SurfaceHandle(1));
        bridge.render(&payload());
        assert_eq!(canvas.created.lock().len(), 3);

        bridge.on_graph_loaded();
        assert_eq!(bridge.cached_surfaces(), 0);
        bridge.render(&payload());
        assert_eq!(canvas.created.lock().len(), 5);
    }

    #[test]
    fn test_clear_and_options() {
        let canvas = Arc::new(RecordingCanvas::with_nodes(&[(12, "SaveTextNode")]));
        let bridge = RenderBridge::new(canvas.clone(), RenderOptions::default());
        bridge.render(&payload());

        bridge.clear(12);
        assert!(canvas.contents.lock()[&SurfaceHandle(1)].is_empty());

        bridge.set_options(Some(320), Some(0));
        assert_eq!(
            bridge.options(),
            RenderOptions {
                max_height: 320,
                columns: 2
            }
        );
        bridge.set_options(None, Some(3));
        assert_eq!(canvas.applied.lock().last().unwrap().columns, 3);

        bridge.clear_all();
        assert!(canvas.contents.lock().values().all(Vec::is_empty));
    }

    #[test]
    fn test_null_payload_renders_nothing() {
        let canvas = Arc::new(RecordingCanvas::default());
        let bridge = RenderBridge::new(canvas.clone(), RenderOptions::default());
        assert_eq!(bridge.render(&Value::Null), RenderSummary::default());
        assert_eq!(*canvas.redraws.lock(), 0);
    }
}
