//! Host graph seam and the graph translator
//!
//! The host editor owns the canvas and the graph model. This module only
//! consumes its "graph to prompt" primitive and never mutates the graph.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{GraphError, Result};
use crate::types::JobGraph;

/// Raw output of the host's graph-to-prompt primitive
#[derive(Debug, Clone, PartialEq)]
pub struct HostPrompt {
    /// API-format prompt (node id -> { class_type, inputs })
    pub output: Value,
    /// Editor-format workflow, kept for reloading the graph later
    pub workflow: Value,
}

/// Access to the host editor's graph
///
/// Implemented by whatever embeds this library (a webview bridge, a test
/// double, ...).
#[async_trait]
pub trait HostGraph: Send + Sync {
    /// Whether the host's translation primitive can currently be called
    fn is_available(&self) -> bool {
        true
    }

    /// Serialize the current graph into a prompt
    async fn graph_to_prompt(&self) -> Result<HostPrompt>;

    /// Replace the host's graph with a saved workflow
    async fn load_graph(&self, workflow: &Value) -> Result<()>;
}

/// Result of translating the host graph
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    /// Job nodes to submit
    pub job_graph: JobGraph,
    /// Snapshot of the editor-format workflow
    pub workflow_snapshot: Value,
}

/// Translate the host's current graph into a job payload
///
/// Has no side effects on the host graph.
pub async fn translate(host: &dyn HostGraph) -> Result<Translation> {
    if !host.is_available() {
        return Err(GraphError::host_unavailable(
            "graph-to-prompt primitive is not available",
        ));
    }

    let prompt = host.graph_to_prompt().await?;
    let job_graph = JobGraph::from_value(prompt.output)?;
    log::debug!("Translated host graph into {} job nodes", job_graph.len());

    Ok(Translation {
        job_graph,
        workflow_snapshot: prompt.workflow,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StaticHost {
        available: bool,
        prompt: HostPrompt,
    }

    #[async_trait]
    impl HostGraph for StaticHost {
        fn is_available(&self) -> bool {
            self.available
        }

        async fn graph_to_prompt(&self) -> Result<HostPrompt> {
            Ok(self.prompt.clone())
        }

        async fn load_graph(&self, _workflow: &Value) -> Result<()> {
            Ok(())
        }
    }

    fn prompt() -> HostPrompt {
        HostPrompt {
            output: json!({
                "1": {"class_type": "SaveImage", "inputs": {}},
                "2": {"class_type": "CheckpointLoaderSimple", "inputs": {}}
            }),
            workflow: json!({"nodes": [], "links": []}),
        }
    }

    #[tokio::test]
    async fn test_translate() {
        let host = StaticHost {
            available: true,
            prompt: prompt(),
        };

        let translation = translate(&host).await.unwrap();
        assert_eq!(translation.job_graph.len(), 2);
        assert_eq!(translation.workflow_snapshot, json!({"nodes": [], "links": []}));
    }

    #[tokio::test]
    async fn test_translate_host_unavailable() {
        let host = StaticHost {
            available: false,
            prompt: prompt(),
        };

        let err = translate(&host).await.unwrap_err();
        assert!(matches!(err, GraphError::HostUnavailable(_)));
    }

    #[tokio::test]
    async fn test_translate_bad_payload() {
        let host = StaticHost {
            available: true,
            prompt: HostPrompt {
                output: json!("not a graph"),
                workflow: Value::Null,
            },
        };

        let err = translate(&host).await.unwrap_err();
        assert!(matches!(err, GraphError::InvalidPayload(_)));
    }
}
