//! Media uploader
//!
//! Promotes files referenced by loader nodes from the host's local file
//! server to remote CDN URLs, rewriting the job graph as it goes.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde_json::Value;
use workflow_graph::{find_media_references, JobGraph};

use crate::config::RunnerConfig;
use crate::constants::protocol;
use crate::error::{Result, RunnerError};
use crate::host::HostLocation;

/// Byte transport for media promotion
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Download a file from the host's file server
    async fn download(&self, url: &Url) -> Result<Vec<u8>>;

    /// Upload a file to remote storage, returning its CDN URL
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<String>;
}

/// reqwest-backed media transport
pub struct HttpMediaTransport {
    http_client: Client,
    upload_url: String,
}

impl HttpMediaTransport {
    pub fn new(config: &RunnerConfig) -> Result<Self> {
        let http_client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self::with_client(http_client, config))
    }

    pub fn with_client(http_client: Client, config: &RunnerConfig) -> Self {
        Self {
            http_client,
            upload_url: config.endpoints.upload_url.clone(),
        }
    }
}

#[async_trait]
impl MediaTransport for HttpMediaTransport {
    async fn download(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self.http_client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(RunnerError::Http {
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        log::debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }

    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<String> {
        let size = bytes.len();
        let form = Form::new()
            .text("inner", "true")
            .part("file", Part::bytes(bytes).file_name(filename.to_string()));

        let response = self
            .http_client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RunnerError::Http {
                status: response.status().as_u16(),
            });
        }

        let body: Value = response.json().await?;
        let cdn_url = decode_upload_response(&body)?;
        log::debug!("Uploaded '{}' ({} bytes) to {}", filename, size, cdn_url);
        Ok(cdn_url)
    }
}

/// Extract the CDN URL from an upload response
pub fn decode_upload_response(body: &Value) -> Result<String> {
    if body.get("code").and_then(Value::as_i64) != Some(protocol::CODE_OK) {
        let message = body
            .get("errorMsg")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or("Upload failed");
        return Err(RunnerError::InvalidResponse(message.to_string()));
    }

    body.get("cdnUrl")
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RunnerError::InvalidResponse("upload response has no cdnUrl".to_string()))
}

/// Rewrites media fields of a job graph to remote URLs
pub struct MediaUploader {
    transport: Arc<dyn MediaTransport>,
    location: HostLocation,
}

impl MediaUploader {
    pub fn new(transport: Arc<dyn MediaTransport>, location: HostLocation) -> Self {
        Self { transport, location }
    }

    /// Promote every referenced media file and rewrite its field
    ///
    /// Files are processed one at a time in node order. The graph is
    /// consumed: on failure it is dropped, so a partially rewritten
    /// payload can never reach the submission.
    pub async fn process_media_files(&self, mut graph: JobGraph) -> Result<JobGraph> {
        let references = find_media_references(&graph);
        if references.is_empty() {
            log::debug!("No media files to process");
            return Ok(graph);
        }

        log::info!(
            "Processing {} media file(s) via {}",
            references.len(),
            self.location.file_server()
        );

        for (index, reference) in references.iter().enumerate() {
            log::info!(
                "[{}/{}] node {} ({}): {}",
                index + 1,
                references.len(),
                reference.node_id,
                reference.class_type,
                reference.filename
            );

            let url = self
                .location
                .input_file_url(&reference.filename)
                .map_err(|e| RunnerError::media_upload(&reference.node_id, e))?;

            let bytes = self
                .transport
                .download(&url)
                .await
                .map_err(|e| RunnerError::media_upload(&reference.node_id, e))?;

            let cdn_url = self
                .transport
                .upload(bytes, &reference.filename)
                .await
                .map_err(|e| RunnerError::media_upload(&reference.node_id, e))?;

            graph.set_input(
                &reference.node_id,
                &reference.field_name,
                Value::String(cdn_url),
            );
        }

        log::info!("All media files processed");
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use workflow_graph::JobNode;

    /// Records every call; fails downloads of the named file
    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<String>>,
        fail_download_of: Option<String>,
    }

    #[async_trait]
    impl MediaTransport for RecordingTransport {
        async fn download(&self, url: &Url) -> Result<Vec<u8>> {
            let filename = url
                .query_pairs()
                .find(|(k, _)| k == "filename")
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default();
            self.calls.lock().push(format!("download:{}", filename));
            if self.fail_download_of.as_deref() == Some(filename.as_str()) {
                return Err(RunnerError::Http { status: 404 });
            }
            Ok(filename.into_bytes())
        }

        async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<String> {
            self.calls.lock().push(format!("upload:{}", filename));
            Ok(format!("https://cdn.example.com/{}", String::from_utf8_lossy(&bytes)))
        }
    }

    fn local() -> HostLocation {
        HostLocation::from_url("http://localhost:8188/").unwrap()
    }

    fn media_graph() -> JobGraph {
        let mut graph = JobGraph::new();
        graph.insert("10", JobNode::new("VHS_LoadVideo").with_input("video", "clip.mp4"));
        graph.insert("2", JobNode::new("LoadImage").with_input("image", "cat.png"));
        graph.insert("3", JobNode::new("LoadVideo").with_input("file", "dance.mp4"));
        graph.insert("4", JobNode::new("SaveImage"));
        graph
    }

    #[tokio::test]
    async fn test_no_media_is_identity_without_network() {
        let transport = Arc::new(RecordingTransport::default());
        let uploader = MediaUploader::new(transport.clone(), local());

        let mut graph = JobGraph::new();
        graph.insert("1", JobNode::new("SaveImage"));
        graph.insert("2", JobNode::new("CheckpointLoaderSimple"));

        let processed = uploader.process_media_files(graph.clone()).await.unwrap();
        assert_eq!(processed, graph);
        assert!(transport.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_rewrites_fields_sequentially_in_node_order() {
        let transport = Arc::new(RecordingTransport::default());
        let uploader = MediaUploader::new(transport.clone(), local());

        let processed = uploader.process_media_files(media_graph()).await.unwrap();

        assert_eq!(
            processed.get("2").unwrap().inputs["image"],
            json!("https://cdn.example.com/cat.png")
        );
        assert_eq!(
            processed.get("3").unwrap().inputs["file"],
            json!("https://cdn.example.com/dance.mp4")
        );
        assert_eq!(
            processed.get("10").unwrap().inputs["video"],
            json!("https://cdn.example.com/clip.mp4")
        );
        assert_eq!(
            *transport.calls.lock(),
            vec![
                "download:cat.png",
                "upload:cat.png",
                "download:dance.mp4",
                "upload:dance.mp4",
                "download:clip.mp4",
                "upload:clip.mp4",
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_mid_way_names_the_node_and_stops() {
        let transport = Arc::new(RecordingTransport {
            fail_download_of: Some("dance.mp4".to_string()),
            ..Default::default()
        });
        let uploader = MediaUploader::new(transport.clone(), local());

        let err = uploader.process_media_files(media_graph()).await.unwrap_err();
        match err {
            RunnerError::MediaUpload { node_id, cause } => {
                assert_eq!(node_id, "3");
                assert!(cause.contains("404"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!transport.calls.lock().iter().any(|c| c.contains("clip.mp4")));
    }

    #[test]
    fn test_decode_upload_response() {
        assert_eq!(
            decode_upload_response(&json!({"code": 1, "cdnUrl": "https://cdn/x.png"})).unwrap(),
            "https://cdn/x.png"
        );
        let err = decode_upload_response(&json!({"code": 0, "errorMsg": "too large"})).unwrap_err();
        assert!(err.to_string().contains("too large"));
        assert!(decode_upload_response(&json!({"code": 1})).is_err());
    }
}
