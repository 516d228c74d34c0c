//! Job submission
//!
//! Translate, validate, promote media, submit. Each step surfaces its own
//! error and nothing reaches the network unless every earlier step passed.
//! Persisting the returned record is the caller's job.

use std::sync::Arc;

use workflow_graph::{input_params, translate, validate_job_graph, HostGraph};

use crate::client::{RemoteJobService, SubmitRequest};
use crate::config::ProtocolConfig;
use crate::error::{Result, RunnerError};
use crate::media::MediaUploader;
use crate::task::TaskRecord;

pub struct JobSubmitter {
    host: Option<Arc<dyn HostGraph>>,
    uploader: MediaUploader,
    service: Arc<dyn RemoteJobService>,
    protocol: ProtocolConfig,
}

impl JobSubmitter {
    pub fn new(
        host: Option<Arc<dyn HostGraph>>,
        uploader: MediaUploader,
        service: Arc<dyn RemoteJobService>,
        protocol: ProtocolConfig,
    ) -> Self {
        Self {
            host,
            uploader,
            service,
            protocol,
        }
    }

    /// Submit the host's current graph as a remote job
    pub async fn submit(&self, task_type: &str) -> Result<TaskRecord> {
        let host = match &self.host {
            Some(host) if host.is_available() => host,
            _ => return Err(RunnerError::TranslatorUnavailable),
        };

        let translation = translate(host.as_ref()).await?;
        log::info!("Step 1: translated {} job nodes", translation.job_graph.len());

        let report = validate_job_graph(&translation.job_graph);
        if !report.is_valid {
            log::warn!("Step 2: validation failed with {} error(s)", report.errors.len());
            return Err(RunnerError::ValidationFailed {
                errors: report.errors,
            });
        }
        log::info!("Step 2: validation passed");

        let api_json = self
            .uploader
            .process_media_files(translation.job_graph)
            .await
            .inspect_err(|e| log::error!("Step 3: media processing failed: {}", e))?;
        log::info!("Step 3: media processed");

        let request = SubmitRequest {
            workflow_json: translation.workflow_snapshot,
            input_params: input_params(&api_json),
            api_json,
            image_input_source_type: self.protocol.image_input_source_type,
            image_result_source_type: self.protocol.image_result_source_type,
            task_type: task_type.to_string(),
            biz_token: self.protocol.biz_token.clone(),
        };

        let task_id = self.service.submit(&request).await?;
        log::info!("Step 4: job accepted as task {}", task_id);

        let SubmitRequest {
            workflow_json,
            api_json,
            ..
        } = request;
        Ok(TaskRecord::running(
            task_id,
            &self.protocol.full_task_id_prefix,
            workflow_json,
            api_json.to_value()?,
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::WorkflowPage;
    use crate::host::HostLocation;
    use crate::media::MediaTransport;
    use crate::task::{StatusSnapshot, TaskStatus};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::Url;
    use serde_json::{json, Value};
    use workflow_graph::{HostPrompt, ValidationError};

    /// Host serving a fixed prompt and recording loaded workflows
    pub(crate) struct FakeHost {
        pub available: bool,
        pub output: Value,
        pub loaded: Mutex<Vec<Value>>,
    }

    impl FakeHost {
        pub(crate) fn new(output: Value) -> Self {
            Self {
                available: true,
                output,
                loaded: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HostGraph for FakeHost {
        fn is_available(&self) -> bool {
            self.available
        }

        async fn graph_to_prompt(&self) -> workflow_graph::Result<HostPrompt> {
            Ok(HostPrompt {
                output: self.output.clone(),
                workflow: json!({"nodes": [], "links": []}),
            })
        }

        async fn load_graph(&self, workflow: &Value) -> workflow_graph::Result<()> {
            self.loaded.lock().push(workflow.clone());
            Ok(())
        }
    }

    /// Service that accepts every submission and records the requests
    #[derive(Default)]
    pub(crate) struct AcceptingService {
        pub submitted: Mutex<Vec<SubmitRequest>>,
        pub reject_with: Option<String>,
    }

    #[async_trait]
    impl RemoteJobService for AcceptingService {
        async fn submit(&self, request: &SubmitRequest) -> Result<String> {
            if let Some(message) = &self.reject_with {
                return Err(RunnerError::SubmissionRejected {
                    message: message.clone(),
                });
            }
            self.submitted.lock().push(request.clone());
            Ok("12345".to_string())
        }

        async fn query_status(&self, _full_task_id: &str) -> Result<Option<StatusSnapshot>> {
            Ok(Some(StatusSnapshot {
                status: TaskStatus::Running,
                image_results: vec![],
                text_results: vec![],
                error_reason: String::new(),
                origin: json!({}),
            }))
        }

        async fn fetch_seed_tasks(&self) -> Result<Vec<TaskRecord>> {
            Ok(Vec::new())
        }

        async fn fetch_workflows(&self, _page: u32, _page_size: u32) -> Result<WorkflowPage> {
            Ok(WorkflowPage::default())
        }
    }

    pub(crate) struct EchoTransport;

    #[async_trait]
    impl MediaTransport for EchoTransport {
        async fn download(&self, _url: &Url) -> Result<Vec<u8>> {
            Ok(b"bytes".to_vec())
        }

        async fn upload(&self, _bytes: Vec<u8>, filename: &str) -> Result<String> {
            Ok(format!("https://cdn.example.com/{}", filename))
        }
    }

    /// Transport whose uploads are refused by the CDN
    pub(crate) struct FailingTransport;

    #[async_trait]
    impl MediaTransport for FailingTransport {
        async fn download(&self, _url: &Url) -> Result<Vec<u8>> {
            Ok(b"bytes".to_vec())
        }

        async fn upload(&self, _bytes: Vec<u8>, _filename: &str) -> Result<String> {
            Err(RunnerError::Http { status: 413 })
        }
    }

    pub(crate) fn uploader() -> MediaUploader {
        MediaUploader::new(
            Arc::new(EchoTransport),
            HostLocation::from_url("http://localhost:8188/").unwrap(),
        )
    }

    fn submitter(host: Option<Arc<dyn HostGraph>>, service: Arc<AcceptingService>) -> JobSubmitter {
        JobSubmitter::new(host, uploader(), service, ProtocolConfig::default())
    }

    #[tokio::test]
    async fn test_submit_builds_request_and_running_record() {
        let host = Arc::new(FakeHost::new(json!({
            "1": {"class_type": "SaveImage", "inputs": {}},
            "2": {"class_type": "LoadImage", "inputs": {"image": "cat.png"}}
        })));
        let service = Arc::new(AcceptingService::default());

        let record = submitter(Some(host), service.clone())
            .submit("wanVideo")
            .await
            .unwrap();

        assert_eq!(record.task_id, "12345");
        assert_eq!(record.full_task_id, "30_12345");
        assert_eq!(record.status, TaskStatus::Running);
        assert!(record.image_results.is_empty());
        assert_eq!(
            record.api_json.as_ref().unwrap()["2"]["inputs"]["image"],
            "https://cdn.example.com/cat.png"
        );

        let submitted = service.submitted.lock();
        assert_eq!(submitted.len(), 1);
        let request = &submitted[0];
        assert_eq!(request.task_type, "wanVideo");
        assert_eq!(request.biz_token, "comfyUIToken");
        assert_eq!(request.input_params.len(), 1);
        assert_eq!(request.input_params[0].api_json_key, "2");
        assert_eq!(request.input_params[0].node_param, "https://cdn.example.com/cat.png");
    }

    #[tokio::test]
    async fn test_validation_failure_makes_no_network_call() {
        let host = Arc::new(FakeHost::new(json!({
            "1": {"class_type": "easy blocker", "inputs": {}}
        })));
        let service = Arc::new(AcceptingService::default());

        let err = submitter(Some(host), service.clone())
            .submit("wanVideo")
            .await
            .unwrap_err();

        match err {
            RunnerError::ValidationFailed { errors } => {
                assert_eq!(errors.len(), 3);
                assert!(errors
                    .iter()
                    .any(|e| matches!(e, ValidationError::BlockedNode { .. })));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(service.submitted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_or_unavailable_translator() {
        let service = Arc::new(AcceptingService::default());
        let err = submitter(None, service.clone()).submit("wanVideo").await.unwrap_err();
        assert!(matches!(err, RunnerError::TranslatorUnavailable));

        let mut host = FakeHost::new(json!({}));
        host.available = false;
        let err = submitter(Some(Arc::new(host)), service)
            .submit("wanVideo")
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::TranslatorUnavailable));
    }

    #[tokio::test]
    async fn test_rejection_is_surfaced() {
        let host = Arc::new(FakeHost::new(json!({
            "1": {"class_type": "SaveImage", "inputs": {}},
            "2": {"class_type": "CheckpointLoaderSimple", "inputs": {}}
        })));
        let service = Arc::new(AcceptingService {
            reject_with: Some("invalid task type".to_string()),
            ..Default::default()
        });

        let err = submitter(Some(host), service).submit("nope").await.unwrap_err();
        assert!(matches!(err, RunnerError::SubmissionRejected { .. }));
    }

    #[tokio::test]
    async fn test_media_failure_stops_before_submission() {
        let host = Arc::new(FakeHost::new(json!({
            "1": {"class_type": "SaveImage", "inputs": {}},
            "2": {"class_type": "LoadImage", "inputs": {"image": "cat.png"}}
        })));
        let service = Arc::new(AcceptingService::default());
        let failing = MediaUploader::new(
            Arc::new(FailingTransport),
            HostLocation::from_url("http://localhost:8188/").unwrap(),
        );

        let err = JobSubmitter::new(Some(host), failing, service.clone(), ProtocolConfig::default())
            .submit("wanVideo")
            .await
            .unwrap_err();

        match &err {
            RunnerError::MediaUpload { node_id, cause } => {
                assert_eq!(node_id, "2");
                assert!(cause.contains("413"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.guidance().is_some());
        assert!(service.submitted.lock().is_empty());
    }
}
