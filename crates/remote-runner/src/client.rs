//! Remote task service client
//!
//! `RemoteJobService` is the seam every networked component talks to.
//! `HttpJobService` is the reqwest implementation; the response decoding
//! lives in free functions so it can be tested without a server.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use workflow_graph::{InputParam, JobGraph};

use crate::catalog::{WorkflowEntry, WorkflowPage};
use crate::config::{EndpointConfig, RunnerConfig};
use crate::constants::protocol;
use crate::error::{Result, RunnerError};
use crate::store::parse_seed_document;
use crate::task::{StatusSnapshot, TaskRecord, TaskStatus};

/// Body of a job submission
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub workflow_json: Value,
    pub api_json: JobGraph,
    pub input_params: Vec<InputParam>,
    pub image_input_source_type: i64,
    pub image_result_source_type: i64,
    pub task_type: String,
    pub biz_token: String,
}

/// Operations offered by the remote task service
#[async_trait]
pub trait RemoteJobService: Send + Sync {
    /// Submit a job, returning the remote task id
    async fn submit(&self, request: &SubmitRequest) -> Result<String>;

    /// Query a task's status
    ///
    /// `Ok(None)` means the service has no usable record yet.
    async fn query_status(&self, full_task_id: &str) -> Result<Option<StatusSnapshot>>;

    /// Fetch the document used to seed an empty task store
    async fn fetch_seed_tasks(&self) -> Result<Vec<TaskRecord>>;

    /// Fetch one page of the workflow catalog
    async fn fetch_workflows(&self, page: u32, page_size: u32) -> Result<WorkflowPage>;
}

/// reqwest-backed remote task service
pub struct HttpJobService {
    http_client: Client,
    endpoints: EndpointConfig,
    status_source: i64,
}

impl HttpJobService {
    pub fn new(config: &RunnerConfig) -> Result<Self> {
        let http_client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self::with_client(http_client, config))
    }

    /// Use an existing client (shared connection pool)
    pub fn with_client(http_client: Client, config: &RunnerConfig) -> Self {
        Self {
            http_client,
            endpoints: config.endpoints.clone(),
            status_source: config.protocol.status_source,
        }
    }

    async fn read_json(response: reqwest::Response) -> Result<Value> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            log::warn!("Remote service answered HTTP {}", status);
            return Err(RunnerError::Http { status });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl RemoteJobService for HttpJobService {
    async fn submit(&self, request: &SubmitRequest) -> Result<String> {
        log::info!(
            "Submitting job ({} nodes, {} input params, task type '{}')",
            request.api_json.len(),
            request.input_params.len(),
            request.task_type
        );

        let response = self
            .http_client
            .post(&self.endpoints.submit_url)
            .json(request)
            .send()
            .await?;

        let body = Self::read_json(response).await?;
        decode_submit_response(&body)
    }

    async fn query_status(&self, full_task_id: &str) -> Result<Option<StatusSnapshot>> {
        let response = self
            .http_client
            .post(&self.endpoints.status_url)
            .json(&json!({ "id": full_task_id, "source": self.status_source }))
            .send()
            .await
            .map_err(|e| status_query_error(full_task_id, e.into()))?;

        let body = Self::read_json(response)
            .await
            .map_err(|e| status_query_error(full_task_id, e))?;
        Ok(decode_status_response(body))
    }

    async fn fetch_seed_tasks(&self) -> Result<Vec<TaskRecord>> {
        let Some(url) = self.endpoints.seed_tasks_url.as_deref() else {
            return Ok(Vec::new());
        };

        log::info!("Fetching seed tasks from {}", url);
        let response = self.http_client.get(url).send().await?;
        let body = Self::read_json(response).await?;
        Ok(parse_seed_document(body))
    }

    async fn fetch_workflows(&self, page: u32, page_size: u32) -> Result<WorkflowPage> {
        let response = self
            .http_client
            .post(&self.endpoints.catalog_url)
            .header(protocol::CATALOG_TOKEN_HEADER, &self.endpoints.catalog_token)
            .json(&json!({ "page": page, "pageSize": page_size }))
            .send()
            .await?;

        let body = Self::read_json(response).await?;
        decode_workflow_page(body)
    }
}

/// Extract the task id from a submission response
pub fn decode_submit_response(body: &Value) -> Result<String> {
    if body.get("code").and_then(Value::as_i64) != Some(protocol::CODE_OK) {
        let message = body
            .get("errorMsg")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or("Task submission failed")
            .to_string();
        return Err(RunnerError::SubmissionRejected { message });
    }

    match body.pointer("/result/workflowMessage/id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(RunnerError::InvalidResponse(
            "submission response has no result.workflowMessage.id".to_string(),
        )),
    }
}

/// Fold a retryable status-query failure into `StatusQueryTransient`
pub fn status_query_error(full_task_id: &str, err: RunnerError) -> RunnerError {
    if err.is_transient() {
        RunnerError::StatusQueryTransient(format!("{}: {}", full_task_id, err))
    } else {
        err
    }
}

/// Decode a status response into a snapshot
///
/// Returns `None` unless the application code is the status success code
/// and at least one resource is present.
pub fn decode_status_response(body: Value) -> Option<StatusSnapshot> {
    if body.get("code").and_then(Value::as_i64) != Some(protocol::STATUS_CODE_OK) {
        return None;
    }

    let resource = body
        .get("design_ai_resources")
        .and_then(Value::as_array)
        .and_then(|resources| resources.first())?;

    let status = TaskStatus::from_code(resource.get("status").and_then(Value::as_i64)?);
    let image_results = string_fields(resource.get("design_ai_resource_items"), "image_url_big");
    let text_results = string_fields(resource.get("design_ai_text_resource_items"), "text");
    let error_reason = resource
        .get("error_reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(StatusSnapshot {
        status,
        image_results,
        text_results,
        error_reason,
        origin: body,
    })
}

/// Decode a workflow catalog page
pub fn decode_workflow_page(body: Value) -> Result<WorkflowPage> {
    #[derive(Deserialize)]
    struct PageData {
        #[serde(default)]
        list: Vec<WorkflowEntry>,
        #[serde(default)]
        total: u64,
    }

    let code = body.get("code").and_then(Value::as_i64);
    match body.get("data") {
        Some(data) if code == Some(protocol::CODE_OK) && !data.is_null() => {
            let page: PageData = serde_json::from_value(data.clone())?;
            Ok(WorkflowPage {
                list: page.list,
                total: page.total,
            })
        }
        _ => match body.get("errorMsg").and_then(Value::as_str) {
            Some(message) if !message.is_empty() => Err(RunnerError::CatalogRejected {
                message: message.to_string(),
            }),
            _ => Err(RunnerError::InvalidResponse(
                "Invalid response format".to_string(),
            )),
        },
    }
}

fn string_fields(items: Option<&Value>, field: &str) -> Vec<String> {
    items
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(field).and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
