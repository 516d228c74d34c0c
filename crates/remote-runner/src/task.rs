//! Task records and status
//!
//! A task record is the durable representation of one submitted job and
//! its lifecycle. It is created as `Running` at submission time and
//! patched in place by every poll observation.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Lifecycle status of a remote task
///
/// The service reports both `0` and `-1` for failures; both decode to
/// `Failed`. `Running` is the only non-terminal known state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Running,
    Success,
    Failed,
    /// A code this client does not know; polling stops on it
    Unknown(i64),
}

impl TaskStatus {
    /// Decode a wire status code
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Running,
            4 => Self::Success,
            0 | -1 => Self::Failed,
            other => Self::Unknown(other),
        }
    }

    /// Wire status code
    pub fn code(&self) -> i64 {
        match self {
            Self::Running => 1,
            Self::Success => 4,
            Self::Failed => 0,
            Self::Unknown(code) => *code,
        }
    }

    /// Success or Failed: no further transitions occur
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_code(i64::deserialize(deserializer)?))
    }
}

/// Durable record of one submitted job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// Id assigned by the remote service
    #[serde(deserialize_with = "string_or_number")]
    pub task_id: String,
    /// Composite key used for every lookup and update
    pub full_task_id: String,
    pub status: TaskStatus,
    /// Milliseconds since the epoch
    pub created_at: i64,
    /// Milliseconds since the epoch, refreshed on every mutation
    pub updated_at: i64,
    #[serde(default)]
    pub image_results: Vec<String>,
    #[serde(default)]
    pub text_results: Vec<String>,
    #[serde(default)]
    pub error_reason: String,
    /// Raw status payload, kept for rendering and inspection
    #[serde(default)]
    pub origin: Option<Value>,
    /// Editor-format workflow that was submitted
    #[serde(default)]
    pub workflow_json: Option<Value>,
    /// Job graph that was submitted (media fields already resolved)
    #[serde(default)]
    pub api_json: Option<Value>,
}

impl TaskRecord {
    /// Create the record of a freshly submitted task
    pub fn running(
        task_id: impl Into<String>,
        full_task_id_prefix: &str,
        workflow_json: Value,
        api_json: Value,
    ) -> Self {
        let task_id = task_id.into();
        let now = now_millis();
        Self {
            full_task_id: format!("{}{}", full_task_id_prefix, task_id),
            task_id,
            status: TaskStatus::Running,
            created_at: now,
            updated_at: now,
            image_results: Vec::new(),
            text_results: Vec::new(),
            error_reason: String::new(),
            origin: None,
            workflow_json: Some(workflow_json),
            api_json: Some(api_json),
        }
    }

    /// Whether this task finished successfully and has a payload to render
    pub fn is_renderable(&self) -> bool {
        self.status == TaskStatus::Success && self.origin.is_some()
    }
}

/// One observation of a task's remote state
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub status: TaskStatus,
    pub image_results: Vec<String>,
    pub text_results: Vec<String>,
    pub error_reason: String,
    /// Entire status response
    pub origin: Value,
}

/// Partial update of a task record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub image_results: Option<Vec<String>>,
    pub text_results: Option<Vec<String>>,
    pub error_reason: Option<String>,
    pub origin: Option<Value>,
}

impl TaskPatch {
    /// Merge this patch into a record and refresh `updated_at`
    pub fn apply(self, record: &mut TaskRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(images) = self.image_results {
            record.image_results = images;
        }
        if let Some(texts) = self.text_results {
            record.text_results = texts;
        }
        if let Some(reason) = self.error_reason {
            record.error_reason = reason;
        }
        if let Some(origin) = self.origin {
            record.origin = Some(origin);
        }
        record.updated_at = now_millis().max(record.updated_at);
    }
}

impl From<StatusSnapshot> for TaskPatch {
    fn from(snapshot: StatusSnapshot) -> Self {
        Self {
            status: Some(snapshot.status),
            image_results: Some(snapshot.image_results),
            text_results: Some(snapshot.text_results),
            error_reason: Some(snapshot.error_reason),
            origin: Some(snapshot.origin),
        }
    }
}

/// Current time in milliseconds since the epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number task id, got {}",
            other
        ))),
    }
}
