//! Error types for remote runs

use thiserror::Error;
use workflow_graph::{GraphError, ValidationError};

use crate::store::StoreError;

/// Result type alias using RunnerError
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Errors that can occur while submitting, polling or rendering a remote run
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The host graph could not be read
    #[error("Host unavailable: {0}")]
    HostUnavailable(String),

    /// No graph translator is attached to the submitter
    #[error("Graph translator unavailable")]
    TranslatorUnavailable,

    /// Static validation rejected the job graph
    #[error("Workflow validation failed: {}", summarize(.errors))]
    ValidationFailed { errors: Vec<ValidationError> },

    /// A media file could not be promoted to a remote URL
    #[error("Failed to process media file (node {node_id}): {cause}")]
    MediaUpload { node_id: String, cause: String },

    /// The remote service answered with a non-2xx status
    #[error("HTTP error! status: {status}")]
    Http { status: u16 },

    /// The remote service refused the submission
    #[error("Submission rejected: {message}")]
    SubmissionRejected { message: String },

    /// The workflow catalog refused the request
    #[error("Workflow catalog error: {message}")]
    CatalogRejected { message: String },

    /// A status query produced nothing usable; retried by the poller
    #[error("Status query failed: {0}")]
    StatusQueryTransient(String),

    /// New submissions are refused while tasks are still running
    #[error("{count} task(s) still running; wait for them or delete them first")]
    TasksStillRunning { count: usize },

    /// No stored task has this id
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// The task has no finished result to render
    #[error("Task {0} has no result to render")]
    NotRenderable(String),

    /// The remote service answered with an unexpected body
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Network / client failure
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Task store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RunnerError {
    /// Create a media upload error for a node
    pub fn media_upload(node_id: impl Into<String>, cause: impl ToString) -> Self {
        Self::MediaUpload {
            node_id: node_id.into(),
            cause: cause.to_string(),
        }
    }

    /// User-facing advice for errors that have a known fix
    pub fn guidance(&self) -> Option<String> {
        match self {
            Self::MediaUpload { cause, .. } => Some(format!(
                "Media file upload failed.\n\nDetails: {}\n\nPossible causes:\n\
                 - the image or video file is corrupted\n\
                 - the file format is not supported\n\
                 - network connection problems\n\
                 - the file exceeds the size limit\n\n\
                 Check your input files and try again.",
                cause
            )),
            Self::ValidationFailed { errors } => Some(
                errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            ),
            Self::TasksStillRunning { .. } => Some(self.to_string()),
            _ => None,
        }
    }

    /// Whether the poller should retry after this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StatusQueryTransient(_) | Self::Transport(_) | Self::Http { .. } | Self::InvalidResponse(_)
        )
    }
}

impl From<GraphError> for RunnerError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::HostUnavailable(msg) => Self::HostUnavailable(msg),
            GraphError::InvalidPayload(msg) => Self::InvalidResponse(msg),
            GraphError::Serialization(e) => Self::Serialization(e),
        }
    }
}

fn summarize(errors: &[ValidationError]) -> String {
    let kinds: Vec<&str> = errors
        .iter()
        .map(|e| match e {
            ValidationError::InsufficientNodes { .. } => "insufficient nodes",
            ValidationError::NoOutputNode { .. } => "no output node",
            ValidationError::BlockedNode { .. } => "blocked node",
        })
        .collect();
    kinds.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_every_rule() {
        let err = RunnerError::ValidationFailed {
            errors: vec![
                ValidationError::InsufficientNodes {
                    node_count: 1,
                    minimum_required: 2,
                },
                ValidationError::NoOutputNode {
                    supported_nodes: vec!["SaveImage".to_string()],
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "Workflow validation failed: insufficient nodes, no output node"
        );
        assert!(err.guidance().unwrap().contains("SaveImage"));
    }

    #[test]
    fn test_media_upload_guidance_names_cause() {
        let err = RunnerError::media_upload("7", "HTTP error! status: 404");
        assert_eq!(
            err.to_string(),
            "Failed to process media file (node 7): HTTP error! status: 404"
        );
        assert!(err.guidance().unwrap().contains("status: 404"));
    }

    #[test]
    fn test_host_unavailable_from_graph_error() {
        let err: RunnerError = GraphError::host_unavailable("no app").into();
        assert!(matches!(err, RunnerError::HostUnavailable(_)));
        assert!(!err.is_transient());
    }
}
