//! Event types for remote run progress
//!
//! Events are sent from the coordinator to the UI (or any consumer) to
//! report task list changes, poll observations and render results.

use serde::{Deserialize, Serialize};

use crate::render::RenderSummary;
use crate::task::TaskRecord;

/// Trait for sending runner events
///
/// This abstracts over the transport to the UI layer, allowing the
/// coordinator to be used without one.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be delivered (e.g., channel closed)
    fn send(&self, event: RunnerEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

/// Events emitted while running workflows remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunnerEvent {
    /// A submission was accepted and stored
    #[serde(rename_all = "camelCase")]
    TaskAdded { task: TaskRecord },

    /// A poll observation was merged into a stored task
    #[serde(rename_all = "camelCase")]
    TaskUpdated { task: TaskRecord },

    /// Results of a task were rendered into the host graph
    #[serde(rename_all = "camelCase")]
    TaskRendered {
        full_task_id: String,
        summary: RenderSummary,
    },

    /// A task was deleted by the user
    #[serde(rename_all = "camelCase")]
    TaskDeleted { full_task_id: String },

    /// The poll budget ran out while the task was still running
    #[serde(rename_all = "camelCase")]
    PollingExhausted { full_task_id: String, attempts: u32 },

    /// A submission was aborted before anything was stored
    #[serde(rename_all = "camelCase")]
    SubmissionFailed {
        error: String,
        guidance: Option<String>,
    },
}

impl RunnerEvent {
    /// Full task id the event refers to, if any
    pub fn full_task_id(&self) -> Option<&str> {
        match self {
            Self::TaskAdded { task } | Self::TaskUpdated { task } => Some(&task.full_task_id),
            Self::TaskRendered { full_task_id, .. }
            | Self::TaskDeleted { full_task_id }
            | Self::PollingExhausted { full_task_id, .. } => Some(full_task_id),
            Self::SubmissionFailed { .. } => None,
        }
    }
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: RunnerEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: parking_lot::Mutex<Vec<RunnerEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<RunnerEvent> {
        self.events.lock().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: RunnerEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}
