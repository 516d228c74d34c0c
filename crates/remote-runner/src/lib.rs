//! Remote Runner - run host workflows on a remote job service
//!
//! This crate drives a workflow run from the host editor to the remote
//! service and back:
//!
//! - Submission: translate, validate, upload media, submit (`JobSubmitter`)
//! - Task bookkeeping with a bounded, persisted task list (`TaskStore`)
//! - Concurrent status polling with cancellation (`poll`, `spawn_poller`)
//! - Rendering finished results into host output nodes (`RenderBridge`)
//! - Workflow catalog browsing with a TTL cache (`WorkflowCatalog`)
//!
//! # Architecture
//!
//! `RunCoordinator` owns the control flow and talks to the outside world
//! only through traits:
//!
//! - `HostGraph` / `HostCanvas`: the host editor
//! - `RemoteJobService` / `MediaTransport`: the remote service (HTTP by default)
//! - `EventSink`: progress notifications for a UI
//!
//! # Example
//!
//! ```ignore
//! use remote_runner::{RunCoordinator, RunnerConfig};
//!
//! let config = RunnerConfig::load(&data_dir).await?;
//! let runner = RunCoordinator::connect(&config, &data_dir, host, canvas, location, events)?;
//! runner.resume_pending();
//! let task = runner.submit(None).await?;
//! ```

pub mod catalog;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod host;
pub mod intercept;
pub mod media;
pub mod poller;
pub mod render;
pub mod runner;
pub mod store;
pub mod submission;
pub mod task;

// Re-export key types
pub use catalog::{WorkflowCatalog, WorkflowEntry, WorkflowPage};
pub use client::{HttpJobService, RemoteJobService, SubmitRequest};
pub use config::{ConfigError, RunnerConfig};
pub use error::{Result, RunnerError};
pub use events::{EventSink, NullEventSink, RunnerEvent, VecEventSink};
pub use host::HostLocation;
pub use intercept::{InterceptPolicy, QueueInterceptMode, RunRoute, UserChoice};
pub use media::{HttpMediaTransport, MediaTransport, MediaUploader};
pub use poller::{poll, spawn_poller, PollConfig, PollOutcome};
pub use render::{HostCanvas, RenderBridge, RenderOptions, RenderSummary};
pub use runner::{RunCoordinator, RunnerParts};
pub use store::{JsonTaskStore, MemoryTaskStore, StoreError, TaskStore};
pub use submission::JobSubmitter;
pub use task::{StatusSnapshot, TaskRecord, TaskStatus};

// Re-export the graph types that consumers implement against
pub use workflow_graph::{HostGraph, HostPrompt};
