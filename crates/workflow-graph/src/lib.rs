//! Workflow Graph - job graph handling for remote workflow runs
//!
//! This crate turns the host editor's graph into a job-submission payload
//! and performs every check that can be made without touching the network:
//!
//! - Translation of the host graph into a `JobGraph` (via the `HostGraph` trait)
//! - Static validation (node count, output nodes, blocked nodes)
//! - Detection of media-bearing nodes that must be uploaded before submission
//!
//! # Example
//!
//! ```ignore
//! use workflow_graph::{translate, validate_job_graph};
//!
//! let translation = translate(&host).await?;
//! let report = validate_job_graph(&translation.job_graph);
//! if !report.is_valid {
//!     for error in &report.errors {
//!         eprintln!("{error}");
//!     }
//! }
//! ```

pub mod error;
pub mod host;
pub mod media;
pub mod types;
pub mod validation;

pub use error::{GraphError, Result};
pub use host::{translate, HostGraph, HostPrompt, Translation};
pub use media::{find_media_references, input_params, InputParam, MediaKind, MediaReference};
pub use types::{JobGraph, JobNode, NodeId};
pub use validation::{
    validate_job_graph, BlockedNode, ValidationError, ValidationReport, BLOCKED_NODE_PATTERNS,
    OUTPUT_NODE_TYPES,
};
