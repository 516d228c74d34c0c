//! Workflow catalog
//!
//! Paged listing of ready-made workflows offered by the remote service,
//! cached per page for a fixed time-to-live.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use workflow_graph::HostGraph;

use crate::client::RemoteJobService;
use crate::constants::defaults;
use crate::error::Result;

/// Id of the catalog entry used when nothing else is selected
pub const DEFAULT_WORKFLOW_ID: &str = "defaultWorkflow";

/// One catalog workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub task_type: Option<String>,
    /// Editor-format workflow to load into the host
    #[serde(default)]
    pub workflow_json: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkflowEntry {
    /// Task type to submit with once this workflow is loaded
    ///
    /// The default workflow's placeholder type maps to the default task type.
    pub fn effective_task_type(&self) -> Option<String> {
        self.task_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| {
                if t == DEFAULT_WORKFLOW_ID {
                    defaults::TASK_TYPE.to_string()
                } else {
                    t.to_string()
                }
            })
    }
}

/// One page of the catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPage {
    pub list: Vec<WorkflowEntry>,
    pub total: u64,
}

#[derive(Debug, Clone)]
struct CachedPage {
    page: WorkflowPage,
    fetched_at: Instant,
}

pub struct WorkflowCatalog {
    service: Arc<dyn RemoteJobService>,
    ttl: Duration,
    pages: RwLock<BTreeMap<(u32, u32), CachedPage>>,
}

impl WorkflowCatalog {
    pub fn new(service: Arc<dyn RemoteJobService>, ttl: Duration) -> Self {
        Self {
            service,
            ttl,
            pages: RwLock::new(BTreeMap::new()),
        }
    }

    /// Fetch a page, answering from the cache while it is fresh
    pub async fn fetch_workflows(&self, page: u32, page_size: u32) -> Result<WorkflowPage> {
        let key = (page, page_size);
        let fresh = self
            .pages
            .read()
            .get(&key)
            .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
            .map(|cached| cached.page.clone());
        if let Some(page_data) = fresh {
            log::debug!("Catalog page {} (size {}) served from cache", page, page_size);
            return Ok(page_data);
        }

        let fetched = self.service.fetch_workflows(page, page_size).await?;
        log::info!(
            "Fetched catalog page {} ({} of {} workflows)",
            page,
            fetched.list.len(),
            fetched.total
        );

        self.pages.write().insert(
            key,
            CachedPage {
                page: fetched.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(fetched)
    }

    /// Drop every cached page
    pub fn clear_cache(&self) {
        self.pages.write().clear();
    }

    /// Every cached workflow, first occurrence of each id
    pub fn all_workflows(&self) -> Vec<WorkflowEntry> {
        let pages = self.pages.read();
        let mut seen = HashSet::new();
        pages
            .values()
            .flat_map(|cached| cached.page.list.iter())
            .filter(|w| seen.insert(w.id.clone()))
            .cloned()
            .collect()
    }

    /// Distinct task types of every cached workflow, sorted
    pub fn task_types(&self) -> Vec<String> {
        self.all_workflows()
            .into_iter()
            .filter_map(|w| w.task_type)
            .filter(|t| !t.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn default_workflow(&self) -> Option<WorkflowEntry> {
        self.all_workflows()
            .into_iter()
            .find(|w| w.id == DEFAULT_WORKFLOW_ID)
    }

    /// Cached workflows whose name or id contains `keyword` (case-insensitive)
    pub fn search(&self, keyword: &str) -> Vec<WorkflowEntry> {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            return self.all_workflows();
        }
        self.all_workflows()
            .into_iter()
            .filter(|w| {
                w.name.to_lowercase().contains(&keyword) || w.id.to_lowercase().contains(&keyword)
            })
            .collect()
    }

    /// Load a catalog workflow into the host graph
    ///
    /// Returns the task type to use for runs of this workflow, if it has one.
    pub async fn load_workflow(
        &self,
        host: &dyn HostGraph,
        workflow: &WorkflowEntry,
    ) -> Result<Option<String>> {
        host.load_graph(&workflow.workflow_json).await?;
        let task_type = workflow.effective_task_type();
        log::info!(
            "Loaded workflow '{}' (task type: {})",
            workflow.name,
            task_type.as_deref().unwrap_or("unchanged")
        );
        Ok(task_type)
    }
}
