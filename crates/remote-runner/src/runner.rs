//! Run coordinator
//!
//! Owns the remote-run control flow: submission, task bookkeeping, one
//! poll session per running task, and rendering of finished results.
//!
//! ```text
//! submit ──► TaskStore::add ──► TaskAdded
//!              │
//!              └─► poll session ──► TaskStore::update ──► TaskUpdated
//!                        │
//!                        ├─ Success ──► RenderBridge::render ──► TaskRendered
//!                        └─ budget spent ──► PollingExhausted
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use workflow_graph::HostGraph;

use crate::catalog::{WorkflowCatalog, WorkflowEntry};
use crate::client::{HttpJobService, RemoteJobService};
use crate::config::{ConfigError, RunnerConfig};
use crate::error::{Result, RunnerError};
use crate::events::{EventSink, RunnerEvent};
use crate::host::HostLocation;
use crate::intercept::{InterceptPolicy, RunRoute, UserChoice};
use crate::media::{HttpMediaTransport, MediaTransport, MediaUploader};
use crate::poller::{poll, PollConfig, PollOutcome};
use crate::render::{CanvasNodeId, HostCanvas, RenderBridge, RenderOptions, RenderSummary};
use crate::store::{JsonTaskStore, TaskStore};
use crate::submission::JobSubmitter;
use crate::task::{StatusSnapshot, TaskRecord, TaskStatus};

/// A live poll session
struct PollerHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Collaborators a coordinator is built from
pub struct RunnerParts {
    pub host: Option<Arc<dyn HostGraph>>,
    pub location: HostLocation,
    pub service: Arc<dyn RemoteJobService>,
    pub transport: Arc<dyn MediaTransport>,
    pub store: Arc<dyn TaskStore>,
    pub events: Arc<dyn EventSink>,
    pub renderer: Option<Arc<RenderBridge>>,
    /// Directory holding `runner.json`; settings changes are not persisted without it
    pub data_dir: Option<PathBuf>,
}

pub struct RunCoordinator {
    host: Option<Arc<dyn HostGraph>>,
    submitter: JobSubmitter,
    service: Arc<dyn RemoteJobService>,
    store: Arc<dyn TaskStore>,
    events: Arc<dyn EventSink>,
    renderer: Option<Arc<RenderBridge>>,
    catalog: WorkflowCatalog,
    poll_config: PollConfig,
    task_type: RwLock<String>,
    intercept: Mutex<InterceptPolicy>,
    auto_loaded_workflow: AtomicBool,
    data_dir: Option<PathBuf>,
    /// Held for the whole of a submission so the running-task guard holds
    submission: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    pollers: Mutex<HashMap<String, PollerHandle>>,
}

impl RunCoordinator {
    pub fn new(config: &RunnerConfig, parts: RunnerParts) -> Self {
        let uploader = MediaUploader::new(parts.transport, parts.location);
        let submitter = JobSubmitter::new(
            parts.host.clone(),
            uploader,
            parts.service.clone(),
            config.protocol.clone(),
        );

        Self {
            host: parts.host,
            submitter,
            catalog: WorkflowCatalog::new(parts.service.clone(), config.catalog_ttl()),
            service: parts.service,
            store: parts.store,
            events: parts.events,
            renderer: parts.renderer,
            poll_config: config.poll.clone(),
            task_type: RwLock::new(config.default_task_type.clone()),
            intercept: Mutex::new(InterceptPolicy::new(
                config.intercept_mode,
                config.intercept_disabled,
            )),
            auto_loaded_workflow: AtomicBool::new(config.auto_loaded_workflow),
            data_dir: parts.data_dir,
            submission: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
            pollers: Mutex::new(HashMap::new()),
        }
    }

    /// Build a coordinator talking to the configured HTTP endpoints
    ///
    /// Tasks persist under `data_dir`.
    pub fn connect(
        config: &RunnerConfig,
        data_dir: &Path,
        host: Arc<dyn HostGraph>,
        canvas: Arc<dyn HostCanvas>,
        location: HostLocation,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let store = JsonTaskStore::open(RunnerConfig::tasks_path(data_dir), config.max_tasks)?;
        let parts = RunnerParts {
            host: Some(host),
            location,
            service: Arc::new(HttpJobService::new(config)?),
            transport: Arc::new(HttpMediaTransport::new(config)?),
            store: Arc::new(store),
            events,
            renderer: Some(Arc::new(RenderBridge::new(canvas, config.render.clone()))),
            data_dir: Some(data_dir.to_path_buf()),
        };
        Ok(Self::new(config, parts))
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Route a run intent coming from the host
    pub fn run_intent(&self) -> RunRoute {
        self.intercept.lock().decide()
    }

    /// Route a run intent after the user answered the prompt
    pub fn resolve_run_choice(&self, choice: UserChoice, dont_ask_again: bool) -> RunRoute {
        self.intercept.lock().resolve(choice, dont_ask_again)
    }

    /// Current interception policy, for persisting the opt-out flag
    pub fn intercept_policy(&self) -> InterceptPolicy {
        *self.intercept.lock()
    }

    pub fn task_type(&self) -> String {
        self.task_type.read().clone()
    }

    pub fn set_task_type(&self, task_type: impl Into<String>) {
        *self.task_type.write() = task_type.into();
    }

    /// Submit the host's current graph and start polling it
    ///
    /// Refused while any stored task is still running. A failed submission
    /// stores nothing.
    pub async fn submit(&self, task_type: Option<&str>) -> Result<TaskRecord> {
        let _submitting = self.submission.lock().await;

        let running = self.store.running().len();
        if running > 0 {
            return Err(RunnerError::TasksStillRunning { count: running });
        }

        let task_type = task_type
            .map(str::to_string)
            .unwrap_or_else(|| self.task_type());

        let record = match self.submitter.submit(&task_type).await {
            Ok(record) => record,
            Err(e) => {
                log::error!("Submission failed: {}", e);
                emit(
                    self.events.as_ref(),
                    RunnerEvent::SubmissionFailed {
                        error: e.to_string(),
                        guidance: e.guidance(),
                    },
                );
                return Err(e);
            }
        };

        self.store.add(record.clone())?;
        emit(
            self.events.as_ref(),
            RunnerEvent::TaskAdded {
                task: record.clone(),
            },
        );
        self.start_polling(record.full_task_id.clone());
        Ok(record)
    }

    // =========================================================================
    // Polling
    // =========================================================================

    /// Start polling every stored task that is still running
    ///
    /// Returns the number of poll sessions started.
    pub fn resume_pending(&self) -> usize {
        let running = self.store.running();
        for task in &running {
            log::info!("Resuming poll of running task {}", task.full_task_id);
            self.start_polling(task.full_task_id.clone());
        }
        running.len()
    }

    fn start_polling(&self, full_task_id: String) {
        let cancel = self.shutdown.child_token();
        let session = PollSession {
            full_task_id: full_task_id.clone(),
            service: self.service.clone(),
            store: self.store.clone(),
            events: self.events.clone(),
            renderer: self.renderer.clone(),
            config: self.poll_config.clone(),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(session.run());

        let mut pollers = self.pollers.lock();
        pollers.retain(|_, poller| !poller.handle.is_finished());
        if let Some(previous) = pollers.insert(full_task_id, PollerHandle { cancel, handle }) {
            previous.cancel.cancel();
        }
    }

    fn stop_polling(&self, full_task_id: &str) {
        if let Some(poller) = self.pollers.lock().remove(full_task_id) {
            poller.cancel.cancel();
        }
    }

    /// Number of poll sessions still running
    pub fn active_pollers(&self) -> usize {
        self.pollers
            .lock()
            .values()
            .filter(|p| !p.handle.is_finished())
            .count()
    }

    /// Wait until every poll session started so far has ended
    pub async fn wait_for_pollers(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .pollers
            .lock()
            .drain()
            .map(|(_, poller)| poller.handle)
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                log::error!("Poll session panicked: {}", e);
            }
        }
    }

    /// Cancel every poll session
    pub fn shutdown(&self) {
        log::info!("Stopping {} poll session(s)", self.active_pollers());
        self.shutdown.cancel();
    }

    // =========================================================================
    // Task list
    // =========================================================================

    pub fn tasks(&self) -> Vec<TaskRecord> {
        self.store.list()
    }

    pub fn task(&self, full_task_id: &str) -> Option<TaskRecord> {
        self.store.get(full_task_id)
    }

    /// Delete a task, stopping its poll session
    pub fn delete_task(&self, full_task_id: &str) -> Result<()> {
        self.stop_polling(full_task_id);
        if !self.store.delete(full_task_id)? {
            return Err(RunnerError::TaskNotFound(full_task_id.to_string()));
        }
        log::info!("Deleted task {}", full_task_id);
        emit(
            self.events.as_ref(),
            RunnerEvent::TaskDeleted {
                full_task_id: full_task_id.to_string(),
            },
        );
        Ok(())
    }

    /// Seed an empty task store from the remote seed document
    ///
    /// The first time records are seeded the newest one's workflow is
    /// loaded into the host; later reseeds leave the host graph alone.
    /// Returns the number of seeded records.
    pub async fn seed_tasks(&self) -> Result<usize> {
        if !self.store.list().is_empty() {
            return Ok(0);
        }

        let records = self.service.fetch_seed_tasks().await?;
        let seeded = self.store.seed_if_empty(records)?;
        log::info!("Seeded {} task(s)", seeded);

        if seeded > 0 && !self.auto_loaded_workflow.load(Ordering::SeqCst) {
            let newest = self.store.list().pop();
            if let Some(workflow) = newest.and_then(|t| t.workflow_json) {
                self.load_into_host(&workflow).await?;
                self.remember_auto_load().await;
            }
        }
        Ok(seeded)
    }

    /// Whether a seeded workflow has already been loaded into the host
    pub fn auto_loaded_workflow(&self) -> bool {
        self.auto_loaded_workflow.load(Ordering::SeqCst)
    }

    async fn remember_auto_load(&self) {
        self.auto_loaded_workflow.store(true, Ordering::SeqCst);
        let Some(data_dir) = &self.data_dir else {
            return;
        };

        let saved = async {
            let mut config = RunnerConfig::load(data_dir).await?;
            config.auto_loaded_workflow = true;
            config.save(data_dir).await?;
            Ok::<(), ConfigError>(())
        }
        .await;
        if let Err(e) = saved {
            log::warn!("Failed to persist auto-load flag: {}", e);
        }
    }

    /// Load a task's submitted workflow back into the host
    pub async fn reload_workflow(&self, full_task_id: &str) -> Result<()> {
        let task = self
            .store
            .get(full_task_id)
            .ok_or_else(|| RunnerError::TaskNotFound(full_task_id.to_string()))?;
        let workflow = task.workflow_json.ok_or_else(|| {
            RunnerError::InvalidResponse(format!("task {} has no workflow snapshot", full_task_id))
        })?;

        self.load_into_host(&workflow).await?;
        log::info!("Reloaded workflow of task {}", full_task_id);
        Ok(())
    }

    /// Render a finished task's results into the host graph
    pub fn render_task(&self, full_task_id: &str) -> Result<RenderSummary> {
        let task = self
            .store
            .get(full_task_id)
            .ok_or_else(|| RunnerError::TaskNotFound(full_task_id.to_string()))?;
        let renderer = self
            .renderer
            .as_deref()
            .ok_or_else(|| RunnerError::HostUnavailable("no render bridge attached".to_string()))?;

        render_record(renderer, self.events.as_ref(), &task)
            .ok_or_else(|| RunnerError::NotRenderable(full_task_id.to_string()))
    }

    // =========================================================================
    // Previews
    // =========================================================================

    pub fn renderer(&self) -> Option<&Arc<RenderBridge>> {
        self.renderer.as_ref()
    }

    /// Host hook: call after every graph load, whoever started it
    pub fn on_graph_loaded(&self) {
        if let Some(renderer) = &self.renderer {
            renderer.on_graph_loaded();
        }
    }

    /// Update preview layout; returns the options now in effect
    pub fn set_render_options(
        &self,
        max_height: Option<u32>,
        columns: Option<u32>,
    ) -> Option<RenderOptions> {
        let renderer = self.renderer.as_deref()?;
        renderer.set_options(max_height, columns);
        Some(renderer.options())
    }

    pub fn clear_preview(&self, node_id: CanvasNodeId) {
        if let Some(renderer) = &self.renderer {
            renderer.clear(node_id);
        }
    }

    pub fn clear_all_previews(&self) {
        if let Some(renderer) = &self.renderer {
            renderer.clear_all();
        }
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    pub fn catalog(&self) -> &WorkflowCatalog {
        &self.catalog
    }

    /// Load a catalog workflow and adopt its task type
    pub async fn load_catalog_workflow(&self, workflow: &WorkflowEntry) -> Result<()> {
        let host = self.require_host()?;
        self.on_graph_loaded();
        if let Some(task_type) = self.catalog.load_workflow(host.as_ref(), workflow).await? {
            self.set_task_type(task_type);
        }
        Ok(())
    }

    fn require_host(&self) -> Result<&Arc<dyn HostGraph>> {
        self.host
            .as_ref()
            .ok_or_else(|| RunnerError::HostUnavailable("no host graph attached".to_string()))
    }

    async fn load_into_host(&self, workflow: &serde_json::Value) -> Result<()> {
        let host = self.require_host()?;
        self.on_graph_loaded();
        host.load_graph(workflow).await?;
        Ok(())
    }
}

impl Drop for RunCoordinator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Everything one poll session needs, owned so it can run on its own task
struct PollSession {
    full_task_id: String,
    service: Arc<dyn RemoteJobService>,
    store: Arc<dyn TaskStore>,
    events: Arc<dyn EventSink>,
    renderer: Option<Arc<RenderBridge>>,
    config: PollConfig,
    cancel: CancellationToken,
}

impl PollSession {
    async fn run(self) {
        let on_update = |snapshot: StatusSnapshot| {
            match self.store.update(&self.full_task_id, snapshot.into()) {
                Ok(Some(task)) => emit(self.events.as_ref(), RunnerEvent::TaskUpdated { task }),
                Ok(None) => log::warn!("Task {} disappeared while polling", self.full_task_id),
                Err(e) => log::error!("Failed to store status of {}: {}", self.full_task_id, e),
            }
        };

        let outcome = poll(
            self.service.as_ref(),
            &self.full_task_id,
            on_update,
            &self.config,
            &self.cancel,
        )
        .await;

        match outcome {
            PollOutcome::Completed(TaskStatus::Success) => {
                let (Some(renderer), Some(task)) =
                    (self.renderer.as_deref(), self.store.get(&self.full_task_id))
                else {
                    return;
                };
                render_record(renderer, self.events.as_ref(), &task);
            }
            PollOutcome::Completed(_) | PollOutcome::Cancelled => {}
            PollOutcome::Exhausted { attempts } => emit(
                self.events.as_ref(),
                RunnerEvent::PollingExhausted {
                    full_task_id: self.full_task_id.clone(),
                    attempts,
                },
            ),
        }
    }
}

/// Render a task if it finished with a payload
fn render_record(
    renderer: &RenderBridge,
    events: &dyn EventSink,
    task: &TaskRecord,
) -> Option<RenderSummary> {
    if !task.is_renderable() {
        return None;
    }
    let origin = task.origin.as_ref()?;

    log::info!("Rendering results of task {}", task.full_task_id);
    let summary = renderer.render(origin);
    emit(
        events,
        RunnerEvent::TaskRendered {
            full_task_id: task.full_task_id.clone(),
            summary: summary.clone(),
        },
    );
    Some(summary)
}

fn emit(events: &dyn EventSink, event: RunnerEvent) {
    if let Err(e) = events.send(event) {
        log::warn!("Failed to deliver runner event: {}", e);
    }
}
