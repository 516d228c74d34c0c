//! Task storage with file persistence.
//!
//! Task records live in an ordered list keyed by `full_task_id`, oldest
//! first. The persisted form is a single JSON array; every save trims the
//! list to the configured maximum by evicting the oldest records.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde_json::Value;

use crate::task::{TaskPatch, TaskRecord, TaskStatus};

/// Keys under which a seed document may carry its task array
const SEED_ARRAY_KEYS: &[&str] = &["tasks", "data", "items", "list"];

/// Task store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize tasks: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// CRUD over task records keyed by `full_task_id`
///
/// Each task's own poller is its only status writer, so implementations
/// only need per-call atomicity.
pub trait TaskStore: Send + Sync {
    /// Append a record; an existing record with the same id is replaced
    fn add(&self, record: TaskRecord) -> Result<(), StoreError>;

    /// Merge a patch into a record, returning the merged record or `None`
    fn update(&self, full_task_id: &str, patch: TaskPatch) -> Result<Option<TaskRecord>, StoreError>;

    /// Remove a record, returning whether it existed
    fn delete(&self, full_task_id: &str) -> Result<bool, StoreError>;

    /// Look up a record
    fn get(&self, full_task_id: &str) -> Option<TaskRecord>;

    /// Every record, oldest first
    fn list(&self) -> Vec<TaskRecord>;

    /// Records still in the `Running` state
    fn running(&self) -> Vec<TaskRecord> {
        self.list()
            .into_iter()
            .filter(|t| t.status == TaskStatus::Running)
            .collect()
    }

    /// Replace the contents with `records` if the store is empty
    ///
    /// Returns the number of records stored.
    fn seed_if_empty(&self, records: Vec<TaskRecord>) -> Result<usize, StoreError>;
}

/// Ordered record list shared by both store flavours
#[derive(Debug, Default)]
struct TaskList {
    tasks: Vec<TaskRecord>,
    max_tasks: usize,
}

impl TaskList {
    fn with_capacity_limit(max_tasks: usize) -> Self {
        Self {
            tasks: Vec::new(),
            max_tasks,
        }
    }

    fn position(&self, full_task_id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.full_task_id == full_task_id)
    }

    fn add(&mut self, record: TaskRecord) {
        match self.position(&record.full_task_id) {
            Some(index) => {
                log::debug!("Replacing existing task '{}'", record.full_task_id);
                self.tasks[index] = record;
            }
            None => self.tasks.push(record),
        }
    }

    fn update(&mut self, full_task_id: &str, patch: TaskPatch) -> Option<TaskRecord> {
        let index = self.position(full_task_id)?;
        let record = &mut self.tasks[index];
        patch.apply(record);
        Some(record.clone())
    }

    fn delete(&mut self, full_task_id: &str) -> bool {
        match self.position(full_task_id) {
            Some(index) => {
                self.tasks.remove(index);
                true
            }
            None => false,
        }
    }

    /// Evict the oldest records beyond the cap
    fn enforce_cap(&mut self) {
        if self.max_tasks > 0 && self.tasks.len() > self.max_tasks {
            let excess = self.tasks.len() - self.max_tasks;
            self.tasks.drain(..excess);
            log::debug!("Evicted {} oldest task(s)", excess);
        }
    }
}

/// In-memory task store without persistence
#[derive(Debug)]
pub struct MemoryTaskStore {
    inner: RwLock<TaskList>,
}

impl MemoryTaskStore {
    pub fn new(max_tasks: usize) -> Self {
        Self {
            inner: RwLock::new(TaskList::with_capacity_limit(max_tasks)),
        }
    }
}

impl TaskStore for MemoryTaskStore {
    fn add(&self, record: TaskRecord) -> Result<(), StoreError> {
        let mut list = self.inner.write();
        list.add(record);
        list.enforce_cap();
        Ok(())
    }

    fn update(&self, full_task_id: &str, patch: TaskPatch) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.inner.write().update(full_task_id, patch))
    }

    fn delete(&self, full_task_id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.write().delete(full_task_id))
    }

    fn get(&self, full_task_id: &str) -> Option<TaskRecord> {
        let list = self.inner.read();
        list.position(full_task_id).map(|i| list.tasks[i].clone())
    }

    fn list(&self) -> Vec<TaskRecord> {
        self.inner.read().tasks.clone()
    }

    fn seed_if_empty(&self, records: Vec<TaskRecord>) -> Result<usize, StoreError> {
        let mut list = self.inner.write();
        if !list.tasks.is_empty() {
            return Ok(0);
        }
        list.tasks = records;
        list.enforce_cap();
        Ok(list.tasks.len())
    }
}

/// Task store persisted as a JSON array file
///
/// Every mutation rewrites the whole file, mirroring the single-key
/// persisted list the host plugin keeps.
#[derive(Debug)]
pub struct JsonTaskStore {
    inner: RwLock<TaskList>,
    path: PathBuf,
}

impl JsonTaskStore {
    /// Open a store backed by `path`, loading any existing records
    ///
    /// A missing file yields an empty store. Records that fail to parse are
    /// skipped with a warning.
    pub fn open(path: impl AsRef<Path>, max_tasks: usize) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut list = TaskList::with_capacity_limit(max_tasks);

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<Vec<Value>>(&content) {
                Ok(values) => {
                    list.tasks = parse_records(values);
                    log::info!("Loaded {} task(s) from {:?}", list.tasks.len(), path);
                }
                Err(e) => {
                    log::warn!("Failed to parse task list at {:?}: {}", path, e);
                }
            }
        }

        Ok(Self {
            inner: RwLock::new(list),
            path,
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, list: &mut TaskList) -> Result<(), StoreError> {
        list.enforce_cap();

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(&list.tasks)?;
        std::fs::write(&self.path, content)?;
        log::debug!("Saved {} task(s) to {:?}", list.tasks.len(), self.path);
        Ok(())
    }
}

impl TaskStore for JsonTaskStore {
    fn add(&self, record: TaskRecord) -> Result<(), StoreError> {
        let mut list = self.inner.write();
        list.add(record);
        self.save(&mut list)
    }

    fn update(&self, full_task_id: &str, patch: TaskPatch) -> Result<Option<TaskRecord>, StoreError> {
        let mut list = self.inner.write();
        let merged = list.update(full_task_id, patch);
        if merged.is_some() {
            self.save(&mut list)?;
        } else {
            log::warn!("Update for unknown task '{}' ignored", full_task_id);
        }
        Ok(merged)
    }

    fn delete(&self, full_task_id: &str) -> Result<bool, StoreError> {
        let mut list = self.inner.write();
        let removed = list.delete(full_task_id);
        if removed {
            self.save(&mut list)?;
        }
        Ok(removed)
    }

    fn get(&self, full_task_id: &str) -> Option<TaskRecord> {
        let list = self.inner.read();
        list.position(full_task_id).map(|i| list.tasks[i].clone())
    }

    fn list(&self) -> Vec<TaskRecord> {
        self.inner.read().tasks.clone()
    }

    fn seed_if_empty(&self, records: Vec<TaskRecord>) -> Result<usize, StoreError> {
        let mut list = self.inner.write();
        if !list.tasks.is_empty() {
            return Ok(0);
        }
        list.tasks = records;
        self.save(&mut list)?;
        Ok(list.tasks.len())
    }
}

/// Extract seed records from a remote seed document
///
/// The document is either a task array or an object holding the array
/// under one of a few well-known keys. Anything else yields no records.
pub fn parse_seed_document(document: Value) -> Vec<TaskRecord> {
    match document {
        Value::Array(values) => parse_records(values),
        Value::Object(mut map) => {
            for key in SEED_ARRAY_KEYS {
                if let Some(Value::Array(values)) = map.remove(*key) {
                    if !values.is_empty() {
                        log::debug!("Seed tasks found under '{}'", key);
                        return parse_records(values);
                    }
                }
            }
            log::warn!("Seed document has no task array");
            Vec::new()
        }
        other => {
            log::warn!("Seed document is not an array or object: {}", other);
            Vec::new()
        }
    }
}

fn parse_records(values: Vec<Value>) -> Vec<TaskRecord> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<TaskRecord>(value) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("Skipping unreadable task record: {}", e);
                None
            }
        })
        .collect()
}
