//! Task status poller
//!
//! A poll session queries one task until it reaches a terminal status,
//! the attempt budget runs out, or its cancellation token fires. Every
//! session owns its own attempt counter, so any number of tasks can be
//! polled concurrently.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::RemoteJobService;
use crate::constants::defaults;
use crate::task::{StatusSnapshot, TaskStatus};

/// Polling budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Attempts before giving up
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds
    pub interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::POLL_MAX_ATTEMPTS,
            interval_ms: defaults::POLL_INTERVAL_MS,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// How a poll session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The task left the Running state
    Completed(TaskStatus),
    /// The budget ran out while the task was still running (or unseen)
    Exhausted { attempts: u32 },
    /// The session's token was cancelled
    Cancelled,
}

/// Poll a task until it leaves the Running state
///
/// `on_update` receives every snapshot the service returns, Running ones
/// included. Attempts that yield no snapshot (no record yet, or a query
/// error) are retried without calling it. Nothing is called after a
/// terminal snapshot has been delivered.
pub async fn poll<F>(
    service: &dyn RemoteJobService,
    full_task_id: &str,
    mut on_update: F,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> PollOutcome
where
    F: FnMut(StatusSnapshot),
{
    let max_attempts = config.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            log::debug!("Polling {} cancelled", full_task_id);
            return PollOutcome::Cancelled;
        }
        log::debug!("Polling {} ({}/{})", full_task_id, attempt, max_attempts);

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("Polling {} cancelled", full_task_id);
                return PollOutcome::Cancelled;
            }
            result = service.query_status(full_task_id) => result,
        };

        match result {
            Ok(Some(snapshot)) => {
                let status = snapshot.status;
                on_update(snapshot);

                match status {
                    TaskStatus::Running => {}
                    TaskStatus::Success => {
                        log::info!("Task {} completed", full_task_id);
                        return PollOutcome::Completed(status);
                    }
                    TaskStatus::Failed => {
                        log::info!("Task {} failed", full_task_id);
                        return PollOutcome::Completed(status);
                    }
                    TaskStatus::Unknown(code) => {
                        log::warn!("Task {} reported unknown status {}; polling stopped", full_task_id, code);
                        return PollOutcome::Completed(status);
                    }
                }
            }
            Ok(None) => {
                log::debug!("No status for {} yet", full_task_id);
            }
            Err(e) if e.is_transient() => {
                log::warn!("Status query for {} failed, retrying: {}", full_task_id, e);
            }
            Err(e) => {
                log::error!("Status query for {} failed unexpectedly, retrying: {}", full_task_id, e);
            }
        }

        if attempt < max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::debug!("Polling {} cancelled", full_task_id);
                    return PollOutcome::Cancelled;
                }
                _ = tokio::time::sleep(config.interval()) => {}
            }
        }
    }

    log::warn!(
        "Polling {} gave up after {} attempts; task left running",
        full_task_id,
        max_attempts
    );
    PollOutcome::Exhausted {
        attempts: max_attempts,
    }
}

/// Run a poll session on its own tokio task
pub fn spawn_poller<F>(
    service: Arc<dyn RemoteJobService>,
    full_task_id: String,
    on_update: F,
    config: PollConfig,
    cancel: CancellationToken,
) -> JoinHandle<PollOutcome>
where
    F: FnMut(StatusSnapshot) + Send + 'static,
{
    tokio::spawn(async move {
        poll(service.as_ref(), &full_task_id, on_update, &config, &cancel).await
    })
}
