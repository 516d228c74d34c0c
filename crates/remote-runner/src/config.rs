//! Runner configuration storage
//!
//! Handles persistent storage of endpoints, protocol values and
//! polling/render preferences. Every field has a default so a partial
//! (or missing) file still loads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::constants::{defaults, endpoints, paths, protocol};
use crate::intercept::QueueInterceptMode;
use crate::poller::PollConfig;
use crate::render::RenderOptions;

/// Remote endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Job submission endpoint
    pub submit_url: String,
    /// Status query endpoint
    pub status_url: String,
    /// Media upload endpoint (multipart)
    pub upload_url: String,
    /// Document used to seed an empty task store (None disables seeding)
    pub seed_tasks_url: Option<String>,
    /// Workflow catalog endpoint
    pub catalog_url: String,
    /// Token sent to the catalog endpoint
    pub catalog_token: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        let base = endpoints::SERVICE_BASE_URL;
        Self {
            submit_url: format!("{}{}", base, endpoints::SUBMIT_PATH),
            status_url: format!("{}{}", base, endpoints::STATUS_PATH),
            upload_url: format!("{}{}", base, endpoints::UPLOAD_PATH),
            seed_tasks_url: Some(format!("{}{}", base, endpoints::SEED_TASKS_PATH)),
            catalog_url: format!("{}{}", base, endpoints::CATALOG_PATH),
            catalog_token: String::new(),
        }
    }
}

/// Values the remote service expects verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Source tag sent with status queries
    pub status_source: i64,
    /// Prefix of the full task id
    pub full_task_id_prefix: String,
    /// Business token sent with submissions
    pub biz_token: String,
    pub image_input_source_type: i64,
    pub image_result_source_type: i64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            status_source: protocol::STATUS_SOURCE,
            full_task_id_prefix: protocol::FULL_TASK_ID_PREFIX.to_string(),
            biz_token: protocol::BIZ_TOKEN.to_string(),
            image_input_source_type: protocol::IMAGE_INPUT_SOURCE_TYPE,
            image_result_source_type: protocol::IMAGE_RESULT_SOURCE_TYPE,
        }
    }
}

/// Full runner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub endpoints: EndpointConfig,
    pub protocol: ProtocolConfig,
    /// Task type used when the caller does not pick one
    pub default_task_type: String,
    /// Polling budget
    pub poll: PollConfig,
    /// Maximum number of retained task records
    pub max_tasks: usize,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
    /// Workflow catalog cache TTL in seconds
    pub catalog_ttl_secs: u64,
    /// Result preview layout
    pub render: RenderOptions,
    /// How run intents from the host are routed
    pub intercept_mode: QueueInterceptMode,
    /// User opted out of the "run remotely?" prompt
    pub intercept_disabled: bool,
    /// A seeded workflow has already been loaded into the host once
    pub auto_loaded_workflow: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            endpoints: EndpointConfig::default(),
            protocol: ProtocolConfig::default(),
            default_task_type: defaults::TASK_TYPE.to_string(),
            poll: PollConfig::default(),
            max_tasks: defaults::MAX_TASKS,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            catalog_ttl_secs: defaults::CATALOG_TTL_SECS,
            render: RenderOptions::default(),
            intercept_mode: QueueInterceptMode::default(),
            intercept_disabled: false,
            auto_loaded_workflow: false,
        }
    }
}

impl RunnerConfig {
    /// Load configuration from disk
    pub async fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = data_dir.join(paths::CONFIG_FILE);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_path)
            .await
            .map_err(ConfigError::Io)?;

        serde_json::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save configuration to disk
    pub async fn save(&self, data_dir: &Path) -> Result<(), ConfigError> {
        fs::create_dir_all(data_dir).await.map_err(ConfigError::Io)?;

        let config_path = data_dir.join(paths::CONFIG_FILE);
        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        fs::write(&config_path, contents)
            .await
            .map_err(ConfigError::Io)?;

        log::info!("Configuration saved to {:?}", config_path);
        Ok(())
    }

    /// HTTP request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Catalog cache TTL
    pub fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_ttl_secs)
    }

    /// Path of the persisted task list inside a data directory
    pub fn tasks_path(data_dir: &Path) -> PathBuf {
        data_dir.join(paths::TASKS_FILE)
    }
}

/// Platform data directory for the runner, if one exists
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(paths::APP_DIR))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = RunnerConfig::load(dir.path()).await.unwrap();
        assert_eq!(config, RunnerConfig::default());
        assert_eq!(config.poll.max_attempts, 60);
        assert_eq!(config.max_tasks, 500);
        assert_eq!(config.protocol.full_task_id_prefix, "30_");
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let mut config = RunnerConfig::default();
        config.default_task_type = "fluxImage".to_string();
        config.poll.interval_ms = 500;
        config.intercept_disabled = true;

        config.save(dir.path()).await.unwrap();
        let loaded = RunnerConfig::load(dir.path()).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(paths::CONFIG_FILE),
            r#"{"default_task_type": "img2img", "poll": {"max_attempts": 5}}"#,
        )
        .unwrap();

        let config = RunnerConfig::load(dir.path()).await.unwrap();
        assert_eq!(config.default_task_type, "img2img");
        assert_eq!(config.poll.max_attempts, 5);
        assert_eq!(config.poll.interval_ms, defaults::POLL_INTERVAL_MS);
        assert_eq!(config.endpoints, EndpointConfig::default());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(paths::CONFIG_FILE), "{ nope").unwrap();
        let err = RunnerConfig::load(dir.path()).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
