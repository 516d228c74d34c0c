//! Runner-wide constants
//!
//! Single source of truth for protocol values and configuration defaults.

/// Remote service endpoints
pub mod endpoints {
    /// Default base URL of the remote task service
    pub const SERVICE_BASE_URL: &str = "https://design-ai.example.com";
    /// Job submission path
    pub const SUBMIT_PATH: &str = "/pub/api/workflow/message/imagine/real/comfy";
    /// Status query path
    pub const STATUS_PATH: &str = "/api/test/GetDesignAIResourceListV2";
    /// Media upload path
    pub const UPLOAD_PATH: &str = "/api/pub/other/uploadfile";
    /// Seed task list path
    pub const SEED_TASKS_PATH: &str = "/kc/files/design-ai/initial-tasks.json";
    /// Workflow catalog path
    pub const CATALOG_PATH: &str = "/api-token/workflow/list";
}

/// Fixed protocol values
pub mod protocol {
    /// Source tag sent with every status query
    pub const STATUS_SOURCE: i64 = 30;
    /// Prefix joined to the remote task id to form the full task id
    pub const FULL_TASK_ID_PREFIX: &str = "30_";
    /// Business token sent with every submission
    pub const BIZ_TOKEN: &str = "comfyUIToken";
    /// Routing flag: where input images come from
    pub const IMAGE_INPUT_SOURCE_TYPE: i64 = 2;
    /// Routing flag: where result images go
    pub const IMAGE_RESULT_SOURCE_TYPE: i64 = 7;
    /// Application success code for submission, upload and catalog responses
    pub const CODE_OK: i64 = 1;
    /// Application success code for status responses
    pub const STATUS_CODE_OK: i64 = 200;
    /// Header carrying the catalog token
    pub const CATALOG_TOKEN_HEADER: &str = "poify-token";
}

/// Host environment detection
pub mod hosts {
    /// Hostnames treated as a local development host
    pub const LOCAL_HOSTNAMES: &[&str] = &["localhost", "127.0.0.1"];
    /// File server used when running against a local development host
    pub const LOCAL_FILE_SERVER: &str = "http://127.0.0.1:8188";
}

/// Default values for runner configuration
pub mod defaults {
    /// Task type used when none is selected
    pub const TASK_TYPE: &str = "wanVideo";
    /// Poll attempts before giving up
    pub const POLL_MAX_ATTEMPTS: u32 = 60;
    /// Delay between poll attempts
    pub const POLL_INTERVAL_MS: u64 = 3000;
    /// Maximum number of retained task records
    pub const MAX_TASKS: usize = 500;
    /// HTTP request timeout
    pub const REQUEST_TIMEOUT_SECS: u64 = 60;
    /// Catalog cache time-to-live
    pub const CATALOG_TTL_SECS: u64 = 300;
    /// Preview surface max height
    pub const PREVIEW_MAX_HEIGHT: u32 = 280;
    /// Preview grid columns
    pub const PREVIEW_COLUMNS: u32 = 2;
}

/// Result preview surfaces
pub mod preview {
    /// Node height after rendering text only
    pub const TEXT_NODE_HEIGHT: u32 = 400;
    /// Node height after rendering images
    pub const IMAGE_NODE_HEIGHT: u32 = 800;
    /// Node height after rendering video
    pub const VIDEO_NODE_HEIGHT: u32 = 800;
    /// Lowercase type fragments of nodes that can hold a preview
    pub const SUPPORTED_TYPE_FRAGMENTS: &[&str] = &["savetextnode", "videocombine"];
    /// Lowercase node type that must match exactly
    pub const SUPPORTED_EXACT_TYPE: &str = "image save";
}

/// Data storage
pub mod paths {
    /// Directory under the platform data dir
    pub const APP_DIR: &str = "remote-runner";
    /// File holding the persisted task list
    pub const TASKS_FILE: &str = "workflow_tasks.json";
    /// File holding the runner configuration
    pub const CONFIG_FILE: &str = "runner.json";
}
