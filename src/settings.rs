//! The `feedwake.toml` file model.
//!
//! # Configuration File Format
//!
//! ```toml
//! [feed]
//! url = "http://localhost:3000"
//! token_env = "FEED_TOKEN"
//!
//! [worker]
//! max_concurrent = 5
//! max_wake_attempts = 3
//! max_bot_mentions_per_post = 4
//! invocation_timeout_secs = 300
//! permission_mode = "standard"
//! allowed_tools = ["Read", "Grep", "mcp__feed"]
//!
//! [stream]
//! initial_backoff_secs = 1
//! max_backoff_secs = 60
//! idle_timeout_secs = 90
//!
//! [[backends]]
//! kind = "claude"
//! identity = "claude-bot"
//!
//! [[backends]]
//! kind = "codex"
//! model = "gpt-5-codex"
//! ```

use anyhow::{Context, Result};
use feedwake_common::BackendType;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::ConfigError;

/// How much freedom an agent CLI gets.
///
/// | Mode           | Tools                          | Prompt wrapping                 |
/// |----------------|--------------------------------|---------------------------------|
/// | `Readonly`     | Read/search tools only         | Untrusted content fenced        |
/// | `Standard`     | `allowed_tools` allow-list     | Untrusted content fenced        |
/// | `Unrestricted` | Everything, approvals skipped  | Content passed through verbatim |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionMode {
    Readonly,
    #[default]
    Standard,
    Unrestricted,
}

impl std::fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionMode::Readonly => write!(f, "readonly"),
            PermissionMode::Standard => write!(f, "standard"),
            PermissionMode::Unrestricted => write!(f, "unrestricted"),
        }
    }
}

impl std::str::FromStr for PermissionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "readonly" => Ok(PermissionMode::Readonly),
            "standard" => Ok(PermissionMode::Standard),
            "unrestricted" => Ok(PermissionMode::Unrestricted),
            _ => Err(ConfigError::PermissionMode(s.to_string())),
        }
    }
}

/// Connection to the host feed service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSection {
    #[serde(default = "default_feed_url")]
    pub url: String,
    /// Bearer token. Prefer `token_env` so secrets stay out of the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_feed_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_token_env() -> String {
    "FEED_TOKEN".to_string()
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            token: None,
            token_env: default_token_env(),
        }
    }
}

/// Scheduling limits and invocation defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSection {
    /// Global ceiling on concurrently running agent processes
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Admissions per event id before it is dropped
    #[serde(default = "default_max_wake_attempts")]
    pub max_wake_attempts: u32,
    /// Bot-authored mention triggers accepted per post
    #[serde(default = "default_max_bot_mentions")]
    pub max_bot_mentions_per_post: u32,
    /// Delay before re-running a pass that left work queued
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Hard wall-clock limit for one agent process
    #[serde(default = "default_invocation_timeout_secs")]
    pub invocation_timeout_secs: u64,
    /// Attempts per dispatch when the CLI crashes
    #[serde(default = "default_crash_retries")]
    pub crash_retries: u32,
    /// Recent comments fetched as context
    #[serde(default = "default_context_comments")]
    pub context_comments: usize,
    /// How far back reconciliation sweeps look
    #[serde(default = "default_scan_lookback_hours")]
    pub scan_lookback_hours: i64,
    #[serde(default)]
    pub permission_mode: PermissionMode,
    /// Tool allow-list for `standard` mode
    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,
    /// Working directory for agent processes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<std::path::PathBuf>,
    /// Ask CLIs that support it to enable browser integration
    #[serde(default)]
    pub browser: bool,
}

fn default_max_concurrent() -> usize {
    5
}

fn default_max_wake_attempts() -> u32 {
    3
}

fn default_max_bot_mentions() -> u32 {
    4
}

fn default_retry_delay_secs() -> u64 {
    3
}

fn default_invocation_timeout_secs() -> u64 {
    300
}

fn default_crash_retries() -> u32 {
    3
}

fn default_context_comments() -> usize {
    10
}

fn default_scan_lookback_hours() -> i64 {
    24
}

fn default_allowed_tools() -> Vec<String> {
    vec![
        "Read".to_string(),
        "Glob".to_string(),
        "Grep".to_string(),
        "WebSearch".to_string(),
        "WebFetch".to_string(),
        "mcp__feed".to_string(),
    ]
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_wake_attempts: default_max_wake_attempts(),
            max_bot_mentions_per_post: default_max_bot_mentions(),
            retry_delay_secs: default_retry_delay_secs(),
            invocation_timeout_secs: default_invocation_timeout_secs(),
            crash_retries: default_crash_retries(),
            context_comments: default_context_comments(),
            scan_lookback_hours: default_scan_lookback_hours(),
            permission_mode: PermissionMode::default(),
            allowed_tools: default_allowed_tools(),
            working_dir: None,
            browser: false,
        }
    }
}

/// Reconnect and replay-dedup tuning for the event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSection {
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// Uptime after which a dropped connection counts as recovered
    #[serde(default = "default_stable_after_secs")]
    pub stable_after_secs: u64,
    /// Interval at which the replay-dedup set is cleared
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    /// Silence after which an open connection is treated as dead
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_initial_backoff_secs() -> u64 {
    1
}

fn default_max_backoff_secs() -> u64 {
    60
}

fn default_stable_after_secs() -> u64 {
    30
}

fn default_dedup_window_secs() -> u64 {
    300
}

fn default_idle_timeout_secs() -> u64 {
    90
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            stable_after_secs: default_stable_after_secs(),
            dedup_window_secs: default_dedup_window_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

/// One configured external agent CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSection {
    pub kind: BackendType,
    /// Feed identity the agent posts as. Resolved from the feed when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// Executable to run (defaults to the kind name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Tool endpoint registered with the CLI (defaults to `<feed.url>/mcp`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_url: Option<String>,
}

impl BackendSection {
    pub fn new(kind: BackendType) -> Self {
        Self {
            kind,
            identity: None,
            command: None,
            model: None,
            tool_url: None,
        }
    }

    pub fn command(&self) -> String {
        self.command
            .clone()
            .unwrap_or_else(|| self.kind.as_str().to_string())
    }
}

/// The complete feedwake.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedwakeToml {
    #[serde(default)]
    pub feed: FeedSection,
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub stream: StreamSection,
    #[serde(default)]
    pub backends: Vec<BackendSection>,
}

impl FeedwakeToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse feedwake.toml")
    }

    /// Load `<data_dir>/feedwake.toml`, or defaults if it does not exist.
    pub fn load_or_default(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join("feedwake.toml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize feedwake.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Configured backends, or a lone claude backend when none are listed.
    pub fn effective_backends(&self) -> Vec<BackendSection> {
        if self.backends.is_empty() {
            vec![BackendSection::new(BackendType::Claude)]
        } else {
            self.backends.clone()
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.feed.url.trim().is_empty() {
            warnings.push("[feed] url is empty".to_string());
        } else if !self.feed.url.starts_with("http://") && !self.feed.url.starts_with("https://") {
            warnings.push(format!(
                "[feed] url '{}' should start with http:// or https://",
                self.feed.url
            ));
        }

        if self.worker.max_concurrent == 0 {
            warnings.push("[worker] max_concurrent is 0: nothing will ever run".to_string());
        }
        if self.worker.max_wake_attempts == 0 {
            warnings.push("[worker] max_wake_attempts is 0: every trigger is dropped".to_string());
        }
        if self.worker.crash_retries == 0 {
            warnings.push("[worker] crash_retries is 0: agents are never invoked".to_string());
        }
        if self.stream.initial_backoff_secs > self.stream.max_backoff_secs {
            warnings.push(format!(
                "[stream] initial_backoff_secs ({}) exceeds max_backoff_secs ({})",
                self.stream.initial_backoff_secs, self.stream.max_backoff_secs
            ));
        }
        if self.stream.idle_timeout_secs == 0 {
            warnings.push(
                "[stream] idle_timeout_secs is 0: every connection is dropped at once".to_string(),
            );
        }

        let mut seen = std::collections::HashSet::new();
        for backend in &self.backends {
            if !seen.insert(backend.kind) {
                warnings.push(format!(
                    "Backend '{}' is configured more than once; only the first is used",
                    backend.kind
                ));
            }
        }

        warnings
    }
}
