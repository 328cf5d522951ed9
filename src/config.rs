use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::ConfigError;
use crate::settings::{BackendSection, FeedwakeToml, PermissionMode};

/// Runtime configuration for the worker.
///
/// Merges settings from:
/// 1. `<data_dir>/feedwake.toml`
/// 2. Environment variables (`FEED_URL`, the configured token variable,
///    `FEEDWAKE_PERMISSION_MODE`)
/// 3. CLI arguments
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub feed_url: String,
    pub feed_token: Option<String>,
    pub permission_mode: PermissionMode,
    pub verbose: bool,
    pub toml: FeedwakeToml,
}

/// CLI-level overrides applied on top of file and environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub data_dir: Option<PathBuf>,
    pub feed_url: Option<String>,
    pub max_concurrent: Option<usize>,
    pub permission_mode: Option<PermissionMode>,
    pub verbose: bool,
}

impl Config {
    pub fn load(overrides: CliOverrides) -> Result<Self> {
        let data_dir = match overrides.data_dir.clone() {
            Some(dir) => dir,
            None => default_data_dir()?,
        };
        let mut toml = FeedwakeToml::load_or_default(&data_dir)?;

        if let Some(max) = overrides.max_concurrent {
            toml.worker.max_concurrent = max;
        }

        let feed_url = overrides
            .feed_url
            .clone()
            .or_else(|| std::env::var("FEED_URL").ok())
            .unwrap_or_else(|| toml.feed.url.clone());

        let feed_token = std::env::var(&toml.feed.token_env)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| toml.feed.token.clone());

        let permission_mode = match overrides.permission_mode {
            Some(mode) => mode,
            None => match std::env::var("FEEDWAKE_PERMISSION_MODE") {
                Ok(value) => value
                    .parse()
                    .context("Invalid FEEDWAKE_PERMISSION_MODE")?,
                Err(_) => toml.worker.permission_mode,
            },
        };

        Ok(Self {
            data_dir,
            feed_url: feed_url.trim_end_matches('/').to_string(),
            feed_token,
            permission_mode,
            verbose: overrides.verbose,
            toml,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir).context("Failed to create data directory")?;
        std::fs::create_dir_all(self.sessions_dir())
            .context("Failed to create sessions directory")?;
        std::fs::create_dir_all(self.log_dir()).context("Failed to create log directory")?;
        Ok(())
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("feedwake.toml")
    }

    pub fn queue_file(&self) -> PathBuf {
        self.data_dir.join("queue.json")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn post_sessions_file(&self) -> PathBuf {
        self.data_dir.join("post_sessions.json")
    }

    pub fn follows_file(&self) -> PathBuf {
        self.data_dir.join("follows.json")
    }

    pub fn identities_file(&self) -> PathBuf {
        self.data_dir.join("identities.json")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.data_dir.join("worker.lock")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn backends(&self) -> Vec<BackendSection> {
        let mut seen = std::collections::HashSet::new();
        self.toml
            .effective_backends()
            .into_iter()
            .filter(|b| seen.insert(b.kind))
            .collect()
    }

    /// Tool endpoint registered with each CLI unless a backend overrides it.
    pub fn default_tool_url(&self) -> String {
        format!("{}/mcp", self.feed_url)
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.toml.worker.invocation_timeout_secs)
    }

    pub fn working_dir(&self) -> PathBuf {
        self.toml
            .worker
            .working_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("workspace"))
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

/// `$FEEDWAKE_HOME`, else `~/.feedwake`.
pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(home) = std::env::var("FEEDWAKE_HOME")
        && !home.is_empty()
    {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir()
        .map(|home| home.join(".feedwake"))
        .ok_or(ConfigError::NoDataDir)
}

/// Path of a backend's session map document.
pub fn session_file(sessions_dir: &Path, backend: feedwake_common::BackendType) -> PathBuf {
    sessions_dir.join(format!("{}.json", backend))
}
