//! Typed error hierarchy for the feedwake worker.
//!
//! Four enums cover the subsystems that can fail:
//! - `FeedError`: calls to the host feed service
//! - `StoreError`: writing persisted documents
//! - `InvokeError`: spawning and supervising agent CLIs
//! - `ConfigError`: invalid configuration values

use thiserror::Error;

/// Errors from the feed REST API and event stream.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Feed returned {status} for {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("No data from {url} for {idle_secs}s")]
    Idle { url: String, idle_secs: u64 },

    #[error("Invalid feed url '{0}'")]
    InvalidUrl(String),
}

/// Errors from durable stores. Loading never fails; only writes do.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {path}: {source}")]
    Serialize {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from launching or supervising an agent process.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("Failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while supervising agent process: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from configuration parsing and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid permission mode '{0}'. Valid values: readonly, standard, unrestricted")]
    PermissionMode(String),

    #[error(transparent)]
    Backend(#[from] feedwake_common::ParseBackendError),

    #[error("No data directory: set FEEDWAKE_HOME or pass --data-dir")]
    NoDataDir,
}
