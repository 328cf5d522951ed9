//! Tracing subscriber setup.
//!
//! Console output goes to stderr (human-readable, or JSON lines with
//! `--log-json`). When a log directory is given, a daily rolling file is
//! written alongside through a non-blocking appender.

use anyhow::Result;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Keeps the file appender flushing. Hold it until the process exits.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

fn default_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("feedwake={level},feedwake_common={level}")))
}

pub fn init(verbose: bool, json: bool, log_dir: Option<&Path>) -> Result<LogGuard> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "feedwake.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(default_filter(verbose))
        .with(file_layer);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
    }

    Ok(LogGuard { _file: guard })
}
