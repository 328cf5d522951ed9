//! Process wiring for `feedwake run`.
//!
//! Startup order: data directories and the single-instance lock, feed
//! client, backend identities, tool registration, then the event stream and
//! the dispatcher loop (which opens with a reconciliation sweep). Ctrl-C
//! closes the stream and stops the loop.

use anyhow::{Context, Result, bail};
use fs2::FileExt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::{BackendAgent, ToolEndpoint, adapter_for};
use crate::config::{Config, session_file};
use crate::dispatch::{DispatchSettings, Dispatcher, Stores};
use crate::feed::{EventStream, FeedApi, FeedClient};
use crate::invoker::CliRunner;
use crate::settings::BackendSection;
use crate::store::{IdentityRegistry, SessionStore};

/// Buffered events between the stream and the dispatcher.
const EVENT_BUFFER: usize = 256;

/// Exclusive lock on the data directory, held for the process lifetime.
#[derive(Debug)]
pub struct WorkerLock {
    _file: File,
}

pub fn acquire_lock(path: &Path) -> Result<WorkerLock> {
    let file = File::create(path).with_context(|| format!("Failed to open {}", path.display()))?;
    file.try_lock_exclusive().with_context(|| {
        format!(
            "Another feedwake worker is already using this data directory ({})",
            path.display()
        )
    })?;
    Ok(WorkerLock { _file: file })
}

/// Identity for `section`: configured, cached, or asked of the feed.
pub async fn resolve_identity(
    section: &BackendSection,
    registry: &mut IdentityRegistry,
    api: &dyn FeedApi,
) -> Result<String> {
    if let Some(identity) = &section.identity {
        registry.insert(section.kind.as_str(), identity);
        return Ok(identity.clone());
    }
    if let Some(identity) = registry.get(section.kind.as_str()) {
        return Ok(identity.to_string());
    }
    let identity = api
        .whoami(section.kind)
        .await
        .with_context(|| format!("Failed to resolve feed identity for {}", section.kind))?;
    registry.insert(section.kind.as_str(), &identity);
    Ok(identity)
}

/// Build one agent per configured backend. Backends whose identity cannot
/// be resolved are skipped.
pub async fn build_agents(config: &Config, api: &dyn FeedApi) -> Result<Vec<BackendAgent>> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let mut registry = IdentityRegistry::open(config.identities_file());
    let mut agents = Vec::new();

    for section in config.backends() {
        let identity = match resolve_identity(&section, &mut registry, api).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(backend = %section.kind, error = format!("{:#}", e), "Skipping backend");
                continue;
            }
        };
        info!(backend = %section.kind, identity = %identity, command = %section.command(), "Backend ready");
        agents.push(BackendAgent {
            adapter: adapter_for(&section, &config.data_dir, &home),
            identity,
            model: section.model.clone(),
            tool: ToolEndpoint {
                url: section
                    .tool_url
                    .clone()
                    .unwrap_or_else(|| config.default_tool_url()),
                token: config.feed_token.clone(),
            },
            sessions: SessionStore::open(session_file(&config.sessions_dir(), section.kind)),
        });
    }

    if agents.is_empty() {
        bail!("No usable backends: every configured backend failed identity resolution");
    }
    Ok(agents)
}

/// Register the feed tool with every CLI. Failures are logged only.
pub fn register_tools(agents: &[BackendAgent]) {
    for agent in agents {
        match agent.adapter.register_tool(&agent.tool) {
            Ok(true) => info!(backend = %agent.backend_type(), url = %agent.tool.url, "Registered feed tool"),
            Ok(false) => {}
            Err(e) => warn!(backend = %agent.backend_type(), error = format!("{:#}", e), "Tool registration failed"),
        }
    }
}

pub async fn run(config: Config) -> Result<()> {
    config.ensure_directories()?;
    let _lock = acquire_lock(&config.lock_file())?;

    for warning in config.validate() {
        warn!("{}", warning);
    }

    let client = Arc::new(FeedClient::new(&config.feed_url, config.feed_token.clone())?);
    let agents = build_agents(&config, client.as_ref()).await?;
    register_tools(&agents);

    let working_dir = config.working_dir();
    std::fs::create_dir_all(&working_dir)
        .with_context(|| format!("Failed to create {}", working_dir.display()))?;
    let runner = Arc::new(CliRunner::new(working_dir, config.invocation_timeout()));

    let dispatcher = Dispatcher::new(
        DispatchSettings::from_config(&config),
        client,
        runner,
        agents,
        Stores::open(&config),
    );

    let stream = EventStream::new(&config.feed_url, config.feed_token.clone(), &config.toml.stream)?;
    let close_stream = stream.close_handle();
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let stream_task = tokio::spawn(stream.run(tx));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutting down..."),
                Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
            }
            shutdown.cancel();
        });
    }

    info!(feed = %config.feed_url, data_dir = %config.data_dir.display(), "Worker running");
    dispatcher.run(rx, shutdown).await;

    close_stream.cancel();
    if let Err(e) = stream_task.await {
        warn!(error = %e, "Event stream task failed");
    }
    info!("Worker stopped");
    Ok(())
}
