//! Agent process supervision.

use async_trait::async_trait;
use console::style;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::backend::BackendAdapter;
use crate::errors::InvokeError;

/// Grace period for the output reader after the process exits.
const READER_GRACE: Duration = Duration::from_secs(5);

/// How one CLI run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Exit status 0. `session_id` is set when a new session announced one.
    Completed { session_id: Option<String> },
    /// Non-zero exit or death by signal.
    Crashed { exit_code: Option<i32> },
    /// Killed after exceeding the wall-clock limit.
    TimedOut,
}

/// One prepared CLI run.
pub struct Invocation {
    pub adapter: Arc<dyn BackendAdapter>,
    pub args: Vec<String>,
    /// Resumed sessions pass output straight through.
    pub resumed: bool,
    /// Prefix for echoed text, e.g. `claude:default`.
    pub label: String,
}

/// Runs agent CLIs. A trait so the dispatcher can be tested without
/// spawning processes.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, invocation: Invocation) -> Result<Outcome, InvokeError>;
}

/// [`AgentRunner`] that spawns the real CLI.
pub struct CliRunner {
    working_dir: PathBuf,
    timeout: Duration,
}

impl CliRunner {
    pub fn new(working_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            working_dir,
            timeout,
        }
    }
}

#[async_trait]
impl AgentRunner for CliRunner {
    async fn run(&self, invocation: Invocation) -> Result<Outcome, InvokeError> {
        let Invocation {
            adapter,
            args,
            resumed,
            label,
        } = invocation;
        let program = adapter.program().to_string();

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .env_clear()
            .envs(adapter.build_env())
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit());
        if resumed {
            cmd.stdout(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::piped());
        }

        let mut child = cmd.spawn().map_err(|source| InvokeError::SpawnFailed {
            program: program.clone(),
            source,
        })?;
        debug!(program = %program, pid = ?child.id(), resumed, "Agent process started");

        let reader = child.stdout.take().map(|stdout| {
            let adapter = Arc::clone(&adapter);
            let label = label.clone();
            tokio::spawn(async move { read_output(stdout, adapter.as_ref(), &label).await })
        });

        let status = tokio::select! {
            status = child.wait() => Some(status?),
            _ = tokio::time::sleep(self.timeout) => None,
        };

        let Some(status) = status else {
            warn!(label = %label, timeout_secs = self.timeout.as_secs(), "Agent timed out, killing");
            if let Err(e) = child.kill().await {
                warn!(label = %label, error = %e, "Failed to kill timed-out agent");
            }
            if let Some(reader) = reader {
                reader.abort();
            }
            return Ok(Outcome::TimedOut);
        };

        let session_id = match reader {
            Some(reader) => match tokio::time::timeout(READER_GRACE, reader).await {
                Ok(Ok(id)) => id,
                Ok(Err(e)) => {
                    warn!(label = %label, error = %e, "Output reader failed");
                    None
                }
                Err(_) => {
                    debug!(label = %label, "Output still open after exit, abandoning reader");
                    None
                }
            },
            None => None,
        };

        if status.success() {
            Ok(Outcome::Completed { session_id })
        } else {
            Ok(Outcome::Crashed {
                exit_code: status.code(),
            })
        }
    }
}

/// Feed output lines through the adapter, echoing assistant text. Returns
/// the first session id seen. Unparseable lines are skipped.
///
/// Output is drained to EOF even past bad lines: closing the pipe early
/// would kill the agent with SIGPIPE on its next write.
pub async fn read_output<R>(output: R, adapter: &dyn BackendAdapter, label: &str) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(output);
    let mut buf = Vec::new();
    let mut session_id = None;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(label, error = %e, "Stopped reading agent output");
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        if session_id.is_none()
            && let Some(id) = adapter.parse_session_id(line)
        {
            debug!(label, session_id = %id, "Session announced");
            session_id = Some(id);
        }
        if let Some(text) = adapter.parse_text(line) {
            println!("{} {}", style(format!("[{}]", label)).cyan().bold(), text);
        }
    }
    session_id
}
