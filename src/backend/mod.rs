//! Adapters for the external agent CLIs.
//!
//! Each CLI is driven through [`BackendAdapter`], which isolates everything
//! syntactic about it: how the feed tool is registered, the argument vector,
//! which environment variables it may see, and the shape of its JSON-lines
//! output. Scheduling and process supervision never look past this trait.

pub mod claude;
pub mod codex;
pub mod gemini;

pub use claude::ClaudeAdapter;
pub use codex::CodexAdapter;
pub use gemini::GeminiAdapter;

use anyhow::Result;
use feedwake_common::BackendType;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::settings::{BackendSection, PermissionMode};
use crate::store::SessionStore;

/// Name the feed tool is registered under in every CLI.
pub const TOOL_NAME: &str = "feed";

/// Variables every child process may inherit.
const BASE_ENV: &[&str] = &["PATH", "HOME", "USER", "LANG", "TERM", "TMPDIR"];

/// Tools permitted in read-only mode regardless of the configured list.
pub const READONLY_TOOLS: &[&str] = &["Read", "Glob", "Grep", "WebSearch", "WebFetch", "mcp__feed"];

/// Inputs for one CLI invocation.
#[derive(Debug, Clone)]
pub struct InvocationRequest<'a> {
    pub prompt: &'a str,
    pub system_prompt: &'a str,
    pub resume_session_id: Option<&'a str>,
    pub permission_mode: PermissionMode,
    pub allowed_tools: &'a [String],
    pub model: Option<&'a str>,
    pub browser: bool,
}

impl InvocationRequest<'_> {
    /// Tool allow-list after applying the permission mode.
    pub fn effective_tools(&self) -> Vec<String> {
        match self.permission_mode {
            PermissionMode::Readonly => self
                .allowed_tools
                .iter()
                .filter(|t| READONLY_TOOLS.contains(&t.as_str()))
                .cloned()
                .collect(),
            PermissionMode::Standard => self.allowed_tools.to_vec(),
            PermissionMode::Unrestricted => Vec::new(),
        }
    }
}

/// Feed tool endpoint to expose to the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolEndpoint {
    pub url: String,
    pub token: Option<String>,
}

pub trait BackendAdapter: Send + Sync {
    fn backend_type(&self) -> BackendType;

    /// Executable to spawn.
    fn program(&self) -> &str;

    /// Make the feed tool available to the CLI. Returns false when the CLI's
    /// configuration already matched and nothing was written.
    fn register_tool(&self, endpoint: &ToolEndpoint) -> Result<bool>;

    fn build_args(&self, request: &InvocationRequest<'_>) -> Vec<String>;

    /// Credential variables passed through in addition to the base set.
    fn credential_vars(&self) -> &'static [&'static str];

    /// Session id announced by one output line, if any.
    fn parse_session_id(&self, line: &str) -> Option<String>;

    /// Assistant text carried by one output line, if any.
    fn parse_text(&self, line: &str) -> Option<String>;

    /// The child's entire environment.
    fn build_env(&self) -> Vec<(String, String)> {
        filtered_env(self.credential_vars(), |name| std::env::var(name).ok())
    }
}

/// Allow-listed variables that are set, in allow-list order.
pub fn filtered_env(
    credentials: &[&str],
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<(String, String)> {
    BASE_ENV
        .iter()
        .chain(credentials.iter())
        .filter_map(|name| lookup(name).map(|value| (name.to_string(), value)))
        .collect()
}

/// Write `content` to `path` unless it already holds exactly that.
pub(crate) fn write_if_changed(path: &Path, content: &str) -> Result<bool> {
    if std::fs::read_to_string(path).is_ok_and(|existing| existing == content) {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(true)
}

/// Build the adapter for one configured backend.
///
/// `data_dir` holds files the worker owns; `home` is where the CLIs keep
/// their own configuration.
pub fn adapter_for(section: &BackendSection, data_dir: &Path, home: &Path) -> Arc<dyn BackendAdapter> {
    let command = section.command();
    match section.kind {
        BackendType::Claude => Arc::new(ClaudeAdapter::new(
            command,
            data_dir.join("mcp").join("claude.json"),
        )),
        BackendType::Codex => Arc::new(CodexAdapter::new(command, codex_home(home))),
        BackendType::Gemini => Arc::new(GeminiAdapter::new(
            command,
            home.join(".gemini").join("settings.json"),
        )),
    }
}

fn codex_home(home: &Path) -> PathBuf {
    match std::env::var("CODEX_HOME") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => home.join(".codex"),
    }
}

/// One configured CLI together with the identity it posts as and the
/// external sessions it has opened.
pub struct BackendAgent {
    pub adapter: Arc<dyn BackendAdapter>,
    pub identity: String,
    pub model: Option<String>,
    pub tool: ToolEndpoint,
    pub sessions: SessionStore,
}

impl BackendAgent {
    pub fn backend_type(&self) -> BackendType {
        self.adapter.backend_type()
    }
}

impl std::fmt::Debug for BackendAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendAgent")
            .field("backend", &self.backend_type())
            .field("identity", &self.identity)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_filtered_env_passes_only_allow_listed_vars() {
        let env = filtered_env(&["ANTHROPIC_API_KEY"], |name| match name {
            "PATH" => Some("/usr/bin".into()),
            "ANTHROPIC_API_KEY" => Some("sk-test".into()),
            "AWS_SECRET_ACCESS_KEY" => Some("leak".into()),
            _ => None,
        });
        assert_eq!(
            env,
            vec![
                ("PATH".to_string(), "/usr/bin".to_string()),
                ("ANTHROPIC_API_KEY".to_string(), "sk-test".to_string()),
            ]
        );
    }

    #[test]
    fn test_readonly_mode_narrows_tools() {
        let tools = vec!["Read".to_string(), "Bash".to_string(), "mcp__feed".to_string()];
        let mut request = InvocationRequest {
            prompt: "p",
            system_prompt: "s",
            resume_session_id: None,
            permission_mode: PermissionMode::Readonly,
            allowed_tools: &tools,
            model: None,
            browser: false,
        };
        assert_eq!(request.effective_tools(), vec!["Read", "mcp__feed"]);
        request.permission_mode = PermissionMode::Standard;
        assert_eq!(request.effective_tools().len(), 3);
        request.permission_mode = PermissionMode::Unrestricted;
        assert!(request.effective_tools().is_empty());
    }

    #[test]
    fn test_write_if_changed_skips_identical_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        assert!(write_if_changed(&path, "{}").unwrap());
        assert!(!write_if_changed(&path, "{}").unwrap());
        assert!(write_if_changed(&path, "{\"a\":1}").unwrap());
    }

    #[test]
    fn test_adapter_for_selects_variant() {
        let dir = tempdir().unwrap();
        for kind in BackendType::ALL {
            let adapter = adapter_for(&BackendSection::new(kind), dir.path(), dir.path());
            assert_eq!(adapter.backend_type(), kind);
            assert_eq!(adapter.program(), kind.as_str());
        }
    }
}
