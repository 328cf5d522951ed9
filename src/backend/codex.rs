//! OpenAI Codex CLI (`codex exec --json`).
//!
//! Codex has no system-prompt flag, so the policy text is prepended to the
//! prompt. Tools are registered under `[mcp_servers.feed]` in Codex's own
//! `config.toml`, leaving every other key untouched.

use anyhow::{Context, Result};
use feedwake_common::BackendType;
use serde::Deserialize;
use std::path::PathBuf;

use super::{BackendAdapter, InvocationRequest, TOOL_NAME, ToolEndpoint, write_if_changed};
use crate::settings::PermissionMode;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum CodexEvent {
    #[serde(rename = "thread.started")]
    ThreadStarted { thread_id: String },

    #[serde(rename = "item.completed")]
    ItemCompleted { item: CodexItem },

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct CodexItem {
    #[serde(rename = "type", alias = "item_type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

pub struct CodexAdapter {
    command: String,
    codex_home: PathBuf,
}

impl CodexAdapter {
    pub fn new(command: String, codex_home: PathBuf) -> Self {
        Self {
            command,
            codex_home,
        }
    }

    fn config_path(&self) -> PathBuf {
        self.codex_home.join("config.toml")
    }

    fn parse(line: &str) -> Option<CodexEvent> {
        serde_json::from_str(line.trim()).ok()
    }
}

impl BackendAdapter for CodexAdapter {
    fn backend_type(&self) -> BackendType {
        BackendType::Codex
    }

    fn program(&self) -> &str {
        &self.command
    }

    fn register_tool(&self, endpoint: &ToolEndpoint) -> Result<bool> {
        let path = self.config_path();
        let mut config = match std::fs::read_to_string(&path) {
            Ok(content) => content
                .parse::<toml::Table>()
                .with_context(|| format!("Failed to parse {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => toml::Table::new(),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };

        let mut server = toml::Table::new();
        server.insert("url".into(), toml::Value::String(endpoint.url.clone()));
        if let Some(token) = &endpoint.token {
            let mut headers = toml::Table::new();
            headers.insert(
                "Authorization".into(),
                toml::Value::String(format!("Bearer {}", token)),
            );
            server.insert("http_headers".into(), toml::Value::Table(headers));
        }
        let server = toml::Value::Table(server);

        let servers = config
            .entry("mcp_servers")
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        let Some(servers) = servers.as_table_mut() else {
            anyhow::bail!("mcp_servers in {} is not a table", path.display());
        };
        if servers.get(TOOL_NAME) == Some(&server) {
            return Ok(false);
        }
        servers.insert(TOOL_NAME.to_string(), server);

        let content = toml::to_string_pretty(&config).context("Failed to serialize Codex config")?;
        write_if_changed(&path, &content)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    fn build_args(&self, request: &InvocationRequest<'_>) -> Vec<String> {
        let mut args = vec!["exec".to_string()];
        if let Some(id) = request.resume_session_id {
            args.push("resume".to_string());
            args.push(id.to_string());
        }
        args.push("--json".to_string());
        args.push("--skip-git-repo-check".to_string());
        match request.permission_mode {
            PermissionMode::Readonly => {
                args.push("--sandbox".to_string());
                args.push("read-only".to_string());
            }
            PermissionMode::Standard => {
                args.push("--sandbox".to_string());
                args.push("workspace-write".to_string());
            }
            PermissionMode::Unrestricted => {
                args.push("--dangerously-bypass-approvals-and-sandbox".to_string());
            }
        }
        if let Some(model) = request.model {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        args.push(format!("{}\n\n{}", request.system_prompt, request.prompt));
        args
    }

    fn credential_vars(&self) -> &'static [&'static str] {
        &["OPENAI_API_KEY", "CODEX_HOME"]
    }

    fn parse_session_id(&self, line: &str) -> Option<String> {
        match Self::parse(line)? {
            CodexEvent::ThreadStarted { thread_id } => Some(thread_id),
            _ => None,
        }
    }

    fn parse_text(&self, line: &str) -> Option<String> {
        match Self::parse(line)? {
            CodexEvent::ItemCompleted { item } if item.kind == "agent_message" => {
                item.text.filter(|t| !t.trim().is_empty())
            }
            _ => None,
        }
    }
}
