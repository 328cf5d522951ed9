//! Claude Code CLI (`claude -p --output-format stream-json`).

use anyhow::{Context, Result};
use feedwake_common::BackendType;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;

use super::{BackendAdapter, InvocationRequest, TOOL_NAME, ToolEndpoint, write_if_changed};
use crate::settings::PermissionMode;

/// Events from Claude CLI's stream-json output format
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "system")]
    System {
        subtype: String,
        #[serde(default)]
        session_id: Option<String>,
    },

    #[serde(rename = "assistant")]
    Assistant { message: AssistantMessage },

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(other)]
    Other,
}

pub struct ClaudeAdapter {
    command: String,
    mcp_config: PathBuf,
}

impl ClaudeAdapter {
    pub fn new(command: String, mcp_config: PathBuf) -> Self {
        Self {
            command,
            mcp_config,
        }
    }

    fn parse(line: &str) -> Option<StreamEvent> {
        serde_json::from_str(line.trim()).ok()
    }
}

impl BackendAdapter for ClaudeAdapter {
    fn backend_type(&self) -> BackendType {
        BackendType::Claude
    }

    fn program(&self) -> &str {
        &self.command
    }

    fn register_tool(&self, endpoint: &ToolEndpoint) -> Result<bool> {
        let mut server = json!({ "type": "http", "url": endpoint.url });
        if let Some(token) = &endpoint.token {
            server["headers"] = json!({ "Authorization": format!("Bearer {}", token) });
        }
        let mut servers = serde_json::Map::new();
        servers.insert(TOOL_NAME.to_string(), server);
        let config = json!({ "mcpServers": servers });
        let content = serde_json::to_string_pretty(&config)?;
        write_if_changed(&self.mcp_config, &content)
            .with_context(|| format!("Failed to write {}", self.mcp_config.display()))
    }

    fn build_args(&self, request: &InvocationRequest<'_>) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            request.prompt.to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--append-system-prompt".to_string(),
            request.system_prompt.to_string(),
        ];
        if self.mcp_config.exists() {
            args.push("--mcp-config".to_string());
            args.push(self.mcp_config.display().to_string());
        }
        if let Some(id) = request.resume_session_id {
            args.push("--resume".to_string());
            args.push(id.to_string());
        }
        match request.permission_mode {
            PermissionMode::Unrestricted => args.push("--dangerously-skip-permissions".to_string()),
            mode => {
                if mode == PermissionMode::Readonly {
                    args.push("--permission-mode".to_string());
                    args.push("plan".to_string());
                }
                let tools = request.effective_tools();
                if !tools.is_empty() {
                    args.push("--allowedTools".to_string());
                    args.push(tools.join(","));
                }
            }
        }
        if let Some(model) = request.model {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        if request.browser {
            args.push("--chrome".to_string());
        }
        args
    }

    fn credential_vars(&self) -> &'static [&'static str] {
        &["ANTHROPIC_API_KEY", "CLAUDE_CODE_OAUTH_TOKEN", "CLAUDE_CONFIG_DIR"]
    }

    fn parse_session_id(&self, line: &str) -> Option<String> {
        match Self::parse(line)? {
            StreamEvent::System {
                subtype,
                session_id,
            } if subtype == "init" => session_id,
            _ => None,
        }
    }

    fn parse_text(&self, line: &str) -> Option<String> {
        let StreamEvent::Assistant { message } = Self::parse(line)? else {
            return None;
        };
        let text: Vec<String> = message
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } if !text.trim().is_empty() => Some(text),
                _ => None,
            })
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text.join("\n"))
        }
    }
}
