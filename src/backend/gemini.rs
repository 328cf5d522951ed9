//! Google Gemini CLI (`gemini -p --output-format stream-json`).

use anyhow::{Context, Result};
use feedwake_common::BackendType;
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::PathBuf;

use super::{BackendAdapter, InvocationRequest, TOOL_NAME, ToolEndpoint, write_if_changed};
use crate::settings::PermissionMode;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeminiEvent {
    #[serde(rename = "init")]
    Init { session_id: String },

    #[serde(rename = "message")]
    Message {
        #[serde(default)]
        role: String,
        #[serde(default)]
        content: String,
    },

    #[serde(other)]
    Other,
}

pub struct GeminiAdapter {
    command: String,
    settings_path: PathBuf,
}

impl GeminiAdapter {
    pub fn new(command: String, settings_path: PathBuf) -> Self {
        Self {
            command,
            settings_path,
        }
    }

    fn parse(line: &str) -> Option<GeminiEvent> {
        serde_json::from_str(line.trim()).ok()
    }
}

impl BackendAdapter for GeminiAdapter {
    fn backend_type(&self) -> BackendType {
        BackendType::Gemini
    }

    fn program(&self) -> &str {
        &self.command
    }

    fn register_tool(&self, endpoint: &ToolEndpoint) -> Result<bool> {
        let path = &self.settings_path;
        let mut settings: Value = match std::fs::read_to_string(path) {
            Ok(content) if !content.trim().is_empty() => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?,
            Ok(_) => json!({}),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => json!({}),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };
        let Some(root) = settings.as_object_mut() else {
            anyhow::bail!("{} is not a JSON object", path.display());
        };

        let mut server = json!({ "httpUrl": endpoint.url });
        if let Some(token) = &endpoint.token {
            server["headers"] = json!({ "Authorization": format!("Bearer {}", token) });
        }

        let servers = root.entry("mcpServers").or_insert_with(|| json!({}));
        let Some(servers) = servers.as_object_mut() else {
            anyhow::bail!("mcpServers in {} is not an object", path.display());
        };
        if servers.get(TOOL_NAME) == Some(&server) {
            return Ok(false);
        }
        servers.insert(TOOL_NAME.to_string(), server);

        let content = serde_json::to_string_pretty(&settings)?;
        write_if_changed(path, &content).with_context(|| format!("Failed to write {}", path.display()))
    }

    fn build_args(&self, request: &InvocationRequest<'_>) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            format!("{}\n\n{}", request.system_prompt, request.prompt),
            "--output-format".to_string(),
            "stream-json".to_string(),
        ];
        if let Some(id) = request.resume_session_id {
            args.push("--resume".to_string());
            args.push(id.to_string());
        }
        match request.permission_mode {
            PermissionMode::Unrestricted => args.push("--yolo".to_string()),
            mode => {
                args.push("--approval-mode".to_string());
                args.push(if mode == PermissionMode::Readonly { "default" } else { "auto_edit" }.to_string());
                let tools = request.effective_tools();
                if !tools.is_empty() {
                    args.push("--allowed-tools".to_string());
                    args.push(tools.join(","));
                }
            }
        }
        if let Some(model) = request.model {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        args
    }

    fn credential_vars(&self) -> &'static [&'static str] {
        &["GEMINI_API_KEY", "GOOGLE_API_KEY", "GOOGLE_CLOUD_PROJECT", "GOOGLE_APPLICATION_CREDENTIALS"]
    }

    fn parse_session_id(&self, line: &str) -> Option<String> {
        match Self::parse(line)? {
            GeminiEvent::Init { session_id } => Some(session_id),
            _ => None,
        }
    }

    fn parse_text(&self, line: &str) -> Option<String> {
        match Self::parse(line)? {
            GeminiEvent::Message { role, content } if role == "assistant" && !content.is_empty() => {
                Some(content)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_init_and_assistant_message() {
        let a = GeminiAdapter::new("gemini".into(), PathBuf::from("/nonexistent"));
        let init = r#"{"type":"init","timestamp":"2026-01-01T00:00:00Z","session_id":"g-7","model":"gemini-2.5-pro"}"#;
        assert_eq!(a.parse_session_id(init).as_deref(), Some("g-7"));
        let msg = r#"{"type":"message","role":"assistant","content":"Looking now","delta":true}"#;
        assert_eq!(a.parse_text(msg).as_deref(), Some("Looking now"));
        let user = r#"{"type":"message","role":"user","content":"prompt echo"}"#;
        assert!(a.parse_text(user).is_none());
    }

    #[test]
    fn test_args_by_permission_mode() {
        let a = GeminiAdapter::new("gemini".into(), PathBuf::from("/nonexistent"));
        let tools = vec!["Read".to_string(), "Shell".to_string()];
        let mut req = InvocationRequest {
            prompt: "go",
            system_prompt: "POLICY",
            resume_session_id: Some("g-7"),
            permission_mode: PermissionMode::Readonly,
            allowed_tools: &tools,
            model: Some("gemini-2.5-pro"),
            browser: false,
        };
        let args = a.build_args(&req);
        assert_eq!(args[1], "POLICY\n\ngo");
        assert!(args.windows(2).any(|w| w == ["--resume", "g-7"]));
        assert!(args.windows(2).any(|w| w == ["--approval-mode", "default"]));
        assert!(args.windows(2).any(|w| w == ["--allowed-tools", "Read"]));

        req.permission_mode = PermissionMode::Unrestricted;
        let args = a.build_args(&req);
        assert!(args.contains(&"--yolo".to_string()));
        assert!(!args.contains(&"--approval-mode".to_string()));
    }

    #[test]
    fn test_register_tool_merges_into_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"theme":"dark"}"#).unwrap();
        let a = GeminiAdapter::new("gemini".into(), path.clone());
        let endpoint = ToolEndpoint {
            url: "http://feed/mcp".into(),
            token: Some("abc".into()),
        };
        assert!(a.register_tool(&endpoint).unwrap());
        assert!(!a.register_tool(&endpoint).unwrap());

        let value: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["theme"], "dark");
        assert_eq!(value["mcpServers"]["feed"]["httpUrl"], "http://feed/mcp");
    }
}
