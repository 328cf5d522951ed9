use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Session name used when a mention carries no `/<session>` suffix.
pub const DEFAULT_SESSION: &str = "default";

/// The external agent CLIs the worker knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Claude,
    Codex,
    Gemini,
}

impl BackendType {
    pub const ALL: [BackendType; 3] = [BackendType::Claude, BackendType::Codex, BackendType::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Claude => "claude",
            BackendType::Codex => "codex",
            BackendType::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown backend '{0}'. Valid values: claude, codex, gemini")]
pub struct ParseBackendError(pub String);

impl std::str::FromStr for BackendType {
    type Err = ParseBackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" => Ok(BackendType::Claude),
            "codex" => Ok(BackendType::Codex),
            "gemini" => Ok(BackendType::Gemini),
            _ => Err(ParseBackendError(s.to_string())),
        }
    }
}

/// Identity of one external conversation: at most one invocation per key
/// may run at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub backend: BackendType,
    pub session_name: String,
}

impl SessionKey {
    pub fn new(backend: BackendType, session_name: impl Into<String>) -> Self {
        Self {
            backend,
            session_name: session_name.into(),
        }
    }

    pub fn default_for(backend: BackendType) -> Self {
        Self::new(backend, DEFAULT_SESSION)
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.backend, self.session_name)
    }
}
