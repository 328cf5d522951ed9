use serde::{Deserialize, Serialize};

use crate::backend::{BackendType, SessionKey};

/// Why an agent is being woken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Mention,
    OwnPostComment,
    ThreadFollowUp,
}

impl TriggerType {
    /// Lower is stronger. Reconciliation sweeps keep only the strongest type per post.
    pub fn priority(&self) -> u8 {
        match self {
            TriggerType::Mention => 0,
            TriggerType::OwnPostComment => 1,
            TriggerType::ThreadFollowUp => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Mention => "mention",
            TriggerType::OwnPostComment => "own_post_comment",
            TriggerType::ThreadFollowUp => "thread_follow_up",
        }
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending unit of work: "this backend session should respond to this content".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub trigger_type: TriggerType,
    /// Dedup and retry key. Unique per (source content, target session).
    pub event_id: String,
    /// Id of the post or comment that produced this trigger.
    pub source_id: String,
    pub feed_id: String,
    pub post_id: String,
    pub content: String,
    pub author_name: String,
    pub author_is_bot: bool,
    pub session_name: String,
    pub backend_type: BackendType,
}

impl Trigger {
    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(self.backend_type, self.session_name.clone())
    }

    /// Build the event id for a trigger aimed at `key` from content `source_id`.
    pub fn event_id_for(source_id: &str, key: &SessionKey) -> String {
        format!("{}#{}/{}", source_id, key.backend, key.session_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_mention_first() {
        assert!(TriggerType::Mention.priority() < TriggerType::OwnPostComment.priority());
        assert!(TriggerType::OwnPostComment.priority() < TriggerType::ThreadFollowUp.priority());
    }

    #[test]
    fn event_id_includes_target_session() {
        let key = SessionKey::new(BackendType::Claude, "research");
        assert_eq!(Trigger::event_id_for("c42", &key), "c42#claude/research");
    }
}
