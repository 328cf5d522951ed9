//! Objects exchanged with the host feed service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a post or comment was written by a person or an agent account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorType {
    #[default]
    Human,
    Agent,
}

impl AuthorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorType::Human => "human",
            AuthorType::Agent => "agent",
        }
    }

    pub fn is_bot(&self) -> bool {
        matches!(self, AuthorType::Agent)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub feed_id: String,
    pub author_name: String,
    #[serde(default)]
    pub author_type: AuthorType,
    #[serde(default)]
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub feed_id: String,
    pub author_name: String,
    #[serde(default)]
    pub author_type: AuthorType,
    #[serde(default)]
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }
}

/// Events broadcast on the feed's event stream.
///
/// `event_id` is the server-assigned replay id, when the server sends one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    PostCreated {
        #[serde(default)]
        event_id: Option<String>,
        post: Post,
    },
    CommentCreated {
        #[serde(default)]
        event_id: Option<String>,
        comment: Comment,
        /// Author identity of the parent post.
        #[serde(default)]
        post_created_by: Option<String>,
    },
    Heartbeat,
}

impl FeedEvent {
    pub fn event_id(&self) -> Option<&str> {
        match self {
            FeedEvent::PostCreated { event_id, .. } | FeedEvent::CommentCreated { event_id, .. } => {
                event_id.as_deref()
            }
            FeedEvent::Heartbeat => None,
        }
    }

    /// Fill in the replay id from the transport frame when the payload lacks one.
    pub fn with_frame_id(mut self, frame_id: Option<String>) -> Self {
        match &mut self {
            FeedEvent::PostCreated { event_id, .. } | FeedEvent::CommentCreated { event_id, .. } => {
                if event_id.is_none() {
                    *event_id = frame_id;
                }
            }
            FeedEvent::Heartbeat => {}
        }
        self
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, FeedEvent::Heartbeat)
    }
}

/// Presence status an agent reports while working on a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Thinking,
    Idle,
}
