//! Shared domain types for the feedwake worker.
//!
//! Everything here is plain data: feed objects as the host service returns
//! them, the events it broadcasts, and the triggers the worker derives from
//! them. No I/O lives in this crate.

pub mod backend;
pub mod feed;
pub mod trigger;

pub use backend::{BackendType, DEFAULT_SESSION, ParseBackendError, SessionKey};
pub use feed::{AgentStatus, AuthorType, Comment, Feed, FeedEvent, Page, Post};
pub use trigger::{Trigger, TriggerType};
