//! Everything the worker consumes from the host feed service.
//!
//! - [`FeedApi`]: the outbound REST surface, as a trait so scheduling code
//!   can be tested against a mock. [`FeedClient`] is the reqwest implementation.
//! - [`EventStream`]: the reconnecting subscription to the event broadcast.

pub mod client;
pub mod sse;
pub mod stream;

pub use client::FeedClient;
pub use stream::{Backoff, EventStream, ReplayFilter};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feedwake_common::{AgentStatus, AuthorType, BackendType, Comment, Feed, Page, Post};

use crate::errors::FeedError;

/// Upper bound on pages fetched by the listing helpers.
const MAX_PAGES: usize = 50;

/// Filters for post and comment listings.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub cursor: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub author_type: Option<AuthorType>,
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn since(since: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            ..Default::default()
        }
    }

    pub fn by(self, author_type: AuthorType) -> Self {
        Self {
            author_type: Some(author_type),
            ..self
        }
    }

    pub fn with_cursor(&self, cursor: Option<String>) -> Self {
        Self {
            cursor,
            ..self.clone()
        }
    }
}

#[async_trait]
pub trait FeedApi: Send + Sync {
    async fn list_feeds(&self) -> Result<Vec<Feed>, FeedError>;

    async fn list_posts(&self, feed_id: &str, query: &ListQuery) -> Result<Page<Post>, FeedError>;

    async fn list_comments(
        &self,
        post_id: &str,
        query: &ListQuery,
    ) -> Result<Page<Comment>, FeedError>;

    async fn set_status(
        &self,
        identity: &str,
        status: AgentStatus,
        post_id: Option<&str>,
    ) -> Result<(), FeedError>;

    async fn report_session(
        &self,
        identity: &str,
        session_name: &str,
        backend: BackendType,
        session_id: &str,
    ) -> Result<(), FeedError>;

    /// Resolve the feed identity that `backend` posts as.
    async fn whoami(&self, backend: BackendType) -> Result<String, FeedError>;
}

/// Every post in `feed_id` matching `query`, following cursors.
pub async fn list_all_posts(
    api: &dyn FeedApi,
    feed_id: &str,
    query: &ListQuery,
) -> Result<Vec<Post>, FeedError> {
    let mut posts = Vec::new();
    let mut cursor = query.cursor.clone();
    for _ in 0..MAX_PAGES {
        let page = api.list_posts(feed_id, &query.with_cursor(cursor)).await?;
        posts.extend(page.items);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    Ok(posts)
}

/// Every comment on `post_id` matching `query`, oldest first.
pub async fn list_all_comments(
    api: &dyn FeedApi,
    post_id: &str,
    query: &ListQuery,
) -> Result<Vec<Comment>, FeedError> {
    let mut comments = Vec::new();
    let mut cursor = query.cursor.clone();
    for _ in 0..MAX_PAGES {
        let page = api.list_comments(post_id, &query.with_cursor(cursor)).await?;
        comments.extend(page.items);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(comments)
}

/// The `count` most recent comments on `post_id`, oldest first.
///
/// Comment pages are served newest first, so one capped page holds them.
pub async fn recent_comments(
    api: &dyn FeedApi,
    post_id: &str,
    count: usize,
) -> Result<Vec<Comment>, FeedError> {
    let query = ListQuery {
        limit: Some(count),
        ..Default::default()
    };
    let mut comments = api.list_comments(post_id, &query).await?.items;
    comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    if comments.len() > count {
        comments.drain(..comments.len() - count);
    }
    Ok(comments)
}
