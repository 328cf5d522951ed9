//! Reconciliation sweep over recent feed state.
//!
//! Catches what the live stream missed while the worker was offline or busy.
//! Network reads ([`collect`]) are kept apart from trigger derivation
//! ([`sweep_triggers`]) so the scheduling loop can fetch in the background
//! and parse against its current stores.

use chrono::{DateTime, Duration, Utc};
use feedwake_common::{AuthorType, Comment, Post, Trigger};
use tracing::{debug, info, warn};

use super::parser::{ParseContext, parse_post_body, parse_thread};
use crate::errors::FeedError;
use crate::feed::{FeedApi, ListQuery, list_all_comments, list_all_posts};

/// A post and its comments since the sweep horizon, oldest first.
#[derive(Debug, Clone)]
pub struct ThreadSnapshot {
    pub post: Post,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub since: DateTime<Utc>,
    pub threads: Vec<ThreadSnapshot>,
}

pub fn horizon(lookback_hours: i64) -> DateTime<Utc> {
    Utc::now() - Duration::hours(lookback_hours)
}

/// Read every feed's active posts and their comments newer than `since`.
///
/// Posts come from the feed's activity listing, so an old post with a fresh
/// comment is still included. Human comments are fetched first; agent
/// replies are only fetched for threads that can still yield a trigger.
///
/// Only listing the feeds is fatal; a feed or post that fails to load is
/// logged and skipped.
pub async fn collect(api: &dyn FeedApi, since: DateTime<Utc>) -> Result<FeedSnapshot, FeedError> {
    let feeds = api.list_feeds().await?;
    let mut threads = Vec::new();

    for feed in &feeds {
        let posts = match list_all_posts(api, &feed.id, &ListQuery::since(since)).await {
            Ok(posts) => posts,
            Err(e) => {
                warn!(feed_id = %feed.id, error = %e, "Skipping feed in sweep");
                continue;
            }
        };
        for post in posts {
            match thread_since(api, &post, since).await {
                Ok(Some(comments)) => threads.push(ThreadSnapshot { post, comments }),
                Ok(None) => {}
                Err(e) => warn!(post_id = %post.id, error = %e, "Skipping post in sweep"),
            }
        }
    }

    debug!(feeds = feeds.len(), threads = threads.len(), "Sweep snapshot collected");
    Ok(FeedSnapshot { since, threads })
}

/// Comments on `post` since the horizon, or `None` when an old post has no
/// new human comment to answer.
async fn thread_since(
    api: &dyn FeedApi,
    post: &Post,
    since: DateTime<Utc>,
) -> Result<Option<Vec<Comment>>, FeedError> {
    let human = ListQuery::since(since).by(AuthorType::Human);
    let mut comments = list_all_comments(api, &post.id, &human).await?;
    if post.created_at < since && comments.is_empty() {
        return Ok(None);
    }
    let replies = ListQuery::since(since).by(AuthorType::Agent);
    comments.extend(list_all_comments(api, &post.id, &replies).await?);
    comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(Some(comments))
}

/// Derive triggers from a snapshot.
///
/// Comment threads are considered first; a post they resolve is not scanned
/// again for mentions in its body.
pub fn sweep_triggers(snapshot: &FeedSnapshot, ctx: &ParseContext<'_>) -> Vec<Trigger> {
    let mut triggers = Vec::new();
    for thread in &snapshot.threads {
        let recent: Vec<Comment> = thread
            .comments
            .iter()
            .filter(|c| c.created_at >= snapshot.since)
            .cloned()
            .collect();
        let from_comments = parse_thread(&thread.post, &recent, ctx);
        if !from_comments.is_empty() {
            triggers.extend(from_comments);
            continue;
        }
        if thread.post.created_at >= snapshot.since {
            triggers.extend(parse_post_body(&thread.post, &recent, ctx));
        }
    }
    if !triggers.is_empty() {
        info!(count = triggers.len(), "Sweep found pending work");
    }
    triggers
}
