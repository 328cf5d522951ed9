//! Turns feed events and thread histories into triggers.
//!
//! Rules, strongest first:
//! 1. **Mention**: `@identity[/session]`, matched against every configured
//!    identity independently. Self-mentions are ignored.
//! 2. **Own-post comment**: a comment on a post authored by a configured
//!    identity, written by someone else, with no mention.
//! 3. **Thread follow-up**: a human comment on a followed post, with no
//!    mention and no own-post match. Wakes every recorded participant.
//!
//! Bot-authored content only ever yields mentions.

use chrono::{DateTime, Utc};
use feedwake_common::{
    BackendType, Comment, FeedEvent, Post, SessionKey, Trigger, TriggerType,
};

use super::mention::{find_mentions, sessions_addressed};
use crate::store::{FollowSet, PostSessions};

/// One configured backend and the feed identity it posts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub backend: BackendType,
    pub identity: String,
}

/// Configured backends in configuration order. The first one is the
/// fallback target when nothing more specific is known.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn new(entries: Vec<RosterEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn identity_of(&self, backend: BackendType) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.backend == backend)
            .map(|e| e.identity.as_str())
    }

    /// Backends posting as `name`.
    pub fn backends_for(&self, name: &str) -> Vec<BackendType> {
        self.entries
            .iter()
            .filter(|e| e.identity.eq_ignore_ascii_case(name))
            .map(|e| e.backend)
            .collect()
    }

    pub fn is_own(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.identity.eq_ignore_ascii_case(name))
    }

    pub fn default_backend(&self) -> Option<BackendType> {
        self.entries.first().map(|e| e.backend)
    }

    fn contains_backend(&self, backend: BackendType) -> bool {
        self.entries.iter().any(|e| e.backend == backend)
    }

    /// True if `text` mentions any configured identity.
    fn mentioned_in(&self, text: &str) -> bool {
        find_mentions(text)
            .iter()
            .any(|m| self.is_own(&m.identity))
    }
}

/// Everything the parser consults besides the content itself.
pub struct ParseContext<'a> {
    pub roster: &'a Roster,
    pub follows: &'a FollowSet,
    pub post_sessions: &'a PostSessions,
}

/// A post or comment viewed as trigger source material.
#[derive(Debug, Clone)]
pub struct Source<'a> {
    pub id: &'a str,
    pub feed_id: &'a str,
    pub post_id: &'a str,
    pub content: &'a str,
    pub author_name: &'a str,
    pub author_is_bot: bool,
    pub created_at: DateTime<Utc>,
}

impl<'a> Source<'a> {
    pub fn from_post(post: &'a Post, roster: &Roster) -> Self {
        Self {
            id: &post.id,
            feed_id: &post.feed_id,
            post_id: &post.id,
            content: &post.content,
            author_name: &post.author_name,
            author_is_bot: post.author_type.is_bot() || roster.is_own(&post.author_name),
            created_at: post.created_at,
        }
    }

    pub fn from_comment(comment: &'a Comment, roster: &Roster) -> Self {
        Self {
            id: &comment.id,
            feed_id: &comment.feed_id,
            post_id: &comment.post_id,
            content: &comment.content,
            author_name: &comment.author_name,
            author_is_bot: comment.author_type.is_bot() || roster.is_own(&comment.author_name),
            created_at: comment.created_at,
        }
    }

    fn trigger(&self, trigger_type: TriggerType, key: SessionKey) -> Trigger {
        Trigger {
            trigger_type,
            event_id: Trigger::event_id_for(self.id, &key),
            source_id: self.id.to_string(),
            feed_id: self.feed_id.to_string(),
            post_id: self.post_id.to_string(),
            content: self.content.to_string(),
            author_name: self.author_name.to_string(),
            author_is_bot: self.author_is_bot,
            session_name: key.session_name,
            backend_type: key.backend,
        }
    }
}

/// Live-stream parsing: every matching backend gets its own trigger.
pub fn parse_event(event: &FeedEvent, ctx: &ParseContext<'_>) -> Vec<Trigger> {
    match event {
        FeedEvent::PostCreated { post, .. } => {
            mention_triggers(&Source::from_post(post, ctx.roster), ctx.roster)
        }
        FeedEvent::CommentCreated {
            comment,
            post_created_by,
            ..
        } => parse_comment(
            &Source::from_comment(comment, ctx.roster),
            post_created_by.as_deref(),
            ctx,
        ),
        FeedEvent::Heartbeat => Vec::new(),
    }
}

/// Apply all three rules to one comment. `post_owner` is the author of the
/// parent post, when known.
pub fn parse_comment(
    source: &Source<'_>,
    post_owner: Option<&str>,
    ctx: &ParseContext<'_>,
) -> Vec<Trigger> {
    let mentions = mention_triggers(source, ctx.roster);
    if !mentions.is_empty() || ctx.roster.mentioned_in(source.content) {
        return mentions;
    }
    if source.author_is_bot {
        return Vec::new();
    }

    if let Some(owner) = post_owner
        && let Some(key) = own_post_target(owner, source, ctx)
    {
        return vec![source.trigger(TriggerType::OwnPostComment, key)];
    }

    if ctx.follows.contains(source.post_id) {
        return follow_up_targets(source.post_id, ctx)
            .into_iter()
            .map(|key| source.trigger(TriggerType::ThreadFollowUp, key))
            .collect();
    }

    Vec::new()
}

/// One trigger per (identity, session) addressed in the source, skipping
/// self-mentions.
pub fn mention_triggers(source: &Source<'_>, roster: &Roster) -> Vec<Trigger> {
    let mut triggers = Vec::new();
    for entry in roster.entries() {
        if entry.identity.eq_ignore_ascii_case(source.author_name) {
            continue;
        }
        for session in sessions_addressed(source.content, &entry.identity) {
            triggers.push(
                source.trigger(TriggerType::Mention, SessionKey::new(entry.backend, session)),
            );
        }
    }
    triggers
}

fn own_post_target(owner: &str, source: &Source<'_>, ctx: &ParseContext<'_>) -> Option<SessionKey> {
    if owner.eq_ignore_ascii_case(source.author_name) {
        return None;
    }
    let backends = ctx.roster.backends_for(owner);
    let first = *backends.first()?;
    let recorded = ctx
        .post_sessions
        .participants(source.post_id)
        .iter()
        .find(|key| backends.contains(&key.backend))
        .cloned();
    Some(recorded.unwrap_or_else(|| SessionKey::default_for(first)))
}

fn follow_up_targets(post_id: &str, ctx: &ParseContext<'_>) -> Vec<SessionKey> {
    let participants: Vec<SessionKey> = ctx
        .post_sessions
        .participants(post_id)
        .iter()
        .filter(|key| ctx.roster.contains_backend(key.backend))
        .cloned()
        .collect();
    if !participants.is_empty() {
        return participants;
    }
    ctx.roster
        .default_backend()
        .map(|backend| vec![SessionKey::default_for(backend)])
        .unwrap_or_default()
}

/// Reconciliation parsing of one thread.
///
/// Each human comment is evaluated with the live rules, then targets that
/// already replied after it are dropped. Of what remains only the strongest
/// trigger type survives, taken from the latest comment carrying it.
pub fn parse_thread(post: &Post, comments: &[Comment], ctx: &ParseContext<'_>) -> Vec<Trigger> {
    let mut best: Option<(u8, DateTime<Utc>, Vec<Trigger>)> = None;

    for comment in comments {
        let source = Source::from_comment(comment, ctx.roster);
        if source.author_is_bot {
            continue;
        }
        let triggers: Vec<Trigger> = parse_comment(&source, Some(&post.author_name), ctx)
            .into_iter()
            .filter(|t| !has_replied_after(t.backend_type, comment.created_at, comments, ctx.roster))
            .collect();
        let Some(first) = triggers.first() else {
            continue;
        };
        let priority = first.trigger_type.priority();
        let stronger = match &best {
            None => true,
            Some((p, at, _)) => priority < *p || (priority == *p && comment.created_at >= *at),
        };
        if stronger {
            best = Some((priority, comment.created_at, triggers));
        }
    }

    best.map(|(_, _, triggers)| triggers).unwrap_or_default()
}

/// Mention triggers from a post body whose targets have not commented since.
pub fn parse_post_body(post: &Post, comments: &[Comment], ctx: &ParseContext<'_>) -> Vec<Trigger> {
    mention_triggers(&Source::from_post(post, ctx.roster), ctx.roster)
        .into_iter()
        .filter(|t| !has_replied_after(t.backend_type, post.created_at, comments, ctx.roster))
        .collect()
}

fn has_replied_after(
    backend: BackendType,
    after: DateTime<Utc>,
    comments: &[Comment],
    roster: &Roster,
) -> bool {
    let Some(identity) = roster.identity_of(backend) else {
        return false;
    };
    comments
        .iter()
        .any(|c| c.created_at > after && c.author_name.eq_ignore_ascii_case(identity))
}
