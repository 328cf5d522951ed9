//! `@identity[/session]` references in post and comment text.

use feedwake_common::DEFAULT_SESSION;
use regex::Regex;
use std::sync::LazyLock;

// Identity token (inner dots allowed, trailing dot is punctuation) plus
// optional session suffix
static MENTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@([A-Za-z0-9_-]+(?:\.[A-Za-z0-9_-]+)*)(?:/([A-Za-z0-9_-]+))?").unwrap()
});

/// One mention found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    /// Identity exactly as written.
    pub identity: String,
    /// Lowercased session name, `default` when no suffix was given.
    pub session_name: String,
}

/// Every mention in `text`, in order of appearance.
///
/// A token preceded by a word character (`bob@alice`, an email address) is
/// not a mention.
pub fn find_mentions(text: &str) -> Vec<Mention> {
    let mut mentions = Vec::new();
    for cap in MENTION_REGEX.captures_iter(text) {
        let Some(whole) = cap.get(0) else { continue };
        let preceded_by_word = text[..whole.start()]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || c == '_');
        if preceded_by_word {
            continue;
        }
        let Some(identity) = cap.get(1) else { continue };
        let session_name = cap
            .get(2)
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_else(|| DEFAULT_SESSION.to_string());
        mentions.push(Mention {
            identity: identity.as_str().to_string(),
            session_name,
        });
    }
    mentions
}

/// Session names `identity` is addressed under in `text`, deduplicated.
///
/// Matching is case-insensitive and whole-token: `@alicebob` does not
/// address `alice`.
pub fn sessions_addressed(text: &str, identity: &str) -> Vec<String> {
    let mut sessions: Vec<String> = Vec::new();
    for mention in find_mentions(text) {
        if mention.identity.eq_ignore_ascii_case(identity)
            && !sessions.contains(&mention.session_name)
        {
            sessions.push(mention.session_name);
        }
    }
    sessions
}
