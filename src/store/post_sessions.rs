//! Which backend sessions have replied on which posts.

use feedwake_common::SessionKey;
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{JsonStore, log_write_failure};

#[derive(Debug)]
pub struct PostSessions {
    store: JsonStore<BTreeMap<String, Vec<SessionKey>>>,
}

impl PostSessions {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::open(path),
        }
    }

    /// Participants of `post_id` in the order they first replied.
    pub fn participants(&self, post_id: &str) -> &[SessionKey] {
        self.store
            .get()
            .get(post_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Record that `key` participated in `post_id`. Returns false if already known.
    pub fn record(&mut self, post_id: &str, key: SessionKey) -> bool {
        if self.participants(post_id).contains(&key) {
            return false;
        }
        log_write_failure(self.store.update(|map| {
            map.entry(post_id.to_string()).or_default().push(key);
        }));
        true
    }

    pub fn all(&self) -> &BTreeMap<String, Vec<SessionKey>> {
        self.store.get()
    }
}
