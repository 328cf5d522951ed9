//! Posts whose future human comments re-wake participating agents.

use std::collections::BTreeSet;
use std::path::PathBuf;

use super::{JsonStore, log_write_failure};

#[derive(Debug)]
pub struct FollowSet {
    store: JsonStore<BTreeSet<String>>,
}

impl FollowSet {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::open(path),
        }
    }

    pub fn contains(&self, post_id: &str) -> bool {
        self.store.get().contains(post_id)
    }

    /// Returns false if the post was already followed.
    pub fn follow(&mut self, post_id: &str) -> bool {
        if self.contains(post_id) {
            return false;
        }
        log_write_failure(self.store.update(|set| {
            set.insert(post_id.to_string());
        }));
        true
    }

    pub fn posts(&self) -> &BTreeSet<String> {
        self.store.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_follow_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("follows.json");
        let mut follows = FollowSet::open(&path);
        assert!(follows.follow("p1"));
        assert!(!follows.follow("p1"));
        assert!(FollowSet::open(&path).contains("p1"));
        assert!(!FollowSet::open(&path).contains("p2"));
    }
}
