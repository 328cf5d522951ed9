//! Per-backend map from logical session name to the CLI's own session id.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{JsonStore, log_write_failure};

#[derive(Debug)]
pub struct SessionStore {
    store: JsonStore<BTreeMap<String, String>>,
}

impl SessionStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::open(path),
        }
    }

    /// External session id to resume for `session_name`, if one was recorded.
    pub fn get(&self, session_name: &str) -> Option<&str> {
        self.store.get().get(session_name).map(String::as_str)
    }

    pub fn set(&mut self, session_name: &str, session_id: &str) {
        log_write_failure(self.store.update(|map| {
            map.insert(session_name.to_string(), session_id.to_string());
        }));
    }

    /// Forget a session whose resume failed so the next attempt starts fresh.
    pub fn clear(&mut self, session_name: &str) -> bool {
        if !self.store.get().contains_key(session_name) {
            return false;
        }
        let mut removed = false;
        log_write_failure(self.store.update(|map| removed = map.remove(session_name).is_some()));
        removed
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        self.store.get()
    }
}
