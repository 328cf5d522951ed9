//! Cache of resolved feed identities, keyed by backend name.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{JsonStore, log_write_failure};

#[derive(Debug)]
pub struct IdentityRegistry {
    store: JsonStore<BTreeMap<String, String>>,
}

impl IdentityRegistry {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::open(path),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.store.get().get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: &str, identity: &str) {
        if self.get(name) == Some(identity) {
            return;
        }
        log_write_failure(self.store.update(|map| {
            map.insert(name.to_string(), identity.to_string());
        }));
    }
}
