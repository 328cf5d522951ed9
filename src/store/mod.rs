//! Durable, write-through JSON documents.
//!
//! Every persisted piece of worker state sits on [`JsonStore`]: it loads on
//! construction (a missing or unreadable file yields the default value) and
//! rewrites the whole document after every mutation. Only the scheduling
//! flow mutates stores, so there is no locking beyond an atomic rename.

pub mod follows;
pub mod identity;
pub mod post_sessions;
pub mod queue;
pub mod sessions;

pub use follows::FollowSet;
pub use identity::IdentityRegistry;
pub use post_sessions::PostSessions;
pub use queue::TriggerQueue;
pub use sessions::SessionStore;

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::errors::StoreError;

#[derive(Debug)]
pub struct JsonStore<T> {
    path: PathBuf,
    value: T,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Load `path`. Absence is silent; a corrupt document is logged and replaced
    /// by the default on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let value = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => T::default(),
            Ok(content) => match serde_json::from_str(&content) {
                Ok(value) => value,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt store document, starting empty");
                    T::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable store document, starting empty");
                T::default()
            }
        };
        Self { path, value }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `f` and persist the result. The in-memory value is updated even
    /// when the write fails.
    pub fn update<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> Result<R, StoreError> {
        let result = f(&mut self.value);
        self.save()?;
        Ok(result)
    }

    fn save(&self) -> Result<(), StoreError> {
        let content =
            serde_json::to_string_pretty(&self.value).map_err(|source| StoreError::Serialize {
                path: self.path.clone(),
                source,
            })?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

/// Log a failed write without interrupting the caller.
pub(crate) fn log_write_failure(result: Result<(), StoreError>) {
    if let Err(e) = result {
        warn!(error = %e, "Failed to persist store");
    }
}
