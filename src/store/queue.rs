//! Persisted, deduplicating list of pending triggers.

use feedwake_common::Trigger;
use std::path::PathBuf;
use tracing::debug;

use super::{JsonStore, log_write_failure};

/// Outcome of [`TriggerQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// An older request for the same post and backend was replaced.
    Superseded,
    /// The event id is already queued.
    Duplicate,
}

#[derive(Debug)]
pub struct TriggerQueue {
    store: JsonStore<Vec<Trigger>>,
}

impl TriggerQueue {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::open(path),
        }
    }

    /// Queue `trigger` unless its event id is already present.
    ///
    /// Pending entries for the same post and backend that came from different
    /// content are dropped first, so only the newest request survives. Entries
    /// fanned out from the same content (several sessions of one backend) are kept.
    pub fn push(&mut self, trigger: Trigger) -> PushOutcome {
        if self
            .store
            .get()
            .iter()
            .any(|t| t.event_id == trigger.event_id)
        {
            debug!(event_id = %trigger.event_id, "Trigger already queued");
            return PushOutcome::Duplicate;
        }

        let result = self.store.update(|queue| {
            let before = queue.len();
            queue.retain(|t| {
                !(t.post_id == trigger.post_id
                    && t.backend_type == trigger.backend_type
                    && t.source_id != trigger.source_id)
            });
            let superseded = queue.len() != before;
            queue.push(trigger);
            superseded
        });

        match result {
            Ok(true) => PushOutcome::Superseded,
            Ok(false) => PushOutcome::Queued,
            Err(e) => {
                log_write_failure(Err(e));
                PushOutcome::Queued
            }
        }
    }

    /// Take every pending trigger, leaving the persisted queue empty.
    pub fn drain(&mut self) -> Vec<Trigger> {
        let mut drained = Vec::new();
        log_write_failure(self.store.update(|queue| drained = std::mem::take(queue)));
        drained
    }

    pub fn len(&self) -> usize {
        self.store.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.get().is_empty()
    }

    pub fn pending(&self) -> &[Trigger] {
        self.store.get()
    }
}
