//! Scheduling state that keeps the dispatcher from overlapping, looping or
//! retrying forever.
//!
//! Per-event and per-post counters are stamped when last touched and pruned
//! once older than the sweep horizon, after which no sweep can resurface
//! the content they refer to.

use feedwake_common::{SessionKey, Trigger, TriggerType};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Guards {
    max_wake_attempts: u32,
    max_bot_mentions: u32,
    /// Session keys with a running invocation.
    busy: HashSet<SessionKey>,
    /// Admissions per event id.
    wake_attempts: HashMap<String, (u32, Instant)>,
    /// Accepted bot-authored mentions per post.
    bot_mentions: HashMap<String, (u32, Instant)>,
    /// Event ids currently running.
    in_flight: HashSet<String>,
    /// Event ids that ran to completion.
    handled: HashMap<String, Instant>,
}

impl Guards {
    pub fn new(max_wake_attempts: u32, max_bot_mentions: u32) -> Self {
        Self {
            max_wake_attempts,
            max_bot_mentions,
            busy: HashSet::new(),
            wake_attempts: HashMap::new(),
            bot_mentions: HashMap::new(),
            in_flight: HashSet::new(),
            handled: HashMap::new(),
        }
    }

    fn is_bot_mention(trigger: &Trigger) -> bool {
        trigger.author_is_bot && trigger.trigger_type == TriggerType::Mention
    }

    /// False once the trigger's post has used up its bot-mention allowance.
    pub fn bot_mention_allowed(&self, trigger: &Trigger) -> bool {
        !Self::is_bot_mention(trigger)
            || self.bot_mentions.get(&trigger.post_id).map_or(0, |(n, _)| *n) < self.max_bot_mentions
    }

    pub fn count_bot_mention(&mut self, trigger: &Trigger) {
        if Self::is_bot_mention(trigger) {
            let entry = self
                .bot_mentions
                .entry(trigger.post_id.clone())
                .or_insert((0, Instant::now()));
            entry.0 += 1;
            entry.1 = Instant::now();
        }
    }

    /// True while the event is running or after it completed.
    pub fn is_settled_or_running(&self, event_id: &str) -> bool {
        self.in_flight.contains(event_id) || self.handled.contains_key(event_id)
    }

    pub fn attempts(&self, event_id: &str) -> u32 {
        self.wake_attempts.get(event_id).map_or(0, |(n, _)| *n)
    }

    pub fn wake_exhausted(&self, event_id: &str) -> bool {
        self.attempts(event_id) >= self.max_wake_attempts
    }

    pub fn is_busy(&self, key: &SessionKey) -> bool {
        self.busy.contains(key)
    }

    pub fn running(&self) -> usize {
        self.busy.len()
    }

    /// Mark the trigger's session busy and count the attempt.
    pub fn admit(&mut self, trigger: &Trigger) {
        self.busy.insert(trigger.session_key());
        self.in_flight.insert(trigger.event_id.clone());
        let entry = self
            .wake_attempts
            .entry(trigger.event_id.clone())
            .or_insert((0, Instant::now()));
        entry.0 += 1;
        entry.1 = Instant::now();
    }

    pub fn release(&mut self, trigger: &Trigger, completed: bool) {
        self.busy.remove(&trigger.session_key());
        self.in_flight.remove(&trigger.event_id);
        if completed {
            self.handled.insert(trigger.event_id.clone(), Instant::now());
        }
    }

    /// Forget counters untouched for `retain`. Running events and the ids in
    /// `pending` keep their attempt counts. Returns the number of entries dropped.
    pub fn prune(&mut self, now: Instant, retain: Duration, pending: &[Trigger]) -> usize {
        let fresh = |touched: Instant| now.saturating_duration_since(touched) < retain;
        let before = self.wake_attempts.len() + self.bot_mentions.len() + self.handled.len();

        let in_flight = &self.in_flight;
        self.wake_attempts.retain(|id, (_, touched)| {
            fresh(*touched) || in_flight.contains(id) || pending.iter().any(|t| &t.event_id == id)
        });
        self.bot_mentions.retain(|_, (_, touched)| fresh(*touched));
        self.handled.retain(|_, touched| fresh(*touched));

        before - (self.wake_attempts.len() + self.bot_mentions.len() + self.handled.len())
    }
}
