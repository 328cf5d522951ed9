//! The scheduling core.
//!
//! A [`Dispatcher`] owns every store and all scheduling state. Its
//! [`run`](Dispatcher::run) loop is the only place that state is mutated:
//! live events, finished jobs, sweep snapshots and the retry timer all arrive
//! through one `select!`, and each of them is followed by a scheduling pass.
//!
//! A pass drains the queue and, for every trigger still under its wake
//! attempt bound, either starts it (session idle, ceiling not reached) or
//! puts it back and arms a short retry timer. Started jobs run as separate
//! tasks and report back; the loop then releases the session, persists
//! session changes and kicks off a reconciliation sweep.

pub mod guards;
pub mod job;

pub use guards::Guards;
pub use job::{Job, JobReport, JobResult, JobSettings};

use feedwake_common::{BackendType, FeedEvent, Trigger, TriggerType};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::BackendAgent;
use crate::config::Config;
use crate::errors::FeedError;
use crate::feed::FeedApi;
use crate::invoker::AgentRunner;
use crate::store::queue::PushOutcome;
use crate::store::{FollowSet, PostSessions, TriggerQueue};
use crate::triggers::scanner::horizon;
use crate::triggers::{FeedSnapshot, ParseContext, Roster, RosterEntry, collect, parse_event, sweep_triggers};

/// Scheduling limits.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub max_concurrent: usize,
    pub max_wake_attempts: u32,
    pub max_bot_mentions_per_post: u32,
    pub retry_delay: Duration,
    pub scan_lookback_hours: i64,
    pub job: JobSettings,
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        let worker = &config.toml.worker;
        Self {
            max_concurrent: worker.max_concurrent.max(1),
            max_wake_attempts: worker.max_wake_attempts,
            max_bot_mentions_per_post: worker.max_bot_mentions_per_post,
            retry_delay: Duration::from_secs(worker.retry_delay_secs),
            scan_lookback_hours: worker.scan_lookback_hours,
            job: JobSettings {
                crash_retries: worker.crash_retries,
                context_comments: worker.context_comments,
                permission_mode: config.permission_mode,
                allowed_tools: worker.allowed_tools.clone(),
                browser: worker.browser,
            },
        }
    }
}

/// What happened to a trigger handed to [`Dispatcher::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Pushed(PushOutcome),
    /// The post already accepted its share of bot-authored mentions.
    BotLoopGuard,
    /// The event is running or already ran to completion.
    AlreadyHandled,
}

/// Persisted documents owned by the dispatcher.
#[derive(Debug)]
pub struct Stores {
    pub queue: TriggerQueue,
    pub follows: FollowSet,
    pub post_sessions: PostSessions,
}

impl Stores {
    pub fn open(config: &Config) -> Self {
        Self {
            queue: TriggerQueue::open(config.queue_file()),
            follows: FollowSet::open(config.follows_file()),
            post_sessions: PostSessions::open(config.post_sessions_file()),
        }
    }
}

pub struct Dispatcher {
    settings: DispatchSettings,
    job_settings: Arc<JobSettings>,
    api: Arc<dyn FeedApi>,
    runner: Arc<dyn AgentRunner>,
    agents: HashMap<BackendType, BackendAgent>,
    roster: Roster,
    stores: Stores,
    guards: Guards,
    retry_at: Option<Instant>,
    reports_tx: mpsc::UnboundedSender<JobReport>,
    reports_rx: mpsc::UnboundedReceiver<JobReport>,
    scans_tx: mpsc::UnboundedSender<Result<FeedSnapshot, FeedError>>,
    scans_rx: mpsc::UnboundedReceiver<Result<FeedSnapshot, FeedError>>,
    scan_running: bool,
    scan_pending: bool,
}

impl Dispatcher {
    /// `agents` are in configuration order; the first is the fallback
    /// backend for own-post and follow-up triggers.
    pub fn new(
        settings: DispatchSettings,
        api: Arc<dyn FeedApi>,
        runner: Arc<dyn AgentRunner>,
        agents: Vec<BackendAgent>,
        stores: Stores,
    ) -> Self {
        let roster = Roster::new(
            agents
                .iter()
                .map(|agent| RosterEntry {
                    backend: agent.backend_type(),
                    identity: agent.identity.clone(),
                })
                .collect(),
        );
        let agents = agents
            .into_iter()
            .map(|agent| (agent.backend_type(), agent))
            .collect();
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let (scans_tx, scans_rx) = mpsc::unbounded_channel();
        Self {
            job_settings: Arc::new(settings.job.clone()),
            guards: Guards::new(settings.max_wake_attempts, settings.max_bot_mentions_per_post),
            settings,
            api,
            runner,
            agents,
            roster,
            stores,
            retry_at: None,
            reports_tx,
            reports_rx,
            scans_tx,
            scans_rx,
            scan_running: false,
            scan_pending: false,
        }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn agent(&self, backend: BackendType) -> Option<&BackendAgent> {
        self.agents.get(&backend)
    }

    pub fn running(&self) -> usize {
        self.guards.running()
    }

    fn parse_context(&self) -> ParseContext<'_> {
        ParseContext {
            roster: &self.roster,
            follows: &self.stores.follows,
            post_sessions: &self.stores.post_sessions,
        }
    }

    /// Run until `shutdown` fires. Starts with a reconciliation sweep.
    /// Jobs still running at shutdown are left to finish on their own.
    pub async fn run(mut self, mut events: mpsc::Receiver<FeedEvent>, shutdown: CancellationToken) -> Self {
        info!(
            backends = self.agents.len(),
            max_concurrent = self.settings.max_concurrent,
            queued = self.stores.queue.len(),
            "Dispatcher started"
        );
        self.request_scan();
        self.schedule();

        let mut events_open = true;
        loop {
            let retry_at = self.retry_at;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(&event),
                    None => {
                        debug!("Event channel closed");
                        events_open = false;
                    }
                },
                Some(report) = self.reports_rx.recv() => self.handle_report(report),
                Some(scan) = self.scans_rx.recv() => self.handle_scan(scan),
                _ = tokio::time::sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    self.retry_at = None;
                }
            }
            self.schedule();
        }

        info!(running = self.guards.running(), queued = self.stores.queue.len(), "Dispatcher stopped");
        self
    }

    /// Parse a live event and queue what it triggers.
    pub fn handle_event(&mut self, event: &FeedEvent) {
        let triggers = parse_event(event, &self.parse_context());
        if triggers.is_empty() {
            return;
        }
        debug!(count = triggers.len(), "Event produced triggers");
        self.enqueue(triggers);
    }

    pub fn enqueue(&mut self, triggers: Vec<Trigger>) -> Vec<Enqueued> {
        triggers.into_iter().map(|t| self.enqueue_one(t)).collect()
    }

    fn enqueue_one(&mut self, trigger: Trigger) -> Enqueued {
        if self.guards.is_settled_or_running(&trigger.event_id) {
            return Enqueued::AlreadyHandled;
        }
        if !self.guards.bot_mention_allowed(&trigger) {
            info!(post_id = %trigger.post_id, author = %trigger.author_name, "Bot mention limit reached, dropping");
            return Enqueued::BotLoopGuard;
        }
        let counted = trigger.clone();
        let outcome = self.stores.queue.push(trigger);
        if outcome != PushOutcome::Duplicate {
            self.guards.count_bot_mention(&counted);
        }
        Enqueued::Pushed(outcome)
    }

    /// One scheduling pass. Returns the number of jobs started.
    pub fn schedule(&mut self) -> usize {
        if self.stores.queue.is_empty() {
            return 0;
        }
        let mut started = 0;
        let mut deferred = Vec::new();

        for trigger in self.stores.queue.drain() {
            if self.guards.wake_exhausted(&trigger.event_id) {
                warn!(
                    event_id = %trigger.event_id,
                    attempts = self.guards.attempts(&trigger.event_id),
                    "Wake attempts exhausted, dropping"
                );
                continue;
            }
            if self.guards.is_busy(&trigger.session_key())
                || self.guards.running() >= self.settings.max_concurrent
            {
                deferred.push(trigger);
                continue;
            }
            let Some(job) = self.prepare(&trigger) else {
                warn!(backend = %trigger.backend_type, "No agent configured for backend, dropping");
                continue;
            };
            self.guards.admit(&trigger);
            if trigger.trigger_type == TriggerType::Mention {
                self.stores.follows.follow(&trigger.post_id);
            }
            self.spawn(job);
            started += 1;
        }

        if !deferred.is_empty() {
            debug!(deferred = deferred.len(), "Sessions busy or ceiling reached, retrying shortly");
            for trigger in deferred {
                self.stores.queue.push(trigger);
            }
            self.retry_at = Some(Instant::now() + self.settings.retry_delay);
        }
        started
    }

    fn prepare(&self, trigger: &Trigger) -> Option<Job> {
        let agent = self.agents.get(&trigger.backend_type)?;
        Some(Job {
            trigger: trigger.clone(),
            identity: agent.identity.clone(),
            adapter: Arc::clone(&agent.adapter),
            model: agent.model.clone(),
            resume_session_id: agent.sessions.get(&trigger.session_name).map(String::from),
        })
    }

    fn spawn(&self, job: Job) {
        let api = Arc::clone(&self.api);
        let runner = Arc::clone(&self.runner);
        let settings = Arc::clone(&self.job_settings);
        let reports = self.reports_tx.clone();
        tokio::spawn(async move {
            let report = job::run_job(api, runner, settings, job).await;
            // The loop may already have shut down
            let _ = reports.send(report);
        });
    }

    /// Apply a finished job's effects and schedule a sweep.
    pub fn handle_report(&mut self, report: JobReport) {
        let JobReport {
            trigger,
            result,
            session_cleared,
        } = report;
        let completed = matches!(result, JobResult::Completed { .. });
        self.guards.release(&trigger, completed);

        if let Some(agent) = self.agents.get_mut(&trigger.backend_type) {
            if session_cleared {
                agent.sessions.clear(&trigger.session_name);
            }
            if let JobResult::Completed {
                new_session_id: Some(id),
            } = &result
            {
                agent.sessions.set(&trigger.session_name, id);
            }
        }
        if completed {
            self.stores
                .post_sessions
                .record(&trigger.post_id, trigger.session_key());
        }
        self.request_scan();
    }

    fn request_scan(&mut self) {
        if self.scan_running {
            self.scan_pending = true;
            return;
        }
        self.scan_running = true;
        let api = Arc::clone(&self.api);
        let since = horizon(self.settings.scan_lookback_hours);
        let scans = self.scans_tx.clone();
        tokio::spawn(async move {
            let _ = scans.send(collect(api.as_ref(), since).await);
        });
    }

    fn handle_scan(&mut self, scan: Result<FeedSnapshot, FeedError>) {
        self.scan_running = false;
        match scan {
            Ok(snapshot) => {
                let triggers = sweep_triggers(&snapshot, &self.parse_context());
                self.enqueue(triggers);
                let retain = Duration::from_secs(self.settings.scan_lookback_hours.max(0) as u64 * 3600);
                let pruned = self
                    .guards
                    .prune(Instant::now().into_std(), retain, self.stores.queue.pending());
                if pruned > 0 {
                    debug!(pruned, "Forgot guard entries older than the sweep horizon");
                }
            }
            Err(e) => warn!(error = %e, "Reconciliation sweep failed"),
        }
        if std::mem::take(&mut self.scan_pending) {
            self.request_scan();
        }
    }
}
