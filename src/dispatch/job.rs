//! One dispatched trigger, from context fetch to idle status.
//!
//! Jobs run as independent tasks and never touch the stores; everything the
//! scheduling loop must persist comes back in a [`JobReport`].

use feedwake_common::{AgentStatus, Trigger};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::backend::{BackendAdapter, InvocationRequest};
use crate::feed::{FeedApi, recent_comments};
use crate::invoker::{AgentRunner, Invocation, Outcome, build_prompt};
use crate::settings::PermissionMode;

/// Invocation settings shared by every job.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub crash_retries: u32,
    pub context_comments: usize,
    pub permission_mode: PermissionMode,
    pub allowed_tools: Vec<String>,
    pub browser: bool,
}

/// Everything a job needs, owned so it can move into a task.
pub struct Job {
    pub trigger: Trigger,
    pub identity: String,
    pub adapter: Arc<dyn BackendAdapter>,
    pub model: Option<String>,
    pub resume_session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    /// `new_session_id` is set when a fresh session was opened.
    Completed { new_session_id: Option<String> },
    Failed,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub trigger: Trigger,
    pub result: JobResult,
    /// The stored session failed on resume and must be forgotten.
    pub session_cleared: bool,
}

pub async fn run_job(
    api: Arc<dyn FeedApi>,
    runner: Arc<dyn AgentRunner>,
    settings: Arc<JobSettings>,
    job: Job,
) -> JobReport {
    let Job {
        trigger,
        identity,
        adapter,
        model,
        mut resume_session_id,
    } = job;
    let key = trigger.session_key();
    let label = key.to_string();

    let context = match recent_comments(api.as_ref(), &trigger.post_id, settings.context_comments).await {
        Ok(comments) => comments,
        Err(e) => {
            warn!(post_id = %trigger.post_id, error = %e, "Context fetch failed, continuing without it");
            Vec::new()
        }
    };
    let prompt = build_prompt(&trigger, &identity, &context, settings.permission_mode);

    if let Err(e) = api
        .set_status(&identity, AgentStatus::Thinking, Some(&trigger.post_id))
        .await
    {
        warn!(identity = %identity, error = %e, "Failed to report thinking status");
    }

    info!(
        session = %label,
        event_id = %trigger.event_id,
        trigger_type = %trigger.trigger_type,
        resume = resume_session_id.is_some(),
        "Invoking agent"
    );

    let mut session_cleared = false;
    let mut result = JobResult::Failed;
    let attempts = settings.crash_retries.max(1);
    for attempt in 1..=attempts {
        let request = InvocationRequest {
            prompt: &prompt.user,
            system_prompt: &prompt.system,
            resume_session_id: resume_session_id.as_deref(),
            permission_mode: settings.permission_mode,
            allowed_tools: &settings.allowed_tools,
            model: model.as_deref(),
            browser: settings.browser,
        };
        let invocation = Invocation {
            adapter: Arc::clone(&adapter),
            args: adapter.build_args(&request),
            resumed: resume_session_id.is_some(),
            label: label.clone(),
        };

        match runner.run(invocation).await {
            Ok(Outcome::Completed { session_id }) => {
                let new_session_id = if resume_session_id.is_none() { session_id } else { None };
                result = JobResult::Completed { new_session_id };
                break;
            }
            Ok(Outcome::TimedOut) => {
                warn!(session = %label, event_id = %trigger.event_id, "Agent timed out, not retrying");
                result = JobResult::TimedOut;
                break;
            }
            Ok(Outcome::Crashed { exit_code }) => {
                warn!(session = %label, attempt, attempts, exit_code = ?exit_code, "Agent crashed");
                if resume_session_id.take().is_some() {
                    info!(session = %label, "Dropping stale session, retrying fresh");
                    session_cleared = true;
                }
            }
            Err(e) => {
                error!(session = %label, error = %e, "Failed to run agent");
                break;
            }
        }
    }

    if let Err(e) = api.set_status(&identity, AgentStatus::Idle, None).await {
        warn!(identity = %identity, error = %e, "Failed to report idle status");
    }

    if let JobResult::Completed {
        new_session_id: Some(session_id),
    } = &result
        && let Err(e) = api
            .report_session(&identity, &key.session_name, key.backend, session_id)
            .await
    {
        warn!(session = %label, error = %e, "Failed to report session id");
    }

    match &result {
        JobResult::Completed { .. } => info!(session = %label, event_id = %trigger.event_id, "Agent finished"),
        JobResult::Failed => error!(session = %label, event_id = %trigger.event_id, "Agent failed, giving up"),
        JobResult::TimedOut => {}
    }

    JobReport {
        trigger,
        result,
        session_cleared,
    }
}
