//! One-off reconciliation sweep (`feedwake scan`).

use anyhow::{Context, Result};
use feedwake::config::Config;
use feedwake::store::queue::PushOutcome;
use feedwake::store::{FollowSet, PostSessions, TriggerQueue};
use feedwake::triggers::scanner::horizon;
use feedwake::triggers::{ParseContext, Roster, RosterEntry, collect, sweep_triggers};
use feedwake::worker::{acquire_lock, build_agents};
use feedwake::feed::FeedClient;

pub async fn cmd_scan(config: &Config, enqueue: bool) -> Result<()> {
    config.ensure_directories()?;
    // Queue writes need the same exclusivity the worker has.
    let _lock = if enqueue {
        Some(acquire_lock(&config.lock_file())?)
    } else {
        None
    };

    let client = FeedClient::new(&config.feed_url, config.feed_token.clone())?;
    let agents = build_agents(config, &client).await?;
    let roster = Roster::new(
        agents
            .iter()
            .map(|agent| RosterEntry {
                backend: agent.backend_type(),
                identity: agent.identity.clone(),
            })
            .collect(),
    );

    let follows = FollowSet::open(config.follows_file());
    let post_sessions = PostSessions::open(config.post_sessions_file());
    let ctx = ParseContext {
        roster: &roster,
        follows: &follows,
        post_sessions: &post_sessions,
    };

    let since = horizon(config.toml.worker.scan_lookback_hours);
    let snapshot = collect(&client, since)
        .await
        .context("Failed to read feed state")?;
    let triggers = sweep_triggers(&snapshot, &ctx);

    println!();
    println!(
        "Swept {} thread(s) since {}",
        snapshot.threads.len(),
        since.format("%Y-%m-%d %H:%M UTC")
    );
    println!();

    if triggers.is_empty() {
        println!("Nothing to do.");
        println!();
        return Ok(());
    }

    println!("{:<18} {:<20} {:<16} Post", "Type", "Session", "Author");
    println!("{:<18} {:<20} {:<16} ----", "----", "-------", "------");
    for trigger in &triggers {
        println!(
            "{:<18} {:<20} {:<16} {}",
            trigger.trigger_type.as_str(),
            trigger.session_key().to_string(),
            trigger.author_name,
            trigger.post_id
        );
    }
    println!();

    if enqueue {
        let mut queue = TriggerQueue::open(config.queue_file());
        let mut added = 0;
        for trigger in triggers {
            if queue.push(trigger) != PushOutcome::Duplicate {
                added += 1;
            }
        }
        println!("Queued {} trigger(s); {} pending in total.", added, queue.len());
    } else {
        println!("Run with --enqueue to queue them for the worker.");
    }
    println!();
    Ok(())
}
