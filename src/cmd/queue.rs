//! Persisted queue inspection (`feedwake queue`).

use anyhow::Result;
use feedwake::config::Config;
use feedwake::store::TriggerQueue;
use feedwake::worker::acquire_lock;

use super::super::QueueCommands;

pub fn cmd_queue(config: &Config, command: Option<QueueCommands>) -> Result<()> {
    match command {
        None | Some(QueueCommands::Show) => {
            let queue = TriggerQueue::open(config.queue_file());
            println!();
            if queue.is_empty() {
                println!("Queue is empty.");
                println!();
                return Ok(());
            }
            println!("{} pending trigger(s) in {}", queue.len(), config.queue_file().display());
            println!();
            for trigger in queue.pending() {
                println!(
                    "  {} {} {}",
                    console::style(trigger.trigger_type.as_str()).cyan(),
                    trigger.session_key(),
                    console::style(&trigger.event_id).dim()
                );
                println!(
                    "      by {}{} on post {}",
                    trigger.author_name,
                    if trigger.author_is_bot { " (bot)" } else { "" },
                    trigger.post_id
                );
            }
            println!();
        }
        Some(QueueCommands::Clear) => {
            config.ensure_directories()?;
            let _lock = acquire_lock(&config.lock_file())?;
            let mut queue = TriggerQueue::open(config.queue_file());
            let dropped = queue.drain().len();
            println!("Dropped {} pending trigger(s).", dropped);
        }
    }
    Ok(())
}
