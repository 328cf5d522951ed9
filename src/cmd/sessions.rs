//! Session state listing (`feedwake sessions`).

use anyhow::Result;
use feedwake::config::{Config, session_file};
use feedwake::store::{FollowSet, PostSessions, SessionStore};

pub fn cmd_sessions(config: &Config) -> Result<()> {
    println!();
    println!("Sessions");
    println!("========");
    for backend in config.backends() {
        let store = SessionStore::open(session_file(&config.sessions_dir(), backend.kind));
        println!();
        println!("[{}]", backend.kind);
        if store.entries().is_empty() {
            println!("  (none)");
        }
        for (name, session_id) in store.entries() {
            println!("  {:<20} {}", name, session_id);
        }
    }

    let post_sessions = PostSessions::open(config.post_sessions_file());
    println!();
    println!("Post participants");
    println!("=================");
    if post_sessions.all().is_empty() {
        println!("  (none)");
    }
    for (post_id, keys) in post_sessions.all() {
        let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
        println!("  {:<24} {}", post_id, keys.join(", "));
    }

    let follows = FollowSet::open(config.follows_file());
    println!();
    println!("Followed posts ({})", follows.posts().len());
    println!("==============");
    for post_id in follows.posts() {
        println!("  {}", post_id);
    }
    println!();
    Ok(())
}
