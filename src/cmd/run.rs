//! The long-running worker (`feedwake run`).

use anyhow::Result;
use feedwake::config::Config;

pub async fn cmd_run(config: Config) -> Result<()> {
    if config.feed_token.is_none() {
        tracing::warn!(
            token_env = %config.toml.feed.token_env,
            "No feed token configured, requests will be unauthenticated"
        );
    }
    feedwake::worker::run(config).await
}
