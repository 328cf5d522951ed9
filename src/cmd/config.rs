//! Configuration view and validation commands (`feedwake config`).

use anyhow::Result;
use feedwake::config::Config;
use feedwake::settings::FeedwakeToml;

use super::super::ConfigCommands;

pub fn cmd_config(config: &Config, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Feedwake Configuration");
            println!("======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No feedwake.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();

            let worker = &config.toml.worker;
            println!("[feed]");
            println!("  url = \"{}\"", config.feed_url);
            println!("  token_env = \"{}\"", config.toml.feed.token_env);
            println!(
                "  token = {}",
                if config.feed_token.is_some() { "(set)" } else { "(not set)" }
            );
            println!();

            println!("[worker]");
            println!("  max_concurrent = {}", worker.max_concurrent);
            println!("  max_wake_attempts = {}", worker.max_wake_attempts);
            println!("  max_bot_mentions_per_post = {}", worker.max_bot_mentions_per_post);
            println!("  invocation_timeout_secs = {}", worker.invocation_timeout_secs);
            println!("  crash_retries = {}", worker.crash_retries);
            println!("  permission_mode = \"{}\"", config.permission_mode);
            println!("  working_dir = \"{}\"", config.working_dir().display());
            println!();

            println!("[stream]");
            println!("  initial_backoff_secs = {}", config.toml.stream.initial_backoff_secs);
            println!("  max_backoff_secs = {}", config.toml.stream.max_backoff_secs);
            println!();

            for backend in config.backends() {
                println!("[[backends]]");
                println!("  kind = \"{}\"", backend.kind);
                println!("  command = \"{}\"", backend.command());
                if let Some(identity) = &backend.identity {
                    println!("  identity = \"{}\"", identity);
                }
                if let Some(model) = &backend.model {
                    println!("  model = \"{}\"", model);
                }
                println!(
                    "  tool_url = \"{}\"",
                    backend
                        .tool_url
                        .clone()
                        .unwrap_or_else(|| config.default_tool_url())
                );
                println!();
            }

            if !config_path.exists() {
                println!("Run 'feedwake config init' to create a feedwake.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No feedwake.toml found. Using defaults (valid).");
                return Ok(());
            }

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("feedwake.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&config.data_dir)?;
            FeedwakeToml::default().save(&config_path)?;

            println!("Created feedwake.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [feed] url, token_env");
            println!("  - [worker] limits and permission_mode");
            println!("  - [[backends]] kind, identity, command, model");
            println!();
        }
    }

    Ok(())
}
