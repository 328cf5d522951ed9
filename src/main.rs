use anyhow::Result;
use clap::{Parser, Subcommand};
use feedwake::config::{CliOverrides, Config};
use feedwake::settings::PermissionMode;
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "feedwake")]
#[command(version, about = "Wakes coding agent CLIs when the feed needs them")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Data directory (defaults to $FEEDWAKE_HOME or ~/.feedwake)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the feed service. Overrides FEED_URL and feedwake.toml.
    #[arg(long, global = true)]
    pub feed_url: Option<String>,

    /// Ceiling on concurrently running agents
    #[arg(long, global = true)]
    pub max_concurrent: Option<usize>,

    /// Permission mode: readonly, standard, unrestricted
    #[arg(long, global = true)]
    pub permission_mode: Option<PermissionMode>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            data_dir: self.data_dir.clone(),
            feed_url: self.feed_url.clone(),
            max_concurrent: self.max_concurrent,
            permission_mode: self.permission_mode,
            verbose: self.verbose,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the worker: startup sweep, live event stream, dispatch
    Run,
    /// Run one reconciliation sweep and print the triggers it finds
    Scan {
        /// Push the triggers into the persisted queue
        #[arg(long)]
        enqueue: bool,
    },
    /// Inspect or empty the persisted trigger queue
    Queue {
        #[command(subcommand)]
        command: Option<QueueCommands>,
    },
    /// List stored sessions, post participants and followed posts
    Sessions,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum QueueCommands {
    /// Show pending triggers
    Show,
    /// Drop every pending trigger
    Clear,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default feedwake.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials for the feed and the agent CLIs may live in .env.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load(cli.overrides())?;

    // Only the long-running worker writes a log file.
    let log_dir = matches!(cli.command, Commands::Run).then(|| config.log_dir());
    let _log_guard = feedwake::logging::init(cli.verbose, cli.log_json, log_dir.as_deref())?;

    match &cli.command {
        Commands::Run => cmd::cmd_run(config).await?,
        Commands::Scan { enqueue } => cmd::cmd_scan(&config, *enqueue).await?,
        Commands::Queue { command } => cmd::cmd_queue(&config, command.clone())?,
        Commands::Sessions => cmd::cmd_sessions(&config)?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
