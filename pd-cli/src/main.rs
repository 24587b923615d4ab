//! PostDeck CLI - drive the realtime channel from a terminal.
//!
//! Useful for headless checks against a running server: watch the live
//! feed for a user, fire off a single message, or manage the config file.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use pd_core::config::{AppConfig, ConfigHandle};
use pd_core::error::PdResult;
use pd_core::logging;

/// PostDeck - realtime messaging dashboard client.
#[derive(Parser)]
#[command(
    name = "postdeck",
    version,
    about = "PostDeck realtime client CLI",
    long_about = "A command-line client for the PostDeck realtime channel.\n\
                   Bind to a user, watch messages, friend requests and presence as they arrive."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(short = 'f', long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// One JSON object per line, for scripting.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Bind to a user and print realtime events until Ctrl+C.
    Connect {
        #[command(flatten)]
        target: commands::Target,
        /// Save the origin and identity to the config file.
        #[arg(long)]
        save: bool,
    },
    /// Send one message and disconnect.
    Send {
        #[command(flatten)]
        target: commands::Target,
        /// Recipient user id.
        #[arg(long)]
        to: String,
        /// Message text.
        content: String,
        /// How long to wait for the channel to come up.
        #[arg(long, default_value = "10")]
        wait_secs: u64,
    },
    /// Inspect or create the configuration file.
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> PdResult<()> {
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::load_default()?,
    };

    let log_dir = config
        .effective_log_dir()
        .unwrap_or_else(|_| PathBuf::from("logs"));
    let _guard = logging::init_logging(&config.logging, &log_dir, cli.verbose)?;

    info!("PostDeck CLI v{}", pd_core::constants::APP_VERSION);

    let config_path = cli.config.clone();
    let config_handle = ConfigHandle::new(config);

    match cli.command {
        Commands::Connect { target, save } => {
            commands::connect::run(config_handle, target, save, config_path, cli.format).await
        }
        Commands::Send {
            target,
            to,
            content,
            wait_secs,
        } => commands::send::run(config_handle, target, to, content, wait_secs, cli.format).await,
        Commands::Config { action } => {
            commands::config::run(config_handle, action, config_path, cli.format).await
        }
    }
}
