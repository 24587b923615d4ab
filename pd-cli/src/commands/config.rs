//! Config command - print or write the TOML configuration.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use console::style;
use dialoguer::Confirm;
use serde_json::json;

use pd_core::config::{AppConfig, ConfigHandle};
use pd_core::error::{PdError, PdResult};

use crate::OutputFormat;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration with the auth token redacted.
    Show,
    /// Print the config file location.
    Path,
    /// Write a default config file.
    Init {
        /// Page origin to store.
        #[arg(short, long)]
        origin: Option<String>,
        /// Overwrite an existing file without asking.
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub async fn run(
    config: ConfigHandle,
    action: ConfigAction,
    config_path: Option<PathBuf>,
    format: OutputFormat,
) -> PdResult<()> {
    match action {
        ConfigAction::Show => {
            let rendered = render_redacted(&config.snapshot().await)?;
            match format {
                OutputFormat::Text => print!("{rendered}"),
                OutputFormat::Json => {
                    let value: toml::Value = toml::from_str(&rendered)?;
                    println!("{}", json!(value));
                }
            }
        }
        ConfigAction::Path => {
            let path = super::config_path(config_path)?;
            match format {
                OutputFormat::Text => println!("{}", path.display()),
                OutputFormat::Json => println!("{}", json!({ "path": path })),
            }
        }
        ConfigAction::Init { origin, force } => {
            let path = super::config_path(config_path)?;
            if path.exists() && !force && !confirm_overwrite(&path)? {
                println!("  {} Left {} unchanged.", style("SKIP").yellow(), path.display());
                return Ok(());
            }
            write_default(&path, origin.as_deref())?;
            println!("  {} Wrote {}", style("OK").green().bold(), path.display());
        }
    }
    Ok(())
}

/// TOML text of `config` with the auth token masked.
pub fn render_redacted(config: &AppConfig) -> PdResult<String> {
    let mut shown = config.clone();
    if shown.identity.auth_token.is_some() {
        shown.identity.auth_token = Some("********".into());
    }
    toml::to_string_pretty(&shown).map_err(|e| PdError::Serialization(e.to_string()))
}

/// Write the default config, optionally with an origin filled in.
pub fn write_default(path: &Path, origin: Option<&str>) -> PdResult<()> {
    let mut config = AppConfig::default();
    if let Some(origin) = origin {
        config.server.origin = AppConfig::sanitize_origin(origin);
    }
    config.save_to_file(path)
}

fn confirm_overwrite(path: &Path) -> PdResult<bool> {
    Confirm::new()
        .with_prompt(format!("{} exists. Overwrite?", path.display()))
        .default(false)
        .interact()
        .map_err(|e| PdError::Internal(e.to_string()))
}
