//! CLI command implementations.

pub mod config;
pub mod connect;
pub mod send;

use std::path::PathBuf;
use std::sync::Arc;

use dialoguer::{Input, Password};

use pd_api::ApiClient;
use pd_core::config::{AppConfig, ConfigHandle};
use pd_core::error::{PdError, PdResult};
use pd_models::Identity;
use pd_realtime::{RealtimeSession, SessionOptions, WsTransport};

/// Who to bind as and where. Each flag overrides the config file.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct Target {
    /// User id to bind the channel to.
    #[arg(short, long)]
    pub user_id: Option<String>,
    /// Auth token sent in the auth frame.
    #[arg(short, long)]
    pub token: Option<String>,
    /// Page origin the socket endpoint is derived from.
    #[arg(short, long)]
    pub origin: Option<String>,
}

/// Apply the target flags to the shared config and resolve the identity.
///
/// Resolution order is flag, then config, then an interactive prompt when
/// `interactive` is set.
pub async fn resolve_target(
    config: &ConfigHandle,
    target: Target,
    interactive: bool,
) -> PdResult<Identity> {
    let mut cfg = config.write().await;

    if let Some(origin) = pick(target.origin, None) {
        cfg.server.origin = AppConfig::sanitize_origin(&origin);
    }
    if !cfg.is_server_configured() {
        return Err(PdError::MissingConfig("server origin".into()));
    }

    let user_id = match pick(target.user_id, cfg.identity.user_id.clone()) {
        Some(id) => id,
        None if interactive => Input::<String>::new()
            .with_prompt("User id")
            .interact_text()
            .map_err(|e| PdError::Internal(e.to_string()))?,
        None => return Err(PdError::MissingConfig("identity.user_id".into())),
    };

    let token = match pick(target.token, cfg.identity.auth_token.clone()) {
        Some(token) => Some(token),
        None if interactive => {
            let entered = Password::new()
                .with_prompt("Auth token (empty for none)")
                .allow_empty_password(true)
                .interact()
                .map_err(|e| PdError::Internal(e.to_string()))?;
            pick(Some(entered), None)
        }
        None => None,
    };

    let identity = Identity::new(user_id, token)?;
    cfg.identity.user_id = Some(identity.user_id.clone());
    cfg.identity.auth_token = identity.auth_token.clone();
    Ok(identity)
}

/// First non-blank value of a flag and its configured fallback.
fn pick(flag: Option<String>, configured: Option<String>) -> Option<String> {
    flag.into_iter()
        .chain(configured)
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Helper to create an API client from config.
pub async fn create_api_client(config: &ConfigHandle) -> PdResult<ApiClient> {
    let server_config = config.read().await.server.clone();
    ApiClient::new(&server_config)
}

/// Build a WebSocket-backed session from the current config.
pub async fn create_session(config: &ConfigHandle) -> RealtimeSession {
    let cfg = config.read().await;
    let transport = WsTransport::with_headers(cfg.server.custom_headers.clone());
    RealtimeSession::new(SessionOptions::from_config(&cfg), Arc::new(transport))
}

/// The `--config` path, or the platform default.
pub fn config_path(explicit: Option<PathBuf>) -> PdResult<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => AppConfig::default_config_path(),
    }
}

/// Truncate a string to at most `max_chars` characters, appending an ellipsis if truncated.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars > 3 {
        let head: String = s.chars().take(max_chars - 3).collect();
        format!("{head}...")
    } else {
        s.chars().take(max_chars).collect()
    }
}
