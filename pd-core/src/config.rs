//! Application configuration management.
//!
//! Handles loading, saving, and accessing the configuration: server origin,
//! realtime connection tuning, the optional CLI identity, and logging.
//! Configuration is persisted as TOML on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{PdError, PdResult};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server connection settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Realtime channel settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Identity used by the CLI when none is given on the command line.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Page origin the dashboard is served from (e.g. "https://app.postdeck.io").
    /// Both the REST root and the socket endpoint are derived from it.
    #[serde(default)]
    pub origin: String,

    /// API request timeout in milliseconds.
    #[serde(default = "default_api_timeout")]
    pub api_timeout_ms: u64,

    /// Custom HTTP headers as key-value pairs.
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,
}

/// Realtime connection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Socket path on the origin.
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Delay before the first reconnect attempt.
    #[serde(default = "default_reconnect_base")]
    pub reconnect_base_ms: u64,

    /// Ceiling for the reconnect delay.
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_ms: u64,

    /// Growth factor per failed attempt; 1.0 gives a fixed delay.
    #[serde(default = "default_reconnect_multiplier")]
    pub reconnect_multiplier: f64,

    /// Jitter factor (0.0 to 1.0) applied to each delay.
    #[serde(default = "default_reconnect_jitter")]
    pub reconnect_jitter: f64,

    /// How long to wait for `authAck` after sending the auth frame.
    #[serde(default = "default_auth_timeout")]
    pub auth_timeout_ms: u64,

    /// Consecutive auth rejections before the failure is surfaced.
    #[serde(default = "default_auth_failure_threshold")]
    pub auth_failure_threshold: u32,

    /// Capacity of the realtime event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Append outbound messages to the log before the server echoes them.
    #[serde(default)]
    pub local_echo: bool,
}

/// Identity settings for headless use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub auth_token: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output.
    #[serde(default)]
    pub json_output: bool,
}

// Default value functions for serde

fn default_api_timeout() -> u64 {
    constants::DEFAULT_API_TIMEOUT_MS
}

fn default_ws_path() -> String {
    constants::DEFAULT_WS_PATH.to_string()
}

fn default_reconnect_base() -> u64 {
    constants::RECONNECT_BASE_MS
}

fn default_reconnect_max() -> u64 {
    constants::RECONNECT_MAX_MS
}

fn default_reconnect_multiplier() -> f64 {
    2.0
}

fn default_reconnect_jitter() -> f64 {
    0.3
}

fn default_auth_timeout() -> u64 {
    constants::AUTH_TIMEOUT_MS
}

fn default_auth_failure_threshold() -> u32 {
    constants::AUTH_FAILURE_THRESHOLD
}

fn default_event_capacity() -> usize {
    constants::DEFAULT_EVENT_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            origin: String::new(),
            api_timeout_ms: default_api_timeout(),
            custom_headers: HashMap::new(),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ws_path: default_ws_path(),
            reconnect_base_ms: default_reconnect_base(),
            reconnect_max_ms: default_reconnect_max(),
            reconnect_multiplier: default_reconnect_multiplier(),
            reconnect_jitter: default_reconnect_jitter(),
            auth_timeout_ms: default_auth_timeout(),
            auth_failure_threshold: default_auth_failure_threshold(),
            event_capacity: default_event_capacity(),
            local_echo: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl RealtimeConfig {
    /// The auth timeout as a Duration.
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    /// Reject values the reconnect loop cannot work with.
    pub fn validate(&self) -> PdResult<()> {
        if self.reconnect_base_ms == 0 {
            return Err(PdError::Config("realtime.reconnect_base_ms must be > 0".into()));
        }
        if self.reconnect_max_ms < self.reconnect_base_ms {
            return Err(PdError::Config(
                "realtime.reconnect_max_ms must be >= reconnect_base_ms".into(),
            ));
        }
        if self.reconnect_multiplier < 1.0 {
            return Err(PdError::Config("realtime.reconnect_multiplier must be >= 1.0".into()));
        }
        if !(0.0..=1.0).contains(&self.reconnect_jitter) {
            return Err(PdError::Config("realtime.reconnect_jitter must be within 0..=1".into()));
        }
        if !self.ws_path.starts_with('/') {
            return Err(PdError::Config("realtime.ws_path must start with '/'".into()));
        }
        if self.event_capacity == 0 {
            return Err(PdError::Config("realtime.event_capacity must be > 0".into()));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from the default config file path.
    pub fn load_default() -> PdResult<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> PdResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.realtime.validate()?;
        Ok(config)
    }

    /// Save configuration to the default config file path.
    pub fn save_default(&self) -> PdResult<()> {
        let path = Self::default_config_path()?;
        self.save_to_file(&path)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> PdResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| PdError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PdResult<PathBuf> {
        Ok(app_dir(dirs::config_dir(), "config")?.join("config.toml"))
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> PdResult<PathBuf> {
        if self.logging.directory.is_empty() {
            Ok(app_dir(dirs::data_dir(), "data")?.join("logs"))
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Check whether the server origin is configured.
    pub fn is_server_configured(&self) -> bool {
        !self.server.origin.is_empty()
    }

    /// Sanitize and normalize a page origin.
    ///
    /// Strips quotes and trailing slashes and adds a scheme when missing:
    /// plain http for loopback hosts, https otherwise. Socket schemes
    /// (`ws`, `wss`) are kept as given.
    pub fn sanitize_origin(origin: &str) -> String {
        let trimmed = origin.trim().trim_matches('"').trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let has_scheme = ["http://", "https://", "ws://", "wss://"]
            .iter()
            .any(|scheme| trimmed.starts_with(scheme));
        let with_scheme = if has_scheme {
            trimmed.to_string()
        } else if trimmed.starts_with("localhost")
            || trimmed.starts_with("127.0.0.1")
            || trimmed.starts_with("[::1]")
        {
            format!("http://{trimmed}")
        } else {
            format!("https://{trimmed}")
        };

        with_scheme.trim_end_matches('/').to_string()
    }
}

/// `<base>/PostDeck` for a per-OS base directory.
fn app_dir(base: Option<PathBuf>, kind: &str) -> PdResult<PathBuf> {
    base.map(|b| b.join(constants::APP_NAME))
        .ok_or_else(|| PdError::Config(format!("could not determine {kind} directory")))
}

/// Thread-safe configuration holder for shared access.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<AppConfig>>,
}

impl ConfigHandle {
    /// Create a new configuration handle.
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Read the configuration.
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, AppConfig> {
        self.inner.read().await
    }

    /// Write/update the configuration.
    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, AppConfig> {
        self.inner.write().await
    }

    /// Clone the current configuration out of the lock.
    pub async fn snapshot(&self) -> AppConfig {
        self.inner.read().await.clone()
    }
}
