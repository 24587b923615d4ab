//! Global error types for PostDeck.
//!
//! All error categories across the workspace are unified into a single
//! `PdError` enum with conversions from underlying library errors. None of
//! the realtime variants are fatal: transport and auth failures feed the
//! reconnect loop, decode failures and protocol violations drop one frame.

use thiserror::Error;

/// Convenience type alias for Results using PdError.
pub type PdResult<T> = Result<T, PdError>;

/// Unified error type covering all error categories in PostDeck.
#[derive(Error, Debug)]
pub enum PdError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    // -- Realtime errors --
    /// Socket connection refused, dropped, or not open.
    #[error("transport error: {0}")]
    Transport(String),

    /// An outbound frame was attempted while the session is not connected.
    #[error("not connected")]
    NotConnected,

    /// Server rejected the identity during the handshake.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Inbound frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Inbound frame was well-formed but referenced unknown state.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// No identity is currently bound.
    #[error("no identity bound")]
    NotBound,

    // -- Network errors --
    /// HTTP request failed.
    #[error("http error: {0}")]
    Http(String),

    /// HTTP request timed out.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Server returned an error response.
    #[error("server error (status {status}): {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Error message from server.
        message: String,
    },

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapping anyhow errors for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PdError {
    /// Whether the error should cause the connection to be retried rather
    /// than surfaced to the caller.
    pub fn is_reconnectable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::AuthFailed(_) | Self::Timeout(_))
    }
}

impl From<serde_json::Error> for PdError {
    fn from(e: serde_json::Error) -> Self {
        PdError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for PdError {
    fn from(e: toml::de::Error) -> Self {
        PdError::Config(e.to_string())
    }
}
