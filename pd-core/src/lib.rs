//! PostDeck Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by all other PostDeck crates:
//! - Application configuration (server origin, realtime tuning, identity)
//! - Global error types covering the realtime error taxonomy
//! - Structured logging with tracing
//! - Common constants

pub mod config;
pub mod error;
pub mod logging;
pub mod constants;

// Re-export commonly used items at the crate root
pub use config::AppConfig;
pub use error::{PdError, PdResult};
pub use logging::{init_logging, LogGuard};
