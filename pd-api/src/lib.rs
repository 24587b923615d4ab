//! PostDeck API - HTTP client for the PostDeck server REST API.
//!
//! The realtime channel only needs REST for the initial friend request
//! snapshot; this crate covers that plus the shared request lifecycle:
//! bearer authentication, custom headers, timeouts, and retry with
//! exponential backoff.

pub mod client;
pub mod endpoints;
pub mod response;

// Re-export key types
pub use client::{ApiClient, RetryConfig};
pub use response::{DataEnvelope, ListResponse};
