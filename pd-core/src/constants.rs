//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "PostDeck";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default REST API timeout in milliseconds.
pub const DEFAULT_API_TIMEOUT_MS: u64 = 30_000;

/// Default realtime socket path on the page origin.
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Query parameter carrying the user id on the socket URL.
pub const WS_USER_QUERY_PARAM: &str = "userId";

/// Base reconnect delay in milliseconds.
pub const RECONNECT_BASE_MS: u64 = 1_000;

/// Reconnect delay ceiling in milliseconds.
pub const RECONNECT_MAX_MS: u64 = 30_000;

/// Time allowed between sending the auth frame and receiving `authAck`.
pub const AUTH_TIMEOUT_MS: u64 = 10_000;

/// Consecutive auth rejections before the failure is surfaced to the user.
pub const AUTH_FAILURE_THRESHOLD: u32 = 3;

/// Default capacity of the realtime broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// REST path for the pending friend request snapshot.
pub const PENDING_FRIEND_REQUESTS_PATH: &str = "/api/friend-requests/pending";

/// Normal WebSocket close code.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code used when the connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
