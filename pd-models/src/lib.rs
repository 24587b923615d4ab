//! PostDeck Models - Domain types shared by the realtime core and its collaborators.
//!
//! Everything here is wire-compatible with the server's JSON (camelCase field
//! names) and is held only in memory for the lifetime of a session.

pub mod models;

// Re-export key types
pub use models::identity::Identity;
pub use models::message::Message;
pub use models::friend_request::{FriendRequest, FriendRequestStatus};
pub use models::user::UserSummary;
pub use models::presence::PresenceEntry;
