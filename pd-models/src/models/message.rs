//! Chat message entity model.

use serde::{Deserialize, Serialize};

/// A direct chat message between two users.
///
/// The timestamp is kept exactly as the server sent it; the log is ordered
/// by arrival, not by timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub from_user_id: String,
    pub to_user_id: String,
    pub content: String,
    pub timestamp: String,
}

impl Message {
    /// Build an outbound message stamped with the current UTC time.
    pub fn outbound(from_user_id: &str, to_user_id: &str, content: &str) -> Self {
        Self {
            from_user_id: from_user_id.to_string(),
            to_user_id: to_user_id.to_string(),
            content: content.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }

    /// Whether `other` carries the same conversation payload, ignoring the timestamp.
    pub fn same_payload(&self, other: &Message) -> bool {
        self.from_user_id == other.from_user_id
            && self.to_user_id == other.to_user_id
            && self.content == other.content
    }
}
