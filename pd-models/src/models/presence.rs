//! Presence entries.

use serde::{Deserialize, Serialize};

/// Last reported online status for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub user_id: String,
    pub is_online: bool,
}
