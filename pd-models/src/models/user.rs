//! Denormalized user summary.

use serde::{Deserialize, Serialize};

/// The slice of a user profile embedded in friend requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, alias = "name")]
    pub display_name: Option<String>,
    #[serde(default, alias = "avatar")]
    pub avatar_url: Option<String>,
}

impl UserSummary {
    /// Best label for display: display name, then username, then id.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or(&self.id)
    }
}
