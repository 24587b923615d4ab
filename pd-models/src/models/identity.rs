//! Client identity the realtime session is bound to.

use serde::{Deserialize, Serialize};
use pd_core::error::{PdError, PdResult};

/// An already-resolved client identity.
///
/// Token acquisition happens elsewhere; the realtime core only carries the
/// token through to the auth frame and never inspects it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl Identity {
    /// Build an identity, rejecting an empty user id.
    pub fn new(user_id: impl Into<String>, auth_token: Option<String>) -> PdResult<Self> {
        let user_id = user_id.into().trim().to_string();
        if user_id.is_empty() {
            return Err(PdError::MissingConfig("user id".into()));
        }
        let auth_token = auth_token.filter(|t| !t.is_empty());
        Ok(Self { user_id, auth_token })
    }

    /// Whether both identities refer to the same user.
    pub fn same_user(&self, other: &Identity) -> bool {
        self.user_id == other.user_id
    }
}

// Keep the token out of logs.
impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
