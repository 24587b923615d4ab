//! Friend request snapshot sources.

use async_trait::async_trait;

use pd_api::ApiClient;
use pd_core::error::PdResult;
use pd_models::{FriendRequest, Identity};

/// Something that can list the pending friend requests of an identity.
#[async_trait]
pub trait FriendRequestSource: Send + Sync {
    async fn pending_friend_requests(&self, identity: &Identity) -> PdResult<Vec<FriendRequest>>;
}

#[async_trait]
impl FriendRequestSource for ApiClient {
    async fn pending_friend_requests(&self, identity: &Identity) -> PdResult<Vec<FriendRequest>> {
        self.fetch_pending_friend_requests(identity.auth_token.as_deref())
            .await
    }
}
