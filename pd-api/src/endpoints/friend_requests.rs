//! Friend request endpoints.

use pd_core::constants::PENDING_FRIEND_REQUESTS_PATH;
use pd_core::error::PdResult;
use pd_models::FriendRequest;
use tracing::debug;

use crate::client::ApiClient;
use crate::response::ListResponse;

impl ApiClient {
    /// Snapshot of the pending friend requests addressed to the token's user.
    pub async fn fetch_pending_friend_requests(
        &self,
        token: Option<&str>,
    ) -> PdResult<Vec<FriendRequest>> {
        let resp: ListResponse<FriendRequest> =
            self.get_json(PENDING_FRIEND_REQUESTS_PATH, token).await?;
        let requests = resp.into_vec();
        debug!("fetched {} pending friend request(s)", requests.len());
        Ok(requests)
    }
}
