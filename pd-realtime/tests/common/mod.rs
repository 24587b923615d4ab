//! Shared test utilities for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use pd_core::error::PdResult;
use pd_models::{FriendRequest, FriendRequestStatus, Identity, UserSummary};
use pd_realtime::{
    ConnectionState, FriendRequestSource, MachineConfig, MemoryBehavior, MemoryPeer,
    MemoryTransport, RealtimeSession, ReconnectConfig, SessionOptions,
};

/// Deterministic options: no jitter, 1s/2s/4s backoff, 10s auth timeout.
pub fn test_options() -> SessionOptions {
    let mut options = SessionOptions::new("http://localhost:3000");
    options.machine = MachineConfig {
        backoff: ReconnectConfig::default().without_jitter(),
        auth_timeout: Duration::from_secs(10),
        auth_failure_threshold: 2,
    };
    options.event_capacity = 64;
    options
}

pub fn create_test_session(behavior: MemoryBehavior) -> (RealtimeSession, MemoryTransport) {
    create_session_with(test_options(), behavior)
}

pub fn create_session_with(
    options: SessionOptions,
    behavior: MemoryBehavior,
) -> (RealtimeSession, MemoryTransport) {
    let transport = MemoryTransport::new(behavior);
    let session = RealtimeSession::new(options, Arc::new(transport.clone()));
    (session, transport)
}

pub fn identity(user_id: &str) -> Identity {
    Identity::new(user_id, Some(format!("token-{user_id}"))).unwrap()
}

/// Fail instead of hanging when an expected change never comes.
pub async fn within<F: std::future::Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(120), fut)
        .await
        .expect("timed out waiting for realtime state")
}

pub async fn wait_for_state(session: &RealtimeSession, wanted: ConnectionState) {
    let mut rx = session.state_receiver();
    within(rx.wait_for(|s| *s == wanted)).await.unwrap();
}

/// Play the server through open, auth and ack on connection number `n`.
pub async fn accept_and_ack(
    session: &RealtimeSession,
    transport: &MemoryTransport,
    n: usize,
) -> MemoryPeer {
    let peer = within(transport.wait_for_connection(n)).await;
    peer.open();
    wait_for_state(session, ConnectionState::Authenticating).await;
    peer.push_json(json!({"type": "authAck"}));
    wait_for_state(session, ConnectionState::Connected).await;
    peer
}

/// Bind `user_id` and bring the session to `Connected`.
pub async fn connect_as(
    session: &RealtimeSession,
    transport: &MemoryTransport,
    user_id: &str,
) -> MemoryPeer {
    let n = transport.connection_count() + 1;
    session.bind(identity(user_id)).await.unwrap();
    accept_and_ack(session, transport, n).await
}

pub fn friend_request(id: &str, from: &str, status: FriendRequestStatus) -> FriendRequest {
    FriendRequest {
        id: id.into(),
        from_user: UserSummary {
            id: from.into(),
            username: Some(format!("{from}-name")),
            display_name: None,
            avatar_url: None,
        },
        status,
    }
}

/// Canned REST snapshot.
pub struct StaticSource(pub Vec<FriendRequest>);

#[async_trait]
impl FriendRequestSource for StaticSource {
    async fn pending_friend_requests(&self, _identity: &Identity) -> PdResult<Vec<FriendRequest>> {
        Ok(self.0.clone())
    }
}
