//! End-to-end session tests over the in-memory transport.

mod common;

use std::time::Duration;

use serde_json::json;

use common::*;
use pd_core::error::PdError;
use pd_models::FriendRequestStatus;
use pd_realtime::{ConnectionState, MemoryBehavior, RealtimeEvent};

#[tokio::test(start_paused = true)]
async fn test_incoming_message_lands_in_log() {
    let (session, transport) = create_test_session(MemoryBehavior::Manual);
    let mut events = session.subscribe();
    let peer = connect_as(&session, &transport, "u1").await;
    assert_eq!(peer.url(), "ws://localhost:3000/ws?userId=u1");

    peer.push_json(json!({
        "type": "message",
        "message": {"fromUserId": "u2", "toUserId": "u1", "content": "hi", "timestamp": "T1"}
    }));

    let mut log = session.messages();
    within(log.wait_for(|l| l.len() == 1)).await.unwrap();
    let last = log.borrow().last().cloned().unwrap();
    assert_eq!(last.from_user_id, "u2");
    assert_eq!(last.content, "hi");
    assert_eq!(last.timestamp, "T1");

    let received = within(async {
        loop {
            if let RealtimeEvent::MessageReceived(m) = events.recv().await.unwrap() {
                return m;
            }
        }
    })
    .await;
    assert_eq!(received.content, "hi");
}

#[tokio::test(start_paused = true)]
async fn test_send_message_when_connected() {
    let (session, transport) = create_test_session(MemoryBehavior::Manual);
    let peer = connect_as(&session, &transport, "u1").await;

    let sent = session.send_message("u2", "hello").await.unwrap();
    assert_eq!(sent.from_user_id, "u1");

    let frames = peer.sent_json();
    assert_eq!(peer.sent_types(), vec!["auth", "message"]);
    assert_eq!(frames[0], json!({"type": "auth", "userId": "u1", "token": "token-u1"}));
    assert_eq!(
        frames[1],
        json!({"type": "message", "fromUserId": "u1", "toUserId": "u2", "content": "hello"})
    );
    // Without local echo nothing is shown until the server echoes it.
    assert!(session.messages().borrow().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_presence_flap_is_reflected() {
    let (session, transport) = create_test_session(MemoryBehavior::Manual);
    let peer = connect_as(&session, &transport, "u1").await;
    let mut presence = session.presence();
    assert_eq!(presence.borrow().is_online("u2"), None);

    peer.push_json(json!({"type": "userStatus", "userId": "u2", "isOnline": true}));
    within(presence.wait_for(|p| p.is_online("u2") == Some(true))).await.unwrap();

    peer.push_json(json!({"type": "userStatus", "userId": "u2", "isOnline": false}));
    within(presence.wait_for(|p| p.is_online("u2") == Some(false))).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_no_outbound_frame_unless_connected() {
    let (session, transport) = create_test_session(MemoryBehavior::Manual);

    assert!(matches!(
        session.send_message("u2", "early").await,
        Err(PdError::NotBound)
    ));

    session.bind(identity("u1")).await.unwrap();
    let peer = within(transport.wait_for_connection(1)).await;
    assert!(matches!(
        session.send_message("u2", "connecting").await,
        Err(PdError::NotConnected)
    ));

    peer.open();
    wait_for_state(&session, ConnectionState::Authenticating).await;
    assert!(matches!(
        session.send_message("u2", "authenticating").await,
        Err(PdError::NotConnected)
    ));
    assert!(matches!(
        session
            .respond_to_friend_request("fr-1", FriendRequestStatus::Accepted)
            .await,
        Err(PdError::NotConnected)
    ));
    assert_eq!(peer.sent_types(), vec!["auth"]);

    peer.push_json(json!({"type": "authAck"}));
    wait_for_state(&session, ConnectionState::Connected).await;
    peer.close(1006, "gone");
    within(async {
        let mut rx = session.state_receiver();
        rx.wait_for(|s| matches!(s, ConnectionState::Reconnecting { .. })).await.unwrap();
    })
    .await;
    assert!(matches!(
        session.send_message("u2", "reconnecting").await,
        Err(PdError::NotConnected)
    ));
    assert_eq!(peer.sent_types(), vec!["auth"]);
}

#[tokio::test(start_paused = true)]
async fn test_app_frames_before_ack_are_dropped() {
    let (session, transport) = create_test_session(MemoryBehavior::Manual);
    session.bind(identity("u1")).await.unwrap();
    let peer = within(transport.wait_for_connection(1)).await;
    peer.open();
    wait_for_state(&session, ConnectionState::Authenticating).await;

    peer.push_json(json!({"type": "userStatus", "userId": "u2", "isOnline": true}));
    peer.push_json(json!({"type": "authAck"}));
    wait_for_state(&session, ConnectionState::Connected).await;

    assert_eq!(session.presence().borrow().is_online("u2"), None);
}

#[tokio::test(start_paused = true)]
async fn test_rebind_discards_previous_epoch() {
    let (session, transport) = create_test_session(MemoryBehavior::Manual);

    let first_epoch = session.bind(identity("u1")).await.unwrap();
    let old = within(transport.wait_for_connection(1)).await;
    old.open();
    wait_for_state(&session, ConnectionState::Authenticating).await;

    let second_epoch = session.bind(identity("u2")).await.unwrap();
    assert!(second_epoch > first_epoch);
    assert!(old.closed_by_client());

    // A late ack for the old identity must not connect the new binding.
    old.push_json(json!({"type": "authAck"}));

    let new = within(transport.wait_for_connection(2)).await;
    assert_eq!(new.url(), "ws://localhost:3000/ws?userId=u2");
    assert_eq!(new.tag().epoch, second_epoch);
    tokio::task::yield_now().await;
    assert!(!session.is_connected());

    new.open();
    wait_for_state(&session, ConnectionState::Authenticating).await;
    assert_eq!(new.sent_json()[0]["userId"], "u2");
    assert!(!session.is_connected());

    // Snapshots fetched for the old binding are discarded.
    let stale = session.hydrate_friend_requests(
        first_epoch,
        vec![friend_request("fr-1", "u9", FriendRequestStatus::Pending)],
    );
    assert!(stale.is_none());
    assert!(session.friend_requests().borrow().is_empty());

    new.push_json(json!({"type": "authAck"}));
    wait_for_state(&session, ConnectionState::Connected).await;
    assert_eq!(session.identity().await.unwrap().user_id, "u2");
}

#[tokio::test(start_paused = true)]
async fn test_rebind_from_connected_starts_disconnected() {
    let (session, transport) = create_test_session(MemoryBehavior::Manual);
    let old = connect_as(&session, &transport, "u1").await;
    let mut events = session.subscribe();

    session.bind(identity("u2")).await.unwrap();
    assert!(old.closed_by_client());
    assert!(!session.is_connected());
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(matches!(
        events.try_recv(),
        Ok(RealtimeEvent::StateChanged(ConnectionState::Disconnected))
    ));

    // Waiting for the new binding must not resolve on the old state.
    let mut rx = session.state_receiver();
    let early = tokio::time::timeout(
        Duration::from_secs(1),
        rx.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await;
    assert!(early.is_err());

    accept_and_ack(&session, &transport, 2).await;
    assert_eq!(session.identity().await.unwrap().user_id, "u2");
}

#[tokio::test(start_paused = true)]
async fn test_rebind_same_user_is_noop() {
    let (session, transport) = create_test_session(MemoryBehavior::Manual);
    let _peer = connect_as(&session, &transport, "u1").await;

    let epoch = session.current_epoch();
    assert_eq!(session.bind(identity("u1")).await.unwrap(), epoch);
    tokio::task::yield_now().await;
    assert_eq!(transport.connection_count(), 1);
    assert!(session.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_immediate_close_backs_off_then_resets() {
    let (session, transport) = create_test_session(MemoryBehavior::OpenThenClose);
    let mut events = session.subscribe();
    session.bind(identity("u1")).await.unwrap();

    let mut seen = Vec::new();
    within(async {
        while seen.len() < 3 {
            if let RealtimeEvent::StateChanged(ConnectionState::Reconnecting { attempt, delay }) =
                events.recv().await.unwrap()
            {
                seen.push((attempt, delay));
            }
        }
    })
    .await;

    assert_eq!(
        seen,
        vec![
            (1, Duration::from_secs(1)),
            (2, Duration::from_secs(2)),
            (3, Duration::from_secs(4)),
        ]
    );

    // Let the next attempt succeed, then drop it again.
    transport.set_behavior(MemoryBehavior::Manual);
    let peer = accept_and_ack(&session, &transport, 4).await;
    peer.close(1006, "gone");

    let mut rx = session.state_receiver();
    let state = within(rx.wait_for(|s| matches!(s, ConnectionState::Reconnecting { .. })))
        .await
        .unwrap()
        .clone();
    assert_eq!(
        state,
        ConnectionState::Reconnecting { attempt: 1, delay: Duration::from_secs(1) }
    );
}

#[tokio::test(start_paused = true)]
async fn test_refused_connection_keeps_retrying() {
    let (session, transport) = create_test_session(MemoryBehavior::Refuse);
    session.bind(identity("u1")).await.unwrap();

    within(transport.wait_for_connection(4)).await;
    assert!(!session.is_connected());
    assert!(matches!(session.state(), ConnectionState::Reconnecting { .. } | ConnectionState::Connecting));
}

#[tokio::test(start_paused = true)]
async fn test_auth_rejection_surfaces_after_threshold() {
    let (session, transport) = create_test_session(MemoryBehavior::Manual);
    let mut events = session.subscribe();
    session.bind(identity("u1")).await.unwrap();

    for n in 1..=2 {
        let peer = within(transport.wait_for_connection(n)).await;
        peer.open();
        wait_for_state(&session, ConnectionState::Authenticating).await;
        peer.push_json(json!({"type": "authError", "reason": "bad token"}));
        within(async {
            let mut rx = session.state_receiver();
            rx.wait_for(|s| matches!(s, ConnectionState::Reconnecting { .. })).await.unwrap();
        })
        .await;
        assert!(peer.closed_by_client());
    }

    let (reason, consecutive) = within(async {
        loop {
            if let RealtimeEvent::AuthRejected { reason, consecutive } = events.recv().await.unwrap() {
                return (reason, consecutive);
            }
        }
    })
    .await;
    assert_eq!(reason, "bad token");
    assert_eq!(consecutive, 2);
}

#[tokio::test(start_paused = true)]
async fn test_auth_timeout_triggers_reconnect() {
    let (session, transport) = create_test_session(MemoryBehavior::Manual);
    session.bind(identity("u1")).await.unwrap();
    let peer = within(transport.wait_for_connection(1)).await;
    peer.open();
    wait_for_state(&session, ConnectionState::Authenticating).await;

    // No ack: the auth timeout fires and a new connection follows.
    let next = within(transport.wait_for_connection(2)).await;
    assert!(peer.closed_by_client());
    assert_eq!(next.tag().serial, peer.tag().serial + 1);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_are_dropped() {
    let (session, transport) = create_test_session(MemoryBehavior::Manual);
    let peer = connect_as(&session, &transport, "u1").await;

    peer.push_frame("not json");
    peer.push_json(json!({"type": "typing", "userId": "u2"}));
    peer.push_json(json!({"type": "userStatus", "userId": "u2"}));
    peer.push_json(json!({
        "type": "message",
        "message": {"fromUserId": "u2", "toUserId": "u1", "content": "still here", "timestamp": "T"}
    }));

    let mut log = session.messages();
    within(log.wait_for(|l| l.len() == 1)).await.unwrap();
    assert!(session.is_connected());
    assert_eq!(session.presence().borrow().is_online("u2"), None);
}

#[tokio::test(start_paused = true)]
async fn test_friend_request_lifecycle() {
    let (session, transport) = create_test_session(MemoryBehavior::Manual);
    let peer = connect_as(&session, &transport, "u1").await;

    let summary = session
        .hydrate_from(&StaticSource(vec![friend_request("fr-1", "u2", FriendRequestStatus::Pending)]))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.inserted, 1);

    peer.push_json(json!({
        "type": "friendRequest",
        "request": {"id": "fr-2", "fromUser": {"id": "u3", "username": "carol"}, "status": "pending"}
    }));
    let mut requests = session.friend_requests();
    within(requests.wait_for(|set| set.len() == 2)).await.unwrap();

    session
        .respond_to_friend_request("fr-1", FriendRequestStatus::Accepted)
        .await
        .unwrap();
    assert_eq!(
        peer.sent_json().last().unwrap(),
        &json!({"type": "friendRequestResponse", "requestId": "fr-1", "status": "accepted"})
    );
    // Not applied locally until the server confirms.
    assert_eq!(
        session.friend_requests().borrow().get("fr-1").unwrap().status,
        FriendRequestStatus::Pending
    );

    peer.push_json(json!({"type": "friendRequestResponse", "requestId": "fr-1", "status": "accepted"}));
    within(requests.wait_for(|set| {
        set.get("fr-1").map(|r| r.status) == Some(FriendRequestStatus::Accepted)
    }))
    .await
    .unwrap();

    // A late pending push for a settled request is stale.
    peer.push_json(json!({
        "type": "friendRequest",
        "request": {"id": "fr-1", "fromUser": {"id": "u2"}, "status": "pending"}
    }));
    peer.push_json(json!({"type": "friendRequestResponse", "requestId": "fr-404", "status": "declined"}));
    peer.push_json(json!({"type": "userStatus", "userId": "u5", "isOnline": true}));
    let mut presence = session.presence();
    within(presence.wait_for(|p| p.is_online("u5").is_some())).await.unwrap();

    let set = session.friend_requests().borrow().clone();
    assert_eq!(set.len(), 2);
    assert_eq!(set.get("fr-1").unwrap().status, FriendRequestStatus::Accepted);
    assert!(set.get("fr-404").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_local_echo_confirmed_by_server() {
    let mut options = test_options();
    options.local_echo = true;
    let (session, transport) = create_session_with(options, MemoryBehavior::Manual);
    let peer = connect_as(&session, &transport, "u1").await;

    session.send_message("u2", "hello").await.unwrap();
    {
        let log = session.messages();
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert!(log.entries()[0].is_pending());
    }

    peer.push_json(json!({
        "type": "message",
        "message": {"fromUserId": "u1", "toUserId": "u2", "content": "hello", "timestamp": "SERVER"}
    }));
    let mut log = session.messages();
    within(log.wait_for(|l| l.entries().iter().all(|e| !e.is_pending()))).await.unwrap();
    assert_eq!(log.borrow().len(), 1);
    assert_eq!(log.borrow().last().unwrap().timestamp, "SERVER");
}

#[tokio::test(start_paused = true)]
async fn test_unbind_closes_and_clears() {
    let (session, transport) = create_test_session(MemoryBehavior::Manual);
    let peer = connect_as(&session, &transport, "u1").await;
    peer.push_json(json!({"type": "userStatus", "userId": "u2", "isOnline": true}));
    let mut presence = session.presence();
    within(presence.wait_for(|p| !p.is_empty())).await.unwrap();

    session.unbind().await;
    assert_eq!(session.state(), ConnectionState::Closed);
    assert!(peer.closed_by_client());
    assert!(session.presence().borrow().is_empty());
    assert!(session.identity().await.is_none());
    assert!(matches!(
        session.send_message("u2", "bye").await,
        Err(PdError::NotBound)
    ));

    session.unbind().await;
    assert_eq!(session.state(), ConnectionState::Closed);

    // A fresh bind works after unbind.
    let again = connect_as(&session, &transport, "u1").await;
    assert_eq!(again.tag().serial, 1);
    assert!(session.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_session_closes_transport() {
    let (session, transport) = create_test_session(MemoryBehavior::Manual);
    let peer = connect_as(&session, &transport, "u1").await;

    drop(session);
    // Let the runtime reap the aborted driver.
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(peer.closed_by_client());
    drop(transport);
}
