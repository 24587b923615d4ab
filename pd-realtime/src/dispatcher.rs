//! Stream dispatcher.
//!
//! Routes decoded application frames into the session stores and publishes
//! every change twice: the full store on its watch channel, and a
//! [`RealtimeEvent`] on the broadcast channel.

use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use pd_models::{FriendRequest, Message, PresenceEntry};

use crate::codec::InboundFrame;
use crate::events::{ConnectionState, EventDispatcher, RealtimeEvent};
use crate::stores::{FriendRequestSet, MergeSummary, MessageLog, MessageOutcome, PresenceMap, PushOutcome};

/// Owner of every observable stream of one session.
///
/// Outlives individual bindings; `reset` clears the stores between them.
pub struct StreamHub {
    messages: watch::Sender<MessageLog>,
    friend_requests: watch::Sender<FriendRequestSet>,
    presence: watch::Sender<PresenceMap>,
    state: watch::Sender<ConnectionState>,
    events: EventDispatcher,
}

impl StreamHub {
    pub fn new(event_capacity: usize) -> Self {
        Self {
            messages: watch::channel(MessageLog::new()).0,
            friend_requests: watch::channel(FriendRequestSet::new()).0,
            presence: watch::channel(PresenceMap::new()).0,
            state: watch::channel(ConnectionState::Disconnected).0,
            events: EventDispatcher::new(event_capacity),
        }
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    pub fn messages(&self) -> watch::Receiver<MessageLog> {
        self.messages.subscribe()
    }

    pub fn friend_requests(&self) -> watch::Receiver<FriendRequestSet> {
        self.friend_requests.subscribe()
    }

    pub fn presence(&self) -> watch::Receiver<PresenceMap> {
        self.presence.subscribe()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Publish a new connection state. Returns false when it was unchanged.
    pub fn publish_state(&self, next: ConnectionState) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            self.events.dispatch(RealtimeEvent::StateChanged(next));
        }
        changed
    }

    /// Clear all stores.
    pub fn reset(&self) {
        self.messages.send_modify(MessageLog::clear);
        self.friend_requests.send_modify(FriendRequestSet::clear);
        self.presence.send_modify(PresenceMap::clear);
    }

    /// Merge a REST snapshot if `accept` still holds when the store is locked.
    pub(crate) fn merge_snapshot_if(
        &self,
        snapshot: Vec<FriendRequest>,
        accept: impl FnOnce() -> bool,
    ) -> Option<MergeSummary> {
        let mut summary = None;
        self.friend_requests.send_if_modified(|set| {
            if !accept() {
                return false;
            }
            let merged = set.merge_snapshot(snapshot);
            summary = Some(merged);
            merged.inserted + merged.replaced > 0
        });

        if let Some(merged) = summary {
            self.events.dispatch(RealtimeEvent::FriendRequestsHydrated {
                inserted: merged.inserted,
                replaced: merged.replaced,
            });
        }
        summary
    }
}

/// Applies inbound application frames for one bound user.
pub struct StreamDispatcher<'a> {
    hub: &'a StreamHub,
    self_user_id: &'a str,
}

impl<'a> StreamDispatcher<'a> {
    pub fn new(hub: &'a StreamHub, self_user_id: &'a str) -> Self {
        Self { hub, self_user_id }
    }

    /// Route one decoded frame. Handshake frames are not for the stores.
    pub fn apply(&self, frame: InboundFrame) {
        match frame {
            InboundFrame::Message { message } => self.on_message(message),
            InboundFrame::FriendRequest { request } => self.on_friend_request(request),
            InboundFrame::FriendRequestResponse { request_id, status } => {
                let mut previous = None;
                self.hub.friend_requests.send_if_modified(|set| {
                    previous = set.apply_response(&request_id, status);
                    previous.is_some_and(|p| p != status)
                });
                if previous.is_some() {
                    self.hub
                        .events
                        .dispatch(RealtimeEvent::FriendRequestUpdated { request_id, status });
                }
            }
            InboundFrame::UserStatus { user_id, is_online } => {
                self.hub
                    .presence
                    .send_modify(|presence| presence.set(user_id.clone(), is_online));
                self.hub
                    .events
                    .dispatch(RealtimeEvent::PresenceChanged(PresenceEntry { user_id, is_online }));
            }
            handshake @ (InboundFrame::AuthAck {} | InboundFrame::AuthError { .. }) => {
                debug!("dispatcher ignoring handshake frame {}", handshake.kind());
            }
        }
    }

    /// Append an outbound message before the server confirms it.
    pub fn local_echo(&self, message: Message) -> Uuid {
        let mut local_ref = Uuid::nil();
        self.hub
            .messages
            .send_modify(|log| local_ref = log.push_local_echo(message.clone()));
        self.hub.events.dispatch(RealtimeEvent::MessageReceived(message));
        local_ref
    }

    fn on_message(&self, message: Message) {
        let mut outcome = MessageOutcome::Appended;
        self.hub
            .messages
            .send_modify(|log| outcome = log.receive(message.clone(), self.self_user_id));

        let event = match outcome {
            MessageOutcome::Appended => RealtimeEvent::MessageReceived(message),
            MessageOutcome::ConfirmedEcho(local_ref) => {
                RealtimeEvent::MessageConfirmed { local_ref, message }
            }
        };
        self.hub.events.dispatch(event);
    }

    fn on_friend_request(&self, request: FriendRequest) {
        let mut outcome = PushOutcome::Stale;
        self.hub.friend_requests.send_if_modified(|set| {
            outcome = set.apply_push(request.clone());
            outcome != PushOutcome::Stale
        });
        if outcome != PushOutcome::Stale {
            self.hub
                .events
                .dispatch(RealtimeEvent::FriendRequestReceived(request));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pd_models::{FriendRequestStatus, UserSummary};

    fn request(id: &str) -> FriendRequest {
        FriendRequest {
            id: id.into(),
            from_user: UserSummary {
                id: "u2".into(),
                username: Some("bob".into()),
                display_name: None,
                avatar_url: None,
            },
            status: FriendRequestStatus::Pending,
        }
    }

    #[tokio::test]
    async fn test_message_frame_updates_log_and_emits() {
        let hub = StreamHub::new(16);
        let mut events = hub.events().subscribe();
        let mut messages = hub.messages();

        StreamDispatcher::new(&hub, "u1").apply(InboundFrame::Message {
            message: Message {
                from_user_id: "u2".into(),
                to_user_id: "u1".into(),
                content: "hi".into(),
                timestamp: "T1".into(),
            },
        });

        assert!(messages.has_changed().unwrap());
        assert_eq!(messages.borrow_and_update().last().unwrap().content, "hi");
        assert!(matches!(events.recv().await.unwrap(), RealtimeEvent::MessageReceived(_)));
    }

    #[tokio::test]
    async fn test_local_echo_then_confirmation() {
        let hub = StreamHub::new(16);
        let mut events = hub.events().subscribe();
        let dispatcher = StreamDispatcher::new(&hub, "u1");

        let local_ref = dispatcher.local_echo(Message::outbound("u1", "u2", "hello"));
        dispatcher.apply(InboundFrame::Message {
            message: Message {
                from_user_id: "u1".into(),
                to_user_id: "u2".into(),
                content: "hello".into(),
                timestamp: "SERVER".into(),
            },
        });

        assert_eq!(hub.messages().borrow().len(), 1);
        assert!(matches!(events.recv().await.unwrap(), RealtimeEvent::MessageReceived(_)));
        match events.recv().await.unwrap() {
            RealtimeEvent::MessageConfirmed { local_ref: r, message } => {
                assert_eq!(r, local_ref);
                assert_eq!(message.timestamp, "SERVER");
            }
            other => panic!("unexpected event {}", other.label()),
        }
    }

    #[test]
    fn test_stale_push_does_not_notify() {
        let hub = StreamHub::new(16);
        let dispatcher = StreamDispatcher::new(&hub, "u1");
        dispatcher.apply(InboundFrame::FriendRequest { request: request("fr-1") });
        dispatcher.apply(InboundFrame::FriendRequestResponse {
            request_id: "fr-1".into(),
            status: FriendRequestStatus::Accepted,
        });

        let mut rx = hub.friend_requests();
        rx.borrow_and_update();
        dispatcher.apply(InboundFrame::FriendRequest { request: request("fr-1") });
        assert!(!rx.has_changed().unwrap());
        assert_eq!(rx.borrow().get("fr-1").unwrap().status, FriendRequestStatus::Accepted);
    }

    #[test]
    fn test_presence_flapping_notifies_each_time() {
        let hub = StreamHub::new(16);
        let dispatcher = StreamDispatcher::new(&hub, "u1");
        let mut rx = hub.presence();

        for online in [true, false, true] {
            dispatcher.apply(InboundFrame::UserStatus { user_id: "u2".into(), is_online: online });
            assert!(rx.has_changed().unwrap());
            assert_eq!(rx.borrow_and_update().is_online("u2"), Some(online));
        }
    }

    #[test]
    fn test_publish_state_dedups() {
        let hub = StreamHub::new(16);
        assert!(hub.publish_state(ConnectionState::Connecting));
        assert!(!hub.publish_state(ConnectionState::Connecting));
        assert_eq!(hub.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_merge_snapshot_respects_guard() {
        let hub = StreamHub::new(16);
        assert_eq!(hub.merge_snapshot_if(vec![request("fr-1")], || false), None);
        assert!(hub.friend_requests().borrow().is_empty());

        let summary = hub.merge_snapshot_if(vec![request("fr-1")], || true).unwrap();
        assert_eq!(summary.inserted, 1);

        hub.reset();
        assert!(hub.friend_requests().borrow().is_empty());
    }
}
