//! Realtime event types, connection state, and the event dispatcher.
//!
//! Store contents are published on watch channels; the events here are the
//! change notifications that go with them, fanned out over a tokio broadcast
//! channel so any number of consumers can react independently.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use pd_models::{FriendRequest, FriendRequestStatus, Message, PresenceEntry};

/// Lifecycle state of the realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying to connect.
    Disconnected,
    /// Transport is being opened.
    Connecting,
    /// Transport is open, auth frame sent, waiting for `authAck`.
    Authenticating,
    /// Authenticated and exchanging frames.
    Connected,
    /// Waiting `delay` before reconnect attempt number `attempt`.
    Reconnecting { attempt: u32, delay: Duration },
    /// Binding torn down. Terminal.
    Closed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Short name used in logs and the CLI.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reconnecting { attempt, delay } => {
                write!(f, "reconnecting (attempt {attempt}, in {:.1}s)", delay.as_secs_f64())
            }
            other => f.write_str(other.label()),
        }
    }
}

/// Change notifications emitted by the realtime core.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    /// The connection state changed.
    StateChanged(ConnectionState),
    /// A message was appended to the session log.
    MessageReceived(Message),
    /// The server echoed a message that was already shown as a local echo.
    MessageConfirmed { local_ref: Uuid, message: Message },
    /// A friend request was inserted or refreshed.
    FriendRequestReceived(FriendRequest),
    /// A known friend request changed status.
    FriendRequestUpdated {
        request_id: String,
        status: FriendRequestStatus,
    },
    /// A REST snapshot was merged into the friend request set.
    FriendRequestsHydrated { inserted: usize, replaced: usize },
    /// A user's online status was reported.
    PresenceChanged(PresenceEntry),
    /// The server kept rejecting the identity.
    AuthRejected { reason: String, consecutive: u32 },
}

impl RealtimeEvent {
    /// Human-readable label (for logging).
    pub fn label(&self) -> &'static str {
        match self {
            Self::StateChanged(_) => "StateChanged",
            Self::MessageReceived(_) => "MessageReceived",
            Self::MessageConfirmed { .. } => "MessageConfirmed",
            Self::FriendRequestReceived(_) => "FriendRequestReceived",
            Self::FriendRequestUpdated { .. } => "FriendRequestUpdated",
            Self::FriendRequestsHydrated { .. } => "FriendRequestsHydrated",
            Self::PresenceChanged(_) => "PresenceChanged",
            Self::AuthRejected { .. } => "AuthRejected",
        }
    }
}

/// Broadcast-based event dispatcher.
///
/// Slow consumers that fall behind receive `RecvError::Lagged` and may miss
/// events; the watch channels always hold the latest store contents.
#[derive(Clone)]
pub struct EventDispatcher {
    sender: broadcast::Sender<RealtimeEvent>,
}

impl EventDispatcher {
    /// Create a new EventDispatcher with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to receive realtime events.
    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.sender.subscribe()
    }

    /// Dispatch an event to all active subscribers.
    pub fn dispatch(&self, event: RealtimeEvent) {
        let label = event.label();
        match self.sender.send(event) {
            Ok(count) => {
                debug!("dispatched {label} to {count} subscriber(s)");
            }
            Err(_) => {
                debug!("no subscribers for event {label}");
            }
        }
    }

    /// Get the current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
