//! PostDeck Realtime - the live channel between the dashboard and the server.
//!
//! This crate provides:
//! - Pluggable transports (WebSocket and in-memory) behind one trait
//! - The JSON frame codec for the auth, message, friend request and presence frames
//! - A sans-IO connection state machine with exponential backoff and jitter
//! - Session-scoped stores published as watch channels plus broadcast events
//! - Identity binding with epoch guards so stale connections never leak state

pub mod backoff;
pub mod codec;
pub mod dispatcher;
mod driver;
pub mod endpoint;
pub mod epoch;
pub mod events;
pub mod hydration;
pub mod machine;
pub mod session;
pub mod stores;
pub mod transport;

// Re-export key types
pub use backoff::ReconnectConfig;
pub use codec::{DecodeError, FrameCodec, InboundFrame, JsonCodec, OutboundFrame};
pub use dispatcher::{StreamDispatcher, StreamHub};
pub use endpoint::socket_url;
pub use events::{ConnectionState, EventDispatcher, RealtimeEvent};
pub use hydration::FriendRequestSource;
pub use machine::{Action, ConnectionMachine, Input, MachineConfig, TimerId, TimerKind};
pub use session::{RealtimeSession, SessionOptions};
pub use stores::{FriendRequestSet, LoggedMessage, MergeSummary, MessageLog, PresenceMap};
pub use transport::{
    ConnTag, MemoryBehavior, MemoryPeer, MemoryTransport, Transport, TransportEvent,
    TransportHandle, WsTransport,
};
