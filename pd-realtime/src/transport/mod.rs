//! Transport adapters.
//!
//! A transport owns one physical connection at a time and reports its
//! lifecycle to a sink. Every event is tagged so the driver can tell which
//! binding and which connection it came from.

mod memory;
mod ws;

pub use memory::{MemoryBehavior, MemoryPeer, MemoryTransport};
pub use ws::WsTransport;

use tokio::sync::mpsc;

use pd_core::error::PdResult;

/// Identifies one connection: the binding epoch plus a per-binding serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnTag {
    pub epoch: u64,
    pub serial: u64,
}

/// Lifecycle of one connection as seen by its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Frame(String),
    Error(String),
    Closed { code: u16, reason: String },
}

/// Where transports deliver their events.
pub type TransportSink = mpsc::UnboundedSender<(ConnTag, TransportEvent)>;

/// Control surface for one open (or opening) connection.
pub trait TransportHandle: Send + Sync {
    /// Queue a text frame. Fails with `PdError::Transport` when not open.
    fn send(&self, raw: String) -> PdResult<()>;

    /// Close the connection. Safe to call more than once.
    fn close(&self);

    fn is_open(&self) -> bool;

    fn tag(&self) -> ConnTag;
}

/// Strategy for opening connections.
pub trait Transport: Send + Sync {
    /// Start connecting to `url`. Events for this connection go to `sink`
    /// tagged with `tag`; the handle is returned before the connection opens.
    fn open(&self, url: &str, tag: ConnTag, sink: TransportSink) -> Box<dyn TransportHandle>;

    fn name(&self) -> &'static str;
}
