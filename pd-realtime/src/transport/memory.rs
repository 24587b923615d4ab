//! In-process transport.
//!
//! Every `open` creates a [`MemoryPeer`] that plays the server side: it can
//! open, push frames, fail, or close the connection, and it records what
//! the client sent. Meant for tests and scripted harnesses: the transport
//! keeps every peer it ever opened so they can be inspected by number, which
//! grows with each reconnect. A peer stops holding the client's event sender
//! once the client closes it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::debug;

use pd_core::constants::CLOSE_ABNORMAL;
use pd_core::error::{PdError, PdResult};

use super::{ConnTag, Transport, TransportEvent, TransportHandle, TransportSink};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a new connection does on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MemoryBehavior {
    /// Nothing until the peer is driven explicitly.
    #[default]
    Manual,
    /// Open immediately.
    Accept,
    /// Fail immediately with an error and an abnormal close.
    Refuse,
    /// Open, then drop straight away.
    OpenThenClose,
}

#[derive(Default)]
struct Shared {
    behavior: Mutex<MemoryBehavior>,
    peers: Mutex<Vec<MemoryPeer>>,
    opened: Notify,
}

/// Transport whose connections live in memory.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

impl MemoryTransport {
    pub fn new(behavior: MemoryBehavior) -> Self {
        let transport = Self::default();
        transport.set_behavior(behavior);
        transport
    }

    pub fn set_behavior(&self, behavior: MemoryBehavior) {
        *lock(&self.shared.behavior) = behavior;
    }

    /// Every connection opened so far, oldest first.
    pub fn connections(&self) -> Vec<MemoryPeer> {
        lock(&self.shared.peers).clone()
    }

    pub fn connection_count(&self) -> usize {
        lock(&self.shared.peers).len()
    }

    pub fn last(&self) -> Option<MemoryPeer> {
        lock(&self.shared.peers).last().cloned()
    }

    /// Wait until at least `n` connections have been opened and return the `n`th.
    pub async fn wait_for_connection(&self, n: usize) -> MemoryPeer {
        loop {
            let notified = self.shared.opened.notified();
            let found = lock(&self.shared.peers).get(n.saturating_sub(1)).cloned();
            if let Some(peer) = found {
                return peer;
            }
            notified.await;
        }
    }
}

impl Transport for MemoryTransport {
    fn open(&self, url: &str, tag: ConnTag, sink: TransportSink) -> Box<dyn TransportHandle> {
        let peer = MemoryPeer {
            state: Arc::new(PeerState {
                url: url.to_string(),
                tag,
                sink: Mutex::new(Some(sink)),
                open: AtomicBool::new(false),
                closed_by_client: AtomicBool::new(false),
                sent: Mutex::new(Vec::new()),
            }),
        };
        debug!("memory transport opening {url} as {tag:?}");

        lock(&self.shared.peers).push(peer.clone());
        self.shared.opened.notify_waiters();

        let behavior = *lock(&self.shared.behavior);
        match behavior {
            MemoryBehavior::Manual => {}
            MemoryBehavior::Accept => peer.open(),
            MemoryBehavior::Refuse => peer.fail("connection refused"),
            MemoryBehavior::OpenThenClose => {
                peer.open();
                peer.close(CLOSE_ABNORMAL, "dropped");
            }
        }

        Box::new(MemoryHandle { peer })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

struct PeerState {
    url: String,
    tag: ConnTag,
    sink: Mutex<Option<TransportSink>>,
    open: AtomicBool,
    closed_by_client: AtomicBool,
    sent: Mutex<Vec<String>>,
}

/// Server side of one in-memory connection.
#[derive(Clone)]
pub struct MemoryPeer {
    state: Arc<PeerState>,
}

impl MemoryPeer {
    fn emit(&self, event: TransportEvent) {
        match lock(&self.state.sink).as_ref() {
            Some(sink) => {
                let _ = sink.send((self.state.tag, event));
            }
            None => debug!("{:?} is closed, dropping {event:?}", self.state.tag),
        }
    }

    pub fn url(&self) -> &str {
        &self.state.url
    }

    pub fn tag(&self) -> ConnTag {
        self.state.tag
    }

    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }

    pub fn closed_by_client(&self) -> bool {
        self.state.closed_by_client.load(Ordering::SeqCst)
    }

    /// Accept the connection.
    pub fn open(&self) {
        self.state.open.store(true, Ordering::SeqCst);
        self.emit(TransportEvent::Open);
    }

    /// Deliver a raw text frame to the client.
    pub fn push_frame(&self, raw: impl Into<String>) {
        self.emit(TransportEvent::Frame(raw.into()));
    }

    pub fn push_json(&self, value: serde_json::Value) {
        self.push_frame(value.to_string());
    }

    /// Close from the server side.
    pub fn close(&self, code: u16, reason: &str) {
        self.state.open.store(false, Ordering::SeqCst);
        self.emit(TransportEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    /// Report a transport error followed by an abnormal close.
    pub fn fail(&self, reason: &str) {
        self.state.open.store(false, Ordering::SeqCst);
        self.emit(TransportEvent::Error(reason.to_string()));
        self.emit(TransportEvent::Closed {
            code: CLOSE_ABNORMAL,
            reason: reason.to_string(),
        });
    }

    /// Raw frames the client sent, in order.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.state.sent).clone()
    }

    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .filter_map(|raw| serde_json::from_str(raw).ok())
            .collect()
    }

    /// The `type` of every frame the client sent.
    pub fn sent_types(&self) -> Vec<String> {
        self.sent_json()
            .iter()
            .filter_map(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string))
            .collect()
    }
}

struct MemoryHandle {
    peer: MemoryPeer,
}

impl TransportHandle for MemoryHandle {
    fn send(&self, raw: String) -> PdResult<()> {
        if !self.is_open() {
            return Err(PdError::Transport("memory connection is not open".into()));
        }
        lock(&self.peer.state.sent).push(raw);
        Ok(())
    }

    fn close(&self) {
        if !self.peer.state.closed_by_client.swap(true, Ordering::SeqCst) {
            self.peer.state.open.store(false, Ordering::SeqCst);
            lock(&self.peer.state.sink).take();
            debug!("memory connection {:?} closed by client", self.peer.tag());
        }
    }

    fn is_open(&self) -> bool {
        self.peer.is_open() && !self.peer.closed_by_client()
    }

    fn tag(&self) -> ConnTag {
        self.peer.tag()
    }
}
