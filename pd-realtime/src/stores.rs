//! Session-scoped stores: message log, friend request set, presence map.
//!
//! Plain data structures with the merge rules baked in. They hold no locks
//! and do no IO; the dispatcher owns them through watch channels.

use std::collections::HashMap;

use tracing::{debug, warn};
use uuid::Uuid;

use pd_core::error::PdError;
use pd_models::{FriendRequest, FriendRequestStatus, Message, PresenceEntry};

/// One entry in the message log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedMessage {
    pub message: Message,
    /// Set while the entry is an unconfirmed local echo.
    pub pending_ref: Option<Uuid>,
}

impl LoggedMessage {
    pub fn is_pending(&self) -> bool {
        self.pending_ref.is_some()
    }
}

/// What happened to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Appended,
    /// Matched a pending local echo, which now carries the server timestamp.
    ConfirmedEcho(Uuid),
}

/// Ordered message log; insertion order is arrival order.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    entries: Vec<LoggedMessage>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LoggedMessage] {
        &self.entries
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().map(|e| &e.message)
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.last().map(|e| &e.message)
    }

    /// Append an outbound message before the server has echoed it.
    pub fn push_local_echo(&mut self, message: Message) -> Uuid {
        let local_ref = Uuid::new_v4();
        self.entries.push(LoggedMessage {
            message,
            pending_ref: Some(local_ref),
        });
        local_ref
    }

    /// Record a message from the server.
    ///
    /// A message from `self_user_id` matching the oldest pending echo with
    /// the same recipient and content confirms that entry in place.
    pub fn receive(&mut self, message: Message, self_user_id: &str) -> MessageOutcome {
        if message.from_user_id == self_user_id {
            if let Some(entry) = self
                .entries
                .iter_mut()
                .find(|e| e.is_pending() && e.message.same_payload(&message))
            {
                let local_ref = entry.pending_ref.take().unwrap_or_default();
                entry.message.timestamp = message.timestamp;
                debug!("confirmed local echo {local_ref}");
                return MessageOutcome::ConfirmedEcho(local_ref);
            }
        }

        self.entries.push(LoggedMessage {
            message,
            pending_ref: None,
        });
        MessageOutcome::Appended
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Result of applying a realtime friend request push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Inserted,
    Replaced,
    /// The stored request already reached a terminal status.
    Stale,
}

/// Counts from merging a REST snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub inserted: usize,
    pub replaced: usize,
}

/// Friend requests keyed by id, kept in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct FriendRequestSet {
    requests: Vec<FriendRequest>,
}

impl FriendRequestSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&FriendRequest> {
        self.requests.iter().find(|r| r.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FriendRequest> {
        self.requests.iter()
    }

    /// Requests still waiting for an answer.
    pub fn pending(&self) -> impl Iterator<Item = &FriendRequest> {
        self.requests
            .iter()
            .filter(|r| r.status == FriendRequestStatus::Pending)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.requests.iter().position(|r| r.id == id)
    }

    /// Apply a realtime push. New ids are inserted, pending ids replaced,
    /// and pushes for requests that already settled are dropped.
    pub fn apply_push(&mut self, request: FriendRequest) -> PushOutcome {
        match self.position(&request.id) {
            None => {
                self.requests.push(request);
                PushOutcome::Inserted
            }
            Some(idx) if self.requests[idx].status.is_terminal() => {
                debug!(
                    "ignoring stale push for friend request {} ({})",
                    request.id, self.requests[idx].status
                );
                PushOutcome::Stale
            }
            Some(idx) => {
                self.requests[idx] = request;
                PushOutcome::Replaced
            }
        }
    }

    /// Apply a server status update. Returns the previous status, or `None`
    /// when the id is unknown.
    pub fn apply_response(
        &mut self,
        request_id: &str,
        status: FriendRequestStatus,
    ) -> Option<FriendRequestStatus> {
        match self.position(request_id) {
            Some(idx) => {
                let previous = self.requests[idx].status;
                self.requests[idx].status = status;
                Some(previous)
            }
            None => {
                let violation = PdError::ProtocolViolation(format!(
                    "status update for unknown friend request {request_id}"
                ));
                warn!("{violation}");
                None
            }
        }
    }

    /// Merge a REST snapshot. Snapshot entries overwrite stored ones.
    pub fn merge_snapshot(&mut self, snapshot: Vec<FriendRequest>) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for request in snapshot {
            match self.position(&request.id) {
                Some(idx) => {
                    self.requests[idx] = request;
                    summary.replaced += 1;
                }
                None => {
                    self.requests.push(request);
                    summary.inserted += 1;
                }
            }
        }
        summary
    }

    pub fn clear(&mut self) {
        self.requests.clear();
    }
}

/// Last reported online status per user. Absence means unknown.
#[derive(Debug, Clone, Default)]
pub struct PresenceMap {
    online: HashMap<String, bool>,
}

impl PresenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a status report. Last write wins.
    pub fn set(&mut self, user_id: impl Into<String>, is_online: bool) {
        self.online.insert(user_id.into(), is_online);
    }

    pub fn apply(&mut self, entry: &PresenceEntry) {
        self.set(entry.user_id.clone(), entry.is_online);
    }

    pub fn is_online(&self, user_id: &str) -> Option<bool> {
        self.online.get(user_id).copied()
    }

    /// Users currently reported online.
    pub fn online_users(&self) -> impl Iterator<Item = &str> {
        self.online
            .iter()
            .filter(|(_, online)| **online)
            .map(|(id, _)| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.online.len()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }

    pub fn clear(&mut self) {
        self.online.clear();
    }
}
