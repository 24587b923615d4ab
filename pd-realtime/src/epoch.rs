//! Binding epochs.
//!
//! Each `bind` takes the next epoch from a shared counter. Work started under
//! an older epoch checks its guard before touching shared state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A captured epoch plus the live counter it is compared against.
#[derive(Debug, Clone)]
pub struct EpochGuard {
    epoch: u64,
    current: Arc<AtomicU64>,
}

impl EpochGuard {
    pub fn new(epoch: u64, current: Arc<AtomicU64>) -> Self {
        Self { epoch, current }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether no newer binding has started since this guard was taken.
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.epoch
    }
}
