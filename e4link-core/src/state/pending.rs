//! Outstanding commands awaiting acknowledgement.
//!
//! The bridge has no request ids, so requests are keyed by what they
//! target. At most one request per key may be in flight; a second
//! `track` for the same key replaces the first.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::stream::StreamKind;

// ── PendingKey ───────────────────────────────────────────────────

/// The state field an outstanding command is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingKey {
    Subscribe(StreamKind),
    Pause,
}

// ── TrackedRequest ───────────────────────────────────────────────

/// A command sent but not yet acknowledged.
#[derive(Debug, Clone)]
pub struct TrackedRequest {
    /// The on/off state the command asked for.
    pub requested: bool,
    /// When the request was submitted.
    pub sent_at: Instant,
}

impl TrackedRequest {
    /// How long this request has been in flight.
    pub fn elapsed(&self) -> Duration {
        self.sent_at.elapsed()
    }
}

// ── PendingRequests ──────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PendingRequests {
    requests: HashMap<PendingKey, TrackedRequest>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a request, replacing any earlier one for the same key.
    pub fn track(&mut self, key: PendingKey, requested: bool) {
        let previous = self.requests.insert(
            key,
            TrackedRequest {
                requested,
                sent_at: Instant::now(),
            },
        );
        if previous.is_some() {
            tracing::warn!(?key, "replacing in-flight request for the same target");
        }
    }

    /// Resolve (complete) a request, returning it if present.
    pub fn resolve(&mut self, key: PendingKey) -> Option<TrackedRequest> {
        self.requests.remove(&key)
    }

    #[cfg(test)]
    fn pending_count(&self) -> usize {
        self.requests.len()
    }

    #[cfg(test)]
    fn is_pending(&self, key: PendingKey) -> bool {
        self.requests.contains_key(&key)
    }

    #[cfg(test)]
    fn get(&self, key: PendingKey) -> Option<&TrackedRequest> {
        self.requests.get(&key)
    }

    /// Forget everything, e.g. when the connection drops.
    pub fn clear(&mut self) {
        self.requests.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────
