//! External event-id deduplication (§5, §8).
//!
//! Every handler exposed to an external callback — payment confirmation,
//! a shipment delivery event, quote acceptance, a governance vote — must
//! dedupe on the caller-supplied `event_id` and refuse to re-apply its
//! side effects on replay. [`crate::error::Error::is_duplicate_event`] lets
//! a caller at the edge treat the resulting conflict as success rather
//! than a fresh failure.

use dashmap::DashSet;

/// Tracks event_ids already claimed by a single handler. One instance per
/// handler (not shared across distinct operations), since the same
/// `event_id` issued by two different upstreams must not collide.
#[derive(Default)]
pub struct EventDedupe {
    seen: DashSet<String>,
}

impl EventDedupe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `key` is claimed, `false` on replay.
    pub fn try_claim(&self, key: &str) -> bool {
        self.seen.insert(key.to_string())
    }
}
