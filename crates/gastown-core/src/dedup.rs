//! Message deduplication for the witness observer.
//!
//! Completion notifications are replayable: if the witness crashes and
//! restarts, re-reading the mailbox could process the same message twice
//! (e.g. a `POLECAT_DONE` creating duplicate cleanup wisps). The
//! deduplicator provides in-memory idempotency within a single witness
//! session. Nudges remain best-effort; the consumer's poll is the
//! authoritative discovery mechanism.

use std::collections::HashSet;
use std::sync::Mutex;

const DEFAULT_CAPACITY_HINT: usize = 10_000;

/// Tracks processed message IDs to prevent duplicate handling.
///
/// Thread-safe for concurrent patrol tasks. The capacity hint is advisory
/// only: the set may grow past it, and nothing is ever evicted. Correctness
/// (no duplicate processing) outranks the soft memory cap.
#[derive(Debug)]
pub struct MessageDeduplicator {
    processed: Mutex<HashSet<String>>,
    capacity_hint: usize,
}

impl MessageDeduplicator {
    /// Create a deduplicator with the given capacity hint. Zero means the
    /// default (10 000 entries).
    #[must_use]
    pub fn new(capacity_hint: usize) -> Self {
        let capacity_hint = if capacity_hint == 0 {
            DEFAULT_CAPACITY_HINT
        } else {
            capacity_hint
        };
        Self {
            processed: Mutex::new(HashSet::new()),
            capacity_hint,
        }
    }

    /// Atomic check-and-set: returns `true` if this message ID has been seen
    /// before. If not seen, records it and returns `false`.
    ///
    /// Empty IDs cannot be deduplicated; they return `false` and are not
    /// recorded.
    pub fn already_processed(&self, message_id: &str) -> bool {
        if message_id.is_empty() {
            return false;
        }
        let mut processed = self.processed.lock().unwrap_or_else(|e| e.into_inner());
        !processed.insert(message_id.to_string())
    }

    /// Number of tracked message IDs.
    pub fn len(&self) -> usize {
        self.processed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Whether no IDs have been tracked yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The advisory capacity hint this deduplicator was created with.
    #[must_use]
    pub const fn capacity_hint(&self) -> usize {
        self.capacity_hint
    }
}

impl Default for MessageDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY_HINT)
    }
}
