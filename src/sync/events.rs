//! Notifications delivered to subscribers.

use std::fmt;

use crate::error::Error;
use crate::types::{DiffEvent, UpdateId};

/// Why a symbol's book was discarded and a new snapshot requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResyncReason {
    /// A live event did not continue from the cache's last update id
    SequenceGap {
        /// First update id that would have continued the book
        expected: UpdateId,
        /// First update id actually received
        got: UpdateId,
    },
    /// No buffered event joins the snapshot to the stream
    NoJoinPoint {
        /// Snapshot update id
        snapshot_update_id: UpdateId,
        /// First update id of the earliest event newer than the snapshot
        first_update_id: UpdateId,
    },
    /// Too many events arrived while the snapshot was outstanding
    BufferOverflow {
        /// Configured buffer capacity
        capacity: usize,
    },
    /// The snapshot request failed
    SnapshotFetch(String),
}

impl fmt::Display for ResyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResyncReason::SequenceGap { expected, got } => {
                write!(f, "sequence gap: expected {}, got {}", expected, got)
            }
            ResyncReason::NoJoinPoint {
                snapshot_update_id,
                first_update_id,
            } => write!(
                f,
                "no event joins snapshot {} (earliest newer event starts at {})",
                snapshot_update_id, first_update_id
            ),
            ResyncReason::BufferOverflow { capacity } => {
                write!(f, "event buffer overflow (capacity {})", capacity)
            }
            ResyncReason::SnapshotFetch(msg) => write!(f, "snapshot fetch failed: {}", msg),
        }
    }
}

/// Book notification passed to the subscriber's callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookEvent {
    /// The snapshot was joined to the stream; the book is queryable
    Synced {
        /// Symbol
        symbol: String,
        /// Update id after replaying the buffered events
        last_update_id: UpdateId,
    },
    /// A live diff event was applied
    Updated(DiffEvent),
    /// The book was dropped and a new snapshot requested
    Resyncing {
        /// Symbol
        symbol: String,
        /// Resync attempt number, starting at 1
        attempt: u32,
        /// What triggered the resync
        reason: ResyncReason,
    },
    /// Resync attempts are exhausted; the subscription is closed
    Failed {
        /// Symbol
        symbol: String,
        /// Resync attempts made before giving up
        attempts: u32,
        /// Cause of the final failure
        reason: ResyncReason,
    },
}

impl BookEvent {
    /// Symbol the event belongs to
    pub fn symbol(&self) -> &str {
        match self {
            BookEvent::Synced { symbol, .. }
            | BookEvent::Resyncing { symbol, .. }
            | BookEvent::Failed { symbol, .. } => symbol,
            BookEvent::Updated(event) => &event.symbol,
        }
    }

    /// Whether this is the terminal failure notification
    pub fn is_failure(&self) -> bool {
        matches!(self, BookEvent::Failed { .. })
    }

    /// Convert a terminal failure into [`Error::SynchronizationFailed`]
    pub fn into_error(self) -> Option<Error> {
        match self {
            BookEvent::Failed {
                symbol,
                attempts,
                reason,
            } => Some(Error::SynchronizationFailed {
                symbol,
                attempts,
                reason,
            }),
            _ => None,
        }
    }
}
