//! Bounded buffer for diff events received before a book is synced.

use crate::error::Error;
use crate::types::DiffEvent;

/// Diff events for one symbol, kept in arrival order until reconciliation.
///
/// Owned by a single [`ReconciliationEngine`](super::ReconciliationEngine),
/// so a drain can never interleave with a push.
#[derive(Debug)]
pub struct StreamEventBuffer {
    events: Vec<DiffEvent>,
    capacity: usize,
}

impl StreamEventBuffer {
    /// Create an empty buffer holding at most `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Vec::new(),
            capacity,
        }
    }

    /// Append an event
    ///
    /// Fails with [`Error::BufferOverflow`] when the buffer is already full;
    /// the event is not stored.
    pub fn push(&mut self, event: DiffEvent) -> Result<(), Error> {
        if self.events.len() >= self.capacity {
            return Err(Error::BufferOverflow {
                capacity: self.capacity,
            });
        }
        self.events.push(event);
        Ok(())
    }

    /// Take every buffered event in arrival order, leaving the buffer empty
    pub fn drain_and_clear(&mut self) -> Vec<DiffEvent> {
        std::mem::take(&mut self.events)
    }

    /// Discard every buffered event
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Number of buffered events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Maximum number of buffered events
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
