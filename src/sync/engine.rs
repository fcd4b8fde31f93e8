//! Per-symbol synchronization state machine.
//!
//! The engine joins a REST snapshot to the diff stream:
//!
//! 1. Every event received while the snapshot is outstanding is buffered.
//! 2. When the snapshot (last update id `S`) arrives, buffered events with
//!    `u <= S` are dropped. The first remaining event must satisfy
//!    `U <= S + 1 <= u`; if it does, the snapshot is loaded and the buffer
//!    replayed on top of it. If no event newer than `S` has arrived yet the
//!    snapshot is held until one does.
//! 3. Once synced, each event must start at `last_update_id + 1`. Older
//!    events are dropped silently; a jump forward is a gap and forces a
//!    resync from a fresh snapshot.
//!
//! The engine performs no I/O. Its transition methods return [`Effect`]s
//! that the driver task carries out.

use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use crate::config::{BackoffConfig, SyncConfig};
use crate::error::Error;
use crate::orderbook::{BookSnapshot, OrderBookCache};
use crate::types::{DiffEvent, Snapshot, UpdateId};

use super::buffer::StreamEventBuffer;
use super::events::{BookEvent, ResyncReason};

/// Synchronization state of one symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Subscription opened, first snapshot outstanding, nothing buffered yet
    Connecting,
    /// Events are buffered while the snapshot is outstanding, or the snapshot
    /// is held until the first event newer than it arrives
    Buffering,
    /// Book is live and applying events as they arrive
    Synced,
    /// Book was discarded; a fresh snapshot is outstanding
    Resyncing,
    /// Terminal; no further events are processed
    Closed,
}

/// Side effect requested by a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Fetch a snapshot after `delay`, reporting it back tagged with `attempt`
    FetchSnapshot {
        /// Sync attempt the snapshot belongs to
        attempt: u64,
        /// Backoff before the request is sent
        delay: Duration,
    },
    /// Deliver a notification to the subscriber
    Notify(BookEvent),
}

/// Synchronization protocol for a single symbol.
///
/// Owns the symbol's event buffer and, once synced, its
/// [`OrderBookCache`]. Every snapshot request is tagged with an attempt
/// number; results for an older attempt are ignored.
#[derive(Debug)]
pub struct ReconciliationEngine {
    symbol: String,
    state: SyncState,
    buffer: StreamEventBuffer,
    cache: Option<OrderBookCache>,
    /// Snapshot waiting for its first joinable event
    held_snapshot: Option<Snapshot>,
    attempt: u64,
    resync_count: u32,
    max_resync_attempts: u32,
    backoff: BackoffConfig,
}

impl ReconciliationEngine {
    /// Create an engine in [`SyncState::Connecting`]
    pub fn new(symbol: impl Into<String>, config: &SyncConfig) -> Self {
        Self {
            symbol: symbol.into(),
            state: SyncState::Connecting,
            buffer: StreamEventBuffer::new(config.max_buffered_events_per_symbol),
            cache: None,
            held_snapshot: None,
            attempt: 0,
            resync_count: 0,
            max_resync_attempts: config.max_resync_attempts,
            backoff: config.snapshot_retry_backoff.clone(),
        }
    }

    /// The fetch that starts the first sync attempt
    pub fn start(&self) -> Effect {
        Effect::FetchSnapshot {
            attempt: self.attempt,
            delay: Duration::ZERO,
        }
    }

    /// Handle a diff event from the stream
    pub fn on_event(&mut self, event: DiffEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        match self.state {
            SyncState::Closed => {}
            SyncState::Synced => self.apply_live(event, &mut effects, true),
            SyncState::Buffering if self.held_snapshot.is_some() => {
                self.join_held(event, &mut effects)
            }
            SyncState::Connecting | SyncState::Buffering | SyncState::Resyncing => {
                match self.buffer.push(event) {
                    Ok(()) => {
                        if self.state == SyncState::Connecting {
                            self.state = SyncState::Buffering;
                        }
                    }
                    Err(_) => {
                        let capacity = self.buffer.capacity();
                        let reason = ResyncReason::BufferOverflow { capacity };
                        self.resync(reason, None, &mut effects);
                    }
                }
            }
        }
        effects
    }

    /// Handle the outcome of the snapshot fetch issued for `attempt`
    pub fn on_snapshot(&mut self, attempt: u64, result: Result<Snapshot, Error>) -> Vec<Effect> {
        let mut effects = Vec::new();

        let awaiting = matches!(
            self.state,
            SyncState::Connecting | SyncState::Buffering | SyncState::Resyncing
        ) && self.held_snapshot.is_none();
        if attempt != self.attempt || !awaiting {
            debug!(
                symbol = %self.symbol,
                attempt,
                current = self.attempt,
                "ignoring superseded snapshot"
            );
            return effects;
        }

        match result {
            Ok(snapshot) => self.reconcile(snapshot, &mut effects),
            Err(err) => {
                let reason = ResyncReason::SnapshotFetch(err.to_string());
                if err.is_transient() {
                    warn!(symbol = %self.symbol, error = %err, "snapshot fetch failed");
                    self.resync(reason, err.retry_after(), &mut effects);
                } else {
                    self.fail(reason, &mut effects);
                }
            }
        }
        effects
    }

    /// Close the engine and release its buffer and book
    pub fn close(&mut self) {
        self.state = SyncState::Closed;
        self.release();
    }

    fn reconcile(&mut self, snapshot: Snapshot, effects: &mut Vec<Effect>) {
        let last_update_id = snapshot.last_update_id;
        let buffered = self.buffer.drain_and_clear();
        let mut pending = buffered
            .into_iter()
            .filter(|event| event.final_update_id > last_update_id);

        let Some(first) = pending.next() else {
            debug!(
                symbol = %self.symbol,
                last_update_id,
                "snapshot ahead of stream, waiting for first event"
            );
            self.held_snapshot = Some(snapshot);
            self.state = SyncState::Buffering;
            return;
        };

        if !first.covers(last_update_id.saturating_add(1)) {
            self.resync(
                ResyncReason::NoJoinPoint {
                    snapshot_update_id: last_update_id,
                    first_update_id: first.first_update_id,
                },
                None,
                effects,
            );
            return;
        }

        self.install(&snapshot, first);
        for event in pending {
            if self.state != SyncState::Synced {
                break;
            }
            self.apply_live(event, effects, false);
        }
        self.finish_sync(effects);
    }

    fn join_held(&mut self, event: DiffEvent, effects: &mut Vec<Effect>) {
        let Some(snapshot) = self.held_snapshot.take() else {
            return;
        };
        let last_update_id = snapshot.last_update_id;

        if event.final_update_id <= last_update_id {
            trace!(
                symbol = %self.symbol,
                final_update_id = event.final_update_id,
                "stale event before join"
            );
            self.held_snapshot = Some(snapshot);
        } else if event.covers(last_update_id.saturating_add(1)) {
            self.install(&snapshot, event);
            self.finish_sync(effects);
        } else {
            self.resync(
                ResyncReason::NoJoinPoint {
                    snapshot_update_id: last_update_id,
                    first_update_id: event.first_update_id,
                },
                None,
                effects,
            );
        }
    }

    /// Load the snapshot and apply the event that joins it to the stream
    fn install(&mut self, snapshot: &Snapshot, join: DiffEvent) {
        let mut cache = OrderBookCache::from_snapshot(snapshot);
        let joined = cache.apply(join);
        debug_assert!(joined.is_ok(), "join event must be newer than the snapshot");
        self.cache = Some(cache);
        self.state = SyncState::Synced;
    }

    fn finish_sync(&mut self, effects: &mut Vec<Effect>) {
        let Some(last_update_id) = self.last_update_id() else {
            return;
        };
        if self.state != SyncState::Synced {
            return;
        }
        self.resync_count = 0;
        info!(symbol = %self.symbol, last_update_id, "order book synced");
        effects.push(Effect::Notify(BookEvent::Synced {
            symbol: self.symbol.clone(),
            last_update_id,
        }));
    }

    fn apply_live(&mut self, event: DiffEvent, effects: &mut Vec<Effect>, notify: bool) {
        let Some(last_update_id) = self.last_update_id() else {
            return;
        };
        let expected = last_update_id.saturating_add(1);

        if event.first_update_id < expected {
            trace!(
                symbol = %self.symbol,
                first_update_id = event.first_update_id,
                final_update_id = event.final_update_id,
                last_update_id,
                "dropping stale event"
            );
            return;
        }
        if event.first_update_id > expected {
            warn!(
                symbol = %self.symbol,
                expected,
                got = event.first_update_id,
                "sequence gap"
            );
            self.resync(
                ResyncReason::SequenceGap {
                    expected,
                    got: event.first_update_id,
                },
                None,
                effects,
            );
            return;
        }

        let Some(cache) = self.cache.as_mut() else {
            return;
        };
        match cache.apply(event) {
            Ok(applied) if notify => effects.push(Effect::Notify(BookEvent::Updated(applied))),
            Ok(_) => {}
            Err(err) => trace!(symbol = %self.symbol, error = %err, "event not applied"),
        }
    }

    /// Drop the book and request a new snapshot, waiting at least `min_delay`
    fn resync(
        &mut self,
        reason: ResyncReason,
        min_delay: Option<Duration>,
        effects: &mut Vec<Effect>,
    ) {
        if self.resync_count >= self.max_resync_attempts {
            self.fail(reason, effects);
            return;
        }

        self.release();
        self.resync_count += 1;
        self.attempt += 1;
        self.state = SyncState::Resyncing;

        let backoff = self.backoff.delay_for_attempt(self.resync_count - 1);
        let delay = min_delay.map_or(backoff, |min| backoff.max(min));
        warn!(
            symbol = %self.symbol,
            attempt = self.resync_count,
            delay_ms = delay.as_millis() as u64,
            %reason,
            "resyncing order book"
        );
        effects.push(Effect::Notify(BookEvent::Resyncing {
            symbol: self.symbol.clone(),
            attempt: self.resync_count,
            reason,
        }));
        effects.push(Effect::FetchSnapshot {
            attempt: self.attempt,
            delay,
        });
    }

    fn fail(&mut self, reason: ResyncReason, effects: &mut Vec<Effect>) {
        error!(
            symbol = %self.symbol,
            attempts = self.resync_count,
            %reason,
            "order book synchronization failed"
        );
        self.close();
        effects.push(Effect::Notify(BookEvent::Failed {
            symbol: self.symbol.clone(),
            attempts: self.resync_count,
            reason,
        }));
    }

    fn release(&mut self) {
        self.cache = None;
        self.held_snapshot = None;
        self.buffer.clear();
    }

    /// Symbol this engine synchronizes
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Current state
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Resyncs since the book was last synced
    pub fn resync_count(&self) -> u32 {
        self.resync_count
    }

    /// Attempt number of the outstanding snapshot request
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Number of buffered events
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Last applied update id, if synced
    pub fn last_update_id(&self) -> Option<UpdateId> {
        self.cache.as_ref().map(OrderBookCache::last_update_id)
    }

    /// The live cache, if synced
    pub fn cache(&self) -> Option<&OrderBookCache> {
        self.cache.as_ref()
    }

    /// Copy of the book, if synced
    pub fn book(&self) -> Option<BookSnapshot> {
        self.cache.as_ref().map(OrderBookCache::snapshot)
    }
}
