//! Snapshot and diff-stream synchronization.
//!
//! A local book is built by combining two feeds that race each other:
//!
//! 1. A REST snapshot giving the full book at some update id.
//! 2. A WebSocket diff stream whose events carry the range of update ids
//!    `[U, u]` they cover.
//!
//! Events are buffered until the snapshot lands. The first buffered event
//! that covers `lastUpdateId + 1` joins the two feeds; everything before it
//! is dropped and everything after it must be contiguous. Any gap, overflow
//! or failed fetch discards the book and starts over with a new snapshot.
//!
//! [`ReconciliationEngine`] holds the per-symbol state machine and never
//! performs I/O. [`SubscriptionRegistry`] owns one engine per symbol and
//! drives it from a Tokio task.

mod buffer;
mod engine;
mod events;
mod fetcher;
mod registry;

pub use buffer::StreamEventBuffer;
pub use engine::{Effect, ReconciliationEngine, SyncState};
pub use events::{BookEvent, ResyncReason};
pub use fetcher::{fetch_with_timeout, SnapshotFetcher};
pub use registry::{BookHandle, SubscriptionRegistry, UpdateCallback};
