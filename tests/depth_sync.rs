//! Integration tests for snapshot/stream synchronization.
//!
//! These drive a [`SubscriptionRegistry`] end to end with a scripted
//! snapshot source, so no network access is needed.
//!
//! # Running
//!
//! ```bash
//! cargo test --test depth_sync
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use binance_depth::config::{BackoffConfig, SyncConfig};
use binance_depth::error::ApiError;
use binance_depth::sync::{BookEvent, ResyncReason, SnapshotFetcher, SubscriptionRegistry, SyncState};
use binance_depth::types::{DiffEvent, PriceLevel, Snapshot};
use binance_depth::Error;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

/// Snapshot source answering each fetch with the next scripted result
struct ScriptedFetcher {
    responses: Mutex<mpsc::UnboundedReceiver<Result<Snapshot, Error>>>,
    calls: AtomicUsize,
}

#[async_trait]
impl SnapshotFetcher for ScriptedFetcher {
    async fn fetch(&self, _symbol: &str) -> Result<Snapshot, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().await;
        match responses.recv().await {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}

struct Harness {
    registry: SubscriptionRegistry,
    fetcher: Arc<ScriptedFetcher>,
    script: mpsc::UnboundedSender<Result<Snapshot, Error>>,
}

impl Harness {
    fn new(config: SyncConfig) -> Self {
        let (script, responses) = mpsc::unbounded_channel();
        let fetcher = Arc::new(ScriptedFetcher {
            responses: Mutex::new(responses),
            calls: AtomicUsize::new(0),
        });
        let registry = SubscriptionRegistry::new(fetcher.clone(), config);
        Self {
            registry,
            fetcher,
            script,
        }
    }

    fn subscribe(&self, symbol: &str) -> mpsc::UnboundedReceiver<BookEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry
            .subscribe(symbol, move |event: &BookEvent| {
                let _ = tx.send(event.clone());
            })
            .unwrap();
        rx
    }

    fn answer(&self, result: Result<Snapshot, Error>) {
        self.script.send(result).unwrap();
    }

    async fn wait_for_calls(&self, n: usize) {
        timeout(WAIT, async {
            while self.fetcher.calls.load(Ordering::SeqCst) < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("fetch was not issued");
    }
}

/// Fast config for tests
fn config() -> SyncConfig {
    SyncConfig::default().with_snapshot_retry_backoff(BackoffConfig::new().initial_delay_ms(1).max_delay_ms(5))
}

fn d(n: i64) -> Decimal {
    Decimal::from(n)
}

fn event(first: u64, last: u64) -> DiffEvent {
    DiffEvent::new("BNBBTC", first, last)
}

fn snapshot(last_update_id: u64) -> Snapshot {
    Snapshot::new("BNBBTC", last_update_id)
        .with_bid(d(100), d(1))
        .with_ask(d(101), d(1))
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<BookEvent>) -> BookEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for book event")
        .expect("callback channel closed")
}

#[tokio::test]
async fn test_buffered_events_reconcile_with_snapshot() {
    let harness = Harness::new(config());
    let mut events = harness.subscribe("BNBBTC");

    assert!(harness.registry.route_event(event(95, 100).with_bid(d(100), Decimal::ZERO)));
    assert!(harness.registry.route_event(event(101, 105).with_bid(d(98), d(5))));
    assert!(harness.registry.route_event(event(106, 110).with_ask(d(103), d(7))));
    harness.answer(Ok(snapshot(100)));

    assert_eq!(
        next_event(&mut events).await,
        BookEvent::Synced {
            symbol: "BNBBTC".into(),
            last_update_id: 110
        }
    );

    let book = harness.registry.get_book("bnbbtc").unwrap();
    assert_eq!(book.last_update_id, 110);
    assert_eq!(book.best_bid(), Some((d(100), d(1))));
    assert_eq!(book.bids.len(), 2);
    assert_eq!(
        book.asks,
        vec![PriceLevel::new(d(101), d(1)), PriceLevel::new(d(103), d(7))]
    );
}

#[tokio::test]
async fn test_live_updates_are_delivered() {
    let harness = Harness::new(config());
    let mut events = harness.subscribe("BNBBTC");

    harness.registry.route_event(event(101, 101));
    harness.answer(Ok(snapshot(100)));
    assert!(matches!(next_event(&mut events).await, BookEvent::Synced { .. }));

    let update = event(102, 104).with_bid(d(99), d(3));
    harness.registry.route_event(update.clone());
    assert_eq!(next_event(&mut events).await, BookEvent::Updated(update));

    let handle = harness.registry.handle("BNBBTC").unwrap();
    assert_eq!(handle.last_update_id(), Some(104));
    assert_eq!(handle.top(1).unwrap().bids, vec![PriceLevel::new(d(100), d(1))]);
}

#[tokio::test]
async fn test_gap_triggers_resync_and_recovers() {
    let harness = Harness::new(config());
    let mut events = harness.subscribe("BNBBTC");

    harness.registry.route_event(event(1, 5));
    harness.answer(Ok(snapshot(0)));
    assert!(matches!(next_event(&mut events).await, BookEvent::Synced { .. }));

    harness.registry.route_event(event(6, 10));
    assert!(matches!(next_event(&mut events).await, BookEvent::Updated(_)));

    harness.registry.route_event(event(15, 20));
    assert_eq!(
        next_event(&mut events).await,
        BookEvent::Resyncing {
            symbol: "BNBBTC".into(),
            attempt: 1,
            reason: ResyncReason::SequenceGap {
                expected: 11,
                got: 15
            }
        }
    );
    assert!(harness.registry.get_book("BNBBTC").is_err());

    harness.wait_for_calls(2).await;
    harness.registry.route_event(event(21, 25));
    harness.answer(Ok(snapshot(22)));

    assert_eq!(
        next_event(&mut events).await,
        BookEvent::Synced {
            symbol: "BNBBTC".into(),
            last_update_id: 25
        }
    );
    assert_eq!(harness.registry.handle("BNBBTC").unwrap().resync_count(), 0);
}

#[tokio::test]
async fn test_snapshot_ahead_of_stream_waits_for_join() {
    let harness = Harness::new(config());
    let mut events = harness.subscribe("BNBBTC");

    harness.answer(Ok(snapshot(100)));
    harness.wait_for_calls(1).await;

    harness.registry.route_event(event(90, 99));
    harness.registry.route_event(event(100, 103));

    assert_eq!(
        next_event(&mut events).await,
        BookEvent::Synced {
            symbol: "BNBBTC".into(),
            last_update_id: 103
        }
    );
}

#[tokio::test]
async fn test_buffer_overflow_resyncs() {
    let harness = Harness::new(config().with_max_buffered_events(3));
    let mut events = harness.subscribe("BNBBTC");

    for i in 1..=4 {
        harness.registry.route_event(event(i, i));
    }

    assert!(matches!(
        next_event(&mut events).await,
        BookEvent::Resyncing {
            attempt: 1,
            reason: ResyncReason::BufferOverflow { capacity: 3 },
            ..
        }
    ));
    assert_eq!(harness.registry.state("BNBBTC"), Some(SyncState::Resyncing));
}

#[tokio::test]
async fn test_exhausted_resyncs_fail_subscription() {
    let harness = Harness::new(config().with_max_resync_attempts(1));
    let mut events = harness.subscribe("BNBBTC");

    harness.answer(Err(Error::Timeout));
    assert!(matches!(
        next_event(&mut events).await,
        BookEvent::Resyncing { attempt: 1, .. }
    ));

    harness.answer(Err(Error::Timeout));
    let failed = next_event(&mut events).await;
    assert!(matches!(failed, BookEvent::Failed { attempts: 1, .. }));
    assert!(matches!(
        failed.into_error(),
        Some(Error::SynchronizationFailed { attempts: 1, .. })
    ));

    // The failed subscription is gone from the registry
    assert_eq!(harness.registry.state("BNBBTC"), None);
    assert!(harness.registry.symbols().is_empty());
    assert!(!harness.registry.route_event(event(1, 1)));

    // The symbol may be subscribed again
    let _events = harness.subscribe("BNBBTC");
    assert_eq!(harness.registry.len(), 1);
}

#[tokio::test]
async fn test_rejected_symbol_fails_without_retry() {
    let harness = Harness::new(config());
    let mut events = harness.subscribe("BNBBTC");

    harness.answer(Err(Error::Api(ApiError::with_code(400, -1121, "Invalid symbol."))));

    assert!(matches!(
        next_event(&mut events).await,
        BookEvent::Failed {
            attempts: 0,
            reason: ResyncReason::SnapshotFetch(_),
            ..
        }
    ));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(harness.fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fetch_timeout_counts_as_transient() {
    let config = config()
        .with_snapshot_fetch_timeout(Duration::from_millis(20))
        .with_max_resync_attempts(0);
    let harness = Harness::new(config);
    let mut events = harness.subscribe("BNBBTC");

    match next_event(&mut events).await {
        BookEvent::Failed { reason, .. } => {
            assert!(reason.to_string().contains("timed out"), "{}", reason)
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

/// Snapshot source whose first fetch panics
struct PanicOnceFetcher {
    calls: AtomicUsize,
}

#[async_trait]
impl SnapshotFetcher for PanicOnceFetcher {
    async fn fetch(&self, _symbol: &str) -> Result<Snapshot, Error> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("snapshot source crashed");
        }
        Ok(snapshot(100))
    }
}

#[tokio::test]
async fn test_crashed_fetch_is_retried() {
    let fetcher = Arc::new(PanicOnceFetcher {
        calls: AtomicUsize::new(0),
    });
    let registry = SubscriptionRegistry::new(fetcher.clone(), config());
    let (tx, mut events) = mpsc::unbounded_channel();
    registry
        .subscribe("BNBBTC", move |event: &BookEvent| {
            let _ = tx.send(event.clone());
        })
        .unwrap();

    match next_event(&mut events).await {
        BookEvent::Resyncing {
            attempt: 1,
            reason: ResyncReason::SnapshotFetch(reason),
            ..
        } => assert!(reason.contains("aborted"), "{}", reason),
        other => panic!("expected resync, got {:?}", other),
    }

    assert!(registry.route_event(event(101, 101)));
    assert_eq!(
        next_event(&mut events).await,
        BookEvent::Synced {
            symbol: "BNBBTC".into(),
            last_update_id: 101
        }
    );
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unsubscribe_during_fetch() {
    let harness = Harness::new(config());
    let mut events = harness.subscribe("BNBBTC");
    let handle = harness.registry.handle("BNBBTC").unwrap();
    harness.wait_for_calls(1).await;

    assert!(harness.registry.unsubscribe("BNBBTC"));
    assert_eq!(handle.state(), SyncState::Closed);
    assert_eq!(harness.registry.state("BNBBTC"), None);

    // The late snapshot goes nowhere
    harness.answer(Ok(snapshot(100)));
    assert!(!harness.registry.route_event(event(101, 101)));
    assert!(timeout(Duration::from_millis(50), events.recv())
        .await
        .map_or(true, |e| e.is_none()));
    assert!(matches!(
        harness.registry.get_book("BNBBTC"),
        Err(Error::NotSubscribed(_))
    ));
}

#[tokio::test]
async fn test_symbols_are_isolated() {
    let harness = Harness::new(config());
    let mut bnb = harness.subscribe("BNBBTC");
    harness.wait_for_calls(1).await;
    let _eth = harness.subscribe("ETHBTC");
    harness.wait_for_calls(2).await;

    // Both fetches are waiting; the first answer goes to whichever holds
    // the script, so give both the same snapshot id
    harness.registry.route_event(event(101, 101));
    harness
        .registry
        .route_event(DiffEvent::new("ETHBTC", 500, 600));
    harness.answer(Ok(snapshot(100)));
    harness.answer(Ok(snapshot(100)));

    assert!(matches!(next_event(&mut bnb).await, BookEvent::Synced { .. }));
    assert_eq!(harness.registry.state("BNBBTC"), Some(SyncState::Synced));

    // The failed join on ETHBTC never touches BNBBTC
    let eth_state = harness.registry.state("ETHBTC");
    assert!(eth_state != Some(SyncState::Synced));
    assert_eq!(harness.registry.get_book("BNBBTC").unwrap().last_update_id, 101);
}

#[tokio::test]
async fn test_unknown_symbol_is_dropped() {
    let harness = Harness::new(config());
    let _events = harness.subscribe("BNBBTC");
    assert!(!harness.registry.route_event(DiffEvent::new("XRPBTC", 1, 2)));
}
