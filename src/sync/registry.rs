//! Subscription registry and per-symbol driver tasks.
//!
//! This module provides [`SubscriptionRegistry`], a thread-safe map from
//! symbol to a running sync engine.
//!
//! # Design
//!
//! Each subscription gets its own Tokio task that owns the sequential
//! processing of that symbol's events:
//!
//! - The router pushes decoded events into an unbounded channel, so a slow
//!   snapshot never stalls the shared stream connection.
//! - Snapshot fetches run in a separate task and hand their result back
//!   once through a `oneshot` channel.
//! - The engine sits behind a `parking_lot::RwLock` so [`BookHandle`]s can
//!   copy the book out while the driver applies updates.
//!
//! Different symbols never share an engine, so they are processed in parallel.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::error::Error;
use crate::orderbook::BookSnapshot;
use crate::types::{DiffEvent, Snapshot, UpdateId};

use super::engine::{Effect, ReconciliationEngine, SyncState};
use super::events::BookEvent;
use super::fetcher::{fetch_with_timeout, SnapshotFetcher};

/// Subscriber callback for [`BookEvent`]s
///
/// Called from the symbol's driver task with no locks held, so it may query
/// the registry. It should return quickly; events for the symbol wait
/// behind it.
pub type UpdateCallback = Arc<dyn Fn(&BookEvent) + Send + Sync>;

/// Lookup handle for one subscribed symbol.
///
/// Cheap to clone. Reads copy data out of the engine and never hold a
/// reference into the live book.
#[derive(Debug, Clone)]
pub struct BookHandle {
    symbol: String,
    engine: Arc<RwLock<ReconciliationEngine>>,
}

impl BookHandle {
    /// Symbol this handle refers to
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Current sync state
    pub fn state(&self) -> SyncState {
        self.engine.read().state()
    }

    /// Whether the book is synced and queryable
    pub fn is_synced(&self) -> bool {
        self.state() == SyncState::Synced
    }

    /// Copy of the full book, if synced
    pub fn book(&self) -> Option<BookSnapshot> {
        self.engine.read().book()
    }

    /// Copy of the best `depth` levels per side, if synced
    pub fn top(&self, depth: usize) -> Option<BookSnapshot> {
        self.engine.read().cache().map(|c| c.top_snapshot(depth))
    }

    /// Last applied update id, if synced
    pub fn last_update_id(&self) -> Option<UpdateId> {
        self.engine.read().last_update_id()
    }

    /// Resyncs since the book was last synced
    pub fn resync_count(&self) -> u32 {
        self.engine.read().resync_count()
    }
}

/// Entry in the registry
struct Subscription {
    handle: BookHandle,
    events: mpsc::UnboundedSender<DiffEvent>,
    driver: JoinHandle<()>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

type SubscriptionMap = RwLock<FxHashMap<String, Subscription>>;

/// Registry of mirrored symbols.
///
/// # Thread Safety
///
/// The registry is safe to share across threads via `Arc<SubscriptionRegistry>`.
/// Subscribing spawns Tokio tasks, so it must happen inside a runtime.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::{Arc, Weak};
/// use binance_depth::client::RestClient;
/// use binance_depth::config::Config;
/// use binance_depth::sync::{BookEvent, SubscriptionRegistry};
///
/// # async fn example() -> binance_depth::Result<()> {
/// let config = Config::new();
/// let fetcher = Arc::new(RestClient::new(&config)?);
/// let registry = SubscriptionRegistry::new(fetcher, config.sync().clone());
///
/// registry.subscribe("BNBBTC", |event: &BookEvent| {
///     if let BookEvent::Failed { reason, .. } = event {
///         eprintln!("gave up: {}", reason);
///     }
/// })?;
///
/// // In your WebSocket loop:
/// // registry.route_event(diff_event);
///
/// if let Ok(book) = registry.get_book("BNBBTC") {
///     println!("Best bid: {:?}", book.best_bid());
/// }
/// # Ok(())
/// # }
/// ```
pub struct SubscriptionRegistry {
    fetcher: Arc<dyn SnapshotFetcher>,
    config: SyncConfig,
    subscriptions: Arc<SubscriptionMap>,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("config", &self.config)
            .field("symbols", &self.symbols())
            .finish()
    }
}

impl SubscriptionRegistry {
    /// Create an empty registry fetching snapshots from `fetcher`
    pub fn new(fetcher: Arc<dyn SnapshotFetcher>, config: SyncConfig) -> Self {
        Self {
            fetcher,
            config,
            subscriptions: Arc::new(RwLock::new(FxHashMap::default())),
        }
    }

    /// Start mirroring `symbol`
    ///
    /// Issues the first snapshot fetch immediately; events routed from now on
    /// are buffered until it arrives. A subscription that fails is removed
    /// from the registry, so the symbol may be subscribed again.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadySubscribed`] if the symbol is being mirrored, or
    /// [`Error::Config`] for an empty symbol.
    pub fn subscribe<F>(&self, symbol: &str, on_update: F) -> Result<BookHandle, Error>
    where
        F: Fn(&BookEvent) + Send + Sync + 'static,
    {
        let symbol = symbol.trim().to_ascii_uppercase();
        if symbol.is_empty() {
            return Err(Error::Config("symbol must not be empty".to_string()));
        }

        let mut subscriptions = self.subscriptions.write();
        if let Some(existing) = subscriptions.get(&symbol) {
            if existing.handle.state() != SyncState::Closed {
                return Err(Error::AlreadySubscribed(symbol));
            }
        }

        let engine = Arc::new(RwLock::new(ReconciliationEngine::new(&symbol, &self.config)));
        let handle = BookHandle {
            symbol: symbol.clone(),
            engine: Arc::clone(&engine),
        };

        let (events, rx) = mpsc::unbounded_channel();
        let driver = SymbolDriver {
            symbol: symbol.clone(),
            engine,
            fetcher: Arc::clone(&self.fetcher),
            fetch_timeout: self.config.snapshot_fetch_timeout,
            on_update: Arc::new(on_update),
            registry: Arc::downgrade(&self.subscriptions),
        };
        let driver = tokio::spawn(driver.run(rx));

        info!(symbol = %symbol, "subscribed to depth");
        subscriptions.insert(
            symbol,
            Subscription {
                handle: handle.clone(),
                events,
                driver,
            },
        );
        Ok(handle)
    }

    /// Stop mirroring `symbol` and discard its state
    ///
    /// Safe in any state, including while a snapshot fetch is in flight.
    /// Returns `false` if the symbol was not subscribed.
    pub fn unsubscribe(&self, symbol: &str) -> bool {
        let symbol = symbol.trim().to_ascii_uppercase();
        let removed = self.subscriptions.write().remove(&symbol);
        match removed {
            Some(subscription) => {
                subscription.handle.engine.write().close();
                info!(symbol = %symbol, "unsubscribed from depth");
                true
            }
            None => false,
        }
    }

    /// Route a stream event to its symbol's engine
    ///
    /// Events for symbols without a subscription are dropped; they are
    /// expected briefly after an unsubscribe. Returns whether the event was
    /// accepted.
    pub fn route_event(&self, mut event: DiffEvent) -> bool {
        event.symbol.make_ascii_uppercase();
        let subscriptions = self.subscriptions.read();
        let Some(subscription) = subscriptions.get(&event.symbol) else {
            debug!(symbol = %event.symbol, "dropping depth update for unsubscribed symbol");
            return false;
        };
        if subscription.handle.state() == SyncState::Closed {
            debug!(symbol = %event.symbol, "dropping depth update for closed subscription");
            return false;
        }
        match subscription.events.send(event) {
            Ok(()) => true,
            Err(mpsc::error::SendError(event)) => {
                debug!(symbol = %event.symbol, "dropping depth update for closed subscription");
                false
            }
        }
    }

    /// Copy of the book for `symbol`
    ///
    /// # Errors
    ///
    /// [`Error::NotSubscribed`] if the symbol is unknown or its book is not
    /// synced yet.
    pub fn get_book(&self, symbol: &str) -> Result<BookSnapshot, Error> {
        let symbol = symbol.trim().to_ascii_uppercase();
        self.handle(&symbol)
            .and_then(|handle| handle.book())
            .ok_or(Error::NotSubscribed(symbol))
    }

    /// Lookup handle for `symbol`
    pub fn handle(&self, symbol: &str) -> Option<BookHandle> {
        let symbol = symbol.trim().to_ascii_uppercase();
        self.subscriptions
            .read()
            .get(&symbol)
            .map(|s| s.handle.clone())
    }

    /// Sync state of `symbol`
    pub fn state(&self, symbol: &str) -> Option<SyncState> {
        self.handle(symbol).map(|h| h.state())
    }

    /// All subscribed symbols
    pub fn symbols(&self) -> Vec<String> {
        self.subscriptions.read().keys().cloned().collect()
    }

    /// Number of subscriptions
    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Check if the registry has no subscriptions
    pub fn is_empty(&self) -> bool {
        self.subscriptions.read().is_empty()
    }

    /// Drop every subscription
    pub fn clear(&self) {
        let drained: Vec<Subscription> = self.subscriptions.write().drain().map(|(_, s)| s).collect();
        for subscription in drained {
            subscription.handle.engine.write().close();
        }
    }
}

/// Snapshot request in flight for one sync attempt
struct PendingFetch {
    attempt: u64,
    rx: oneshot::Receiver<Result<Snapshot, Error>>,
    task: JoinHandle<()>,
}

impl Drop for PendingFetch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Sequential processor for one symbol
struct SymbolDriver {
    symbol: String,
    engine: Arc<RwLock<ReconciliationEngine>>,
    fetcher: Arc<dyn SnapshotFetcher>,
    fetch_timeout: Duration,
    on_update: UpdateCallback,
    registry: Weak<SubscriptionMap>,
}

impl SymbolDriver {
    async fn run(self, mut events: mpsc::UnboundedReceiver<DiffEvent>) {
        let start = self.engine.read().start();
        let mut pending = None;
        self.dispatch(vec![start], &mut pending);

        loop {
            tokio::select! {
                received = events.recv() => {
                    let Some(event) = received else { break };
                    let effects = self.engine.write().on_event(event);
                    self.settle(effects, &mut pending);
                }
                (attempt, result) = next_snapshot(&mut pending) => {
                    let mut effects = Vec::new();
                    {
                        let mut engine = self.engine.write();
                        // Events already queued were received before the snapshot
                        while let Ok(event) = events.try_recv() {
                            effects.extend(engine.on_event(event));
                        }
                        effects.extend(engine.on_snapshot(attempt, result));
                    }
                    self.settle(effects, &mut pending);
                }
            }

            if self.engine.read().state() == SyncState::Closed {
                break;
            }
        }
        debug!(symbol = %self.symbol, "depth driver stopped");
    }

    /// Carry out effects, leaving the registry first if the engine closed
    fn settle(&self, effects: Vec<Effect>, pending: &mut Option<PendingFetch>) {
        if self.engine.read().state() == SyncState::Closed {
            self.deregister();
        }
        self.dispatch(effects, pending);
    }

    /// Remove this subscription from the registry unless it was replaced
    fn deregister(&self) {
        let Some(subscriptions) = self.registry.upgrade() else {
            return;
        };
        let removed = {
            let mut subscriptions = subscriptions.write();
            let ours = subscriptions
                .get(&self.symbol)
                .is_some_and(|s| Arc::ptr_eq(&s.handle.engine, &self.engine));
            if ours {
                subscriptions.remove(&self.symbol)
            } else {
                None
            }
        };
        if removed.is_some() {
            info!(symbol = %self.symbol, "closed subscription removed");
        }
    }

    fn dispatch(&self, effects: Vec<Effect>, pending: &mut Option<PendingFetch>) {
        for effect in effects {
            match effect {
                Effect::FetchSnapshot { attempt, delay } => {
                    // Replacing the previous fetch aborts it
                    *pending = Some(self.spawn_fetch(attempt, delay));
                }
                Effect::Notify(event) => (self.on_update)(&event),
            }
        }
    }

    fn spawn_fetch(&self, attempt: u64, delay: Duration) -> PendingFetch {
        let (tx, rx) = oneshot::channel();
        let fetcher = Arc::clone(&self.fetcher);
        let symbol = self.symbol.clone();
        let timeout = self.fetch_timeout;

        let task = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            debug!(symbol = %symbol, attempt, "fetching depth snapshot");
            let result = fetch_with_timeout(fetcher.as_ref(), &symbol, timeout).await;
            // The receiver is gone if the attempt was superseded or the
            // symbol unsubscribed
            let _ = tx.send(result);
        });

        PendingFetch { attempt, rx, task }
    }
}

/// Wait for the outstanding snapshot, or forever if none is outstanding
async fn next_snapshot(pending: &mut Option<PendingFetch>) -> (u64, Result<Snapshot, Error>) {
    let Some(fetch) = pending.as_mut() else {
        return std::future::pending().await;
    };
    let received = (&mut fetch.rx).await;
    let attempt = fetch.attempt;
    *pending = None;

    let result = received.unwrap_or(Err(Error::FetchAborted));
    (attempt, result)
}
