//! # binance-depth
//!
//! Local order book mirroring for [Binance](https://www.binance.com) spot
//! markets.
//!
//! ## Features
//!
//! - **Snapshot/stream reconciliation** - REST depth snapshots joined to the
//!   `<symbol>@depth` diff stream by update id
//! - **Gap detection** - any missing update discards the book and resyncs
//!   from a fresh snapshot with exponential backoff
//! - **Per-symbol isolation** - each symbol is driven by its own Tokio task
//! - **Exact prices** - `rust_decimal` throughout, no floating point
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use binance_depth::sync::BookEvent;
//! use binance_depth::{Config, DepthClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), binance_depth::Error> {
//!     let client = DepthClient::new(Config::new())?;
//!
//!     client.subscribe("BNBBTC", |event: &BookEvent| {
//!         if let BookEvent::Synced { symbol, last_update_id } = event {
//!             println!("{} synced at {}", symbol, last_update_id);
//!         }
//!     })?;
//!
//!     let mut ws = client.connect_stream().await?;
//!     client.pump(&mut ws).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Synchronization
//!
//! Diff events carry the range of update ids `[U, u]` they cover. A snapshot
//! at `lastUpdateId = S` joins the stream at the first event with
//! `U <= S + 1 <= u`; after that each event must start exactly one past the
//! previous one. See [`sync`] for the full protocol.
//!
//! ## Architecture
//!
//! - [`client`] - REST and WebSocket clients for API communication
//! - [`sync`] - Reconciliation engine and subscription registry
//! - [`orderbook`] - Sorted price-level cache and read-only views
//! - [`types`] - Depth events, snapshots and wire formats
//! - [`config`] - Endpoints and synchronization thresholds
//! - [`error`] - Error types for the crate

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod error;
pub mod orderbook;
pub mod sync;
pub mod types;

use std::sync::Arc;

use tracing::{debug, warn};

use client::{RestClient, WebSocketClient};
use orderbook::BookSnapshot;
use sync::{BookEvent, BookHandle, SubscriptionRegistry};

// Re-export main types at crate root for convenience
pub use config::Config;
pub use error::Error;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Order book mirror for a set of Binance symbols
///
/// Combines a [`RestClient`] for snapshots with a [`SubscriptionRegistry`]
/// of per-symbol sync engines. Stream messages are fed in with
/// [`DepthClient::pump`].
///
/// # Example
///
/// ```rust,no_run
/// use binance_depth::sync::BookEvent;
/// use binance_depth::{Config, DepthClient};
///
/// # async fn example() -> binance_depth::Result<()> {
/// let client = DepthClient::new(Config::new())?;
/// client.subscribe("ETHBTC", |_: &BookEvent| {})?;
///
/// let client = std::sync::Arc::new(client);
/// let pump = {
///     let client = client.clone();
///     let mut ws = client.connect_stream().await?;
///     tokio::spawn(async move { client.pump(&mut ws).await })
/// };
///
/// if let Ok(book) = client.get_book("ETHBTC") {
///     println!("{}", book.truncated(5));
/// }
/// # drop(pump);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DepthClient {
    config: Config,
    rest_client: Arc<RestClient>,
    registry: SubscriptionRegistry,
}

impl DepthClient {
    /// Create a new depth client with the given configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot depth limit is invalid or the HTTP
    /// client cannot be initialized.
    pub fn new(config: Config) -> Result<Self> {
        let rest_client = Arc::new(RestClient::new(&config)?);
        let registry = SubscriptionRegistry::new(rest_client.clone(), config.sync().clone());
        Ok(Self {
            config,
            rest_client,
            registry,
        })
    }

    /// Get a reference to the REST client
    pub fn rest(&self) -> &RestClient {
        &self.rest_client
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a reference to the subscription registry
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Start mirroring `symbol`; see [`SubscriptionRegistry::subscribe`]
    ///
    /// Subscribe before connecting the stream, or call
    /// [`WebSocketClient::subscribe_depth`] on a live connection.
    pub fn subscribe<F>(&self, symbol: &str, on_update: F) -> Result<BookHandle>
    where
        F: Fn(&BookEvent) + Send + Sync + 'static,
    {
        self.registry.subscribe(symbol, on_update)
    }

    /// Stop mirroring `symbol`; returns `false` if it was not subscribed
    pub fn unsubscribe(&self, symbol: &str) -> bool {
        self.registry.unsubscribe(symbol)
    }

    /// Copy of the synced book for `symbol`
    ///
    /// # Errors
    ///
    /// [`Error::NotSubscribed`] if the symbol is unknown or not synced yet.
    pub fn get_book(&self, symbol: &str) -> Result<BookSnapshot> {
        self.registry.get_book(symbol)
    }

    /// Connect to the stream endpoint and subscribe every registered symbol
    pub async fn connect_stream(&self) -> Result<WebSocketClient> {
        let mut ws = WebSocketClient::connect(&self.config).await?;

        let symbols = self.registry.symbols();
        if !symbols.is_empty() {
            let refs: Vec<&str> = symbols.iter().map(String::as_str).collect();
            ws.subscribe_depth(&refs).await?;
        }
        Ok(ws)
    }

    /// Route stream messages into the registry until the connection ends
    ///
    /// Undecodable messages and rejected commands are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns the transport error that ended the stream, including
    /// [`Error::ConnectionClosed`] for a close frame.
    pub async fn pump(&self, ws: &mut WebSocketClient) -> Result<()> {
        while let Some(received) = ws.next().await {
            match received {
                Ok(msg) => {
                    if let Some(update) = msg.into_depth_update() {
                        self.registry.route_event(update.into());
                    }
                }
                Err(Error::Json(e)) => warn!(error = %e, "skipping undecodable stream message"),
                Err(Error::Stream { code, message }) => {
                    warn!(code, %message, "stream command failed")
                }
                Err(e) => return Err(e),
            }
        }
        debug!("depth stream ended");
        Ok(())
    }
}
