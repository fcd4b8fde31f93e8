//! Local order book cache.
//!
//! This module provides the per-symbol book maintained by the sync engine:
//!
//! - Exact decimal price levels (no floating-point key drift)
//! - O(log n) level updates
//! - Update id tracking so stale events are never applied
//!
//! # Example
//!
//! ```rust
//! use binance_depth::orderbook::OrderBookCache;
//! use binance_depth::types::{DiffEvent, Snapshot};
//! use rust_decimal::Decimal;
//!
//! let snapshot = Snapshot::new("BNBBTC", 100)
//!     .with_bid(Decimal::new(24, 4), Decimal::from(10))
//!     .with_ask(Decimal::new(26, 4), Decimal::from(100));
//! let mut book = OrderBookCache::from_snapshot(&snapshot);
//!
//! let event = DiffEvent::new("BNBBTC", 101, 102).with_bid(Decimal::new(25, 4), Decimal::from(3));
//! book.apply(event)?;
//!
//! assert_eq!(book.best_bid(), Some((Decimal::new(25, 4), Decimal::from(3))));
//! assert_eq!(book.last_update_id(), 102);
//! # Ok::<(), binance_depth::Error>(())
//! ```

pub mod book;
pub mod view;

pub use book::OrderBookCache;
pub use view::BookSnapshot;
