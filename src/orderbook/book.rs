//! Core order book cache.
//!
//! This implementation uses `BTreeMap` for sorted price levels, providing:
//!
//! - O(log n) insertion, deletion, and lookup
//! - O(log n) access to best bid/ask (via `last_key_value` / `first_key_value`)
//! - Ordered iteration for depth-of-book queries

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::error::Error;
use crate::types::{DiffEvent, Price, PriceLevel, Quantity, Snapshot, UpdateId};

use super::BookSnapshot;

/// Local mirror of one symbol's order book.
///
/// # Design Decisions
///
/// 1. **Decimal prices**: Prices and quantities are `rust_decimal::Decimal`,
///    so keys compare exactly regardless of how many trailing zeros the
///    exchange sends.
///
/// 2. **BTreeMap**: Both sides are stored ascending. Best bid is the last
///    bid key, best ask the first ask key.
///
/// 3. **Update id**: `last_update_id` only moves forward. [`apply`] rejects
///    any event whose final update id is not past it.
///
/// 4. **No zero levels**: a zero quantity removes the price; it is never stored.
///
/// [`apply`]: OrderBookCache::apply
///
/// # Thread Safety
///
/// This struct is not internally synchronized. The sync engine owns it and
/// readers get [`BookSnapshot`] copies.
#[derive(Debug, Clone)]
pub struct OrderBookCache {
    /// Exchange symbol
    symbol: String,

    /// Bid levels: price -> quantity, ascending (best bid = last)
    bids: BTreeMap<Price, Quantity>,

    /// Ask levels: price -> quantity, ascending (best ask = first)
    asks: BTreeMap<Price, Quantity>,

    /// Final update id of the last applied event
    last_update_id: UpdateId,
}

impl OrderBookCache {
    /// Build a cache from a depth snapshot
    #[must_use]
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut cache = Self {
            symbol: snapshot.symbol.clone(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update_id: 0,
        };
        cache.init_from_snapshot(snapshot);
        cache
    }

    /// Replace every level with the snapshot's and reset the update id
    pub fn init_from_snapshot(&mut self, snapshot: &Snapshot) {
        self.bids.clear();
        self.asks.clear();

        for level in &snapshot.bids {
            set_level(&mut self.bids, level);
        }
        for level in &snapshot.asks {
            set_level(&mut self.asks, level);
        }

        self.last_update_id = snapshot.last_update_id;
    }

    /// Apply a diff event
    ///
    /// Returns the event back for observer notification. The cache is left
    /// untouched and [`Error::StaleEvent`] returned when the event does not
    /// advance the update id. Sequence continuity (`first_update_id ==
    /// last_update_id + 1`) is the caller's concern.
    pub fn apply(&mut self, event: DiffEvent) -> Result<DiffEvent, Error> {
        if event.final_update_id <= self.last_update_id {
            return Err(Error::StaleEvent {
                final_update_id: event.final_update_id,
                last_update_id: self.last_update_id,
            });
        }

        for level in &event.bid_changes {
            set_level(&mut self.bids, level);
        }
        for level in &event.ask_changes {
            set_level(&mut self.asks, level);
        }

        self.last_update_id = event.final_update_id;
        Ok(event)
    }

    /// Get the symbol
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Get the final update id of the last applied event
    #[must_use]
    pub const fn last_update_id(&self) -> UpdateId {
        self.last_update_id
    }

    /// Get the best bid (highest bid)
    ///
    /// Returns `(price, quantity)` or `None` if no bids.
    #[must_use]
    pub fn best_bid(&self) -> Option<(Price, Quantity)> {
        self.bids.last_key_value().map(|(&p, &q)| (p, q))
    }

    /// Get the best ask (lowest ask)
    ///
    /// Returns `(price, quantity)` or `None` if no asks.
    #[must_use]
    pub fn best_ask(&self) -> Option<(Price, Quantity)> {
        self.asks.first_key_value().map(|(&p, &q)| (p, q))
    }

    /// Get the mid price
    #[must_use]
    pub fn mid_price(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Get the spread (best ask - best bid)
    #[must_use]
    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some(ask - bid),
            _ => None,
        }
    }

    /// Get all bid levels, sorted by price descending (best first)
    pub fn bids(&self) -> impl Iterator<Item = (Price, Quantity)> + '_ {
        self.bids.iter().rev().map(|(&p, &q)| (p, q))
    }

    /// Get all ask levels, sorted by price ascending (best first)
    pub fn asks(&self) -> impl Iterator<Item = (Price, Quantity)> + '_ {
        self.asks.iter().map(|(&p, &q)| (p, q))
    }

    /// Get the top N bid levels
    #[must_use]
    pub fn top_bids(&self, n: usize) -> Vec<(Price, Quantity)> {
        self.bids().take(n).collect()
    }

    /// Get the top N ask levels
    #[must_use]
    pub fn top_asks(&self, n: usize) -> Vec<(Price, Quantity)> {
        self.asks().take(n).collect()
    }

    /// Check if the order book is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Get the number of price levels as `(bids, asks)`
    #[must_use]
    pub fn num_levels(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }

    /// Copy the full book for readers
    #[must_use]
    pub fn snapshot(&self) -> BookSnapshot {
        self.top_snapshot(usize::MAX)
    }

    /// Copy the best `depth` levels of each side for readers
    #[must_use]
    pub fn top_snapshot(&self, depth: usize) -> BookSnapshot {
        BookSnapshot {
            symbol: self.symbol.clone(),
            last_update_id: self.last_update_id,
            bids: self.bids().take(depth).map(|(p, q)| PriceLevel::new(p, q)).collect(),
            asks: self.asks().take(depth).map(|(p, q)| PriceLevel::new(p, q)).collect(),
        }
    }
}

fn set_level(side: &mut BTreeMap<Price, Quantity>, level: &PriceLevel) {
    if level.is_removal() {
        side.remove(&level.price);
    } else {
        side.insert(level.price, level.quantity);
    }
}
