//! Read-only copies of an order book handed out to callers.

use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::{Price, PriceLevel, Quantity, UpdateId};

/// Point-in-time copy of an [`OrderBookCache`](super::OrderBookCache).
///
/// Later updates to the live cache never show up in a `BookSnapshot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookSnapshot {
    /// Exchange symbol
    pub symbol: String,
    /// Final update id of the last event applied before the copy
    pub last_update_id: UpdateId,
    /// Bid levels, best (highest) first
    pub bids: Vec<PriceLevel>,
    /// Ask levels, best (lowest) first
    pub asks: Vec<PriceLevel>,
}

impl BookSnapshot {
    /// Best bid as `(price, quantity)`
    #[must_use]
    pub fn best_bid(&self) -> Option<(Price, Quantity)> {
        self.bids.first().map(|l| (l.price, l.quantity))
    }

    /// Best ask as `(price, quantity)`
    #[must_use]
    pub fn best_ask(&self) -> Option<(Price, Quantity)> {
        self.asks.first().map(|l| (l.price, l.quantity))
    }

    /// Average of best bid and best ask
    #[must_use]
    pub fn mid_price(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Best ask minus best bid
    #[must_use]
    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some(ask - bid),
            _ => None,
        }
    }

    /// Check if the book is crossed (best bid >= best ask)
    ///
    /// This shouldn't happen in a healthy book but is useful for validation.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => bid >= ask,
            _ => false,
        }
    }

    /// Total quantity on the bid side
    #[must_use]
    pub fn total_bid_quantity(&self) -> Quantity {
        self.bids.iter().map(|l| l.quantity).sum()
    }

    /// Total quantity on the ask side
    #[must_use]
    pub fn total_ask_quantity(&self) -> Quantity {
        self.asks.iter().map(|l| l.quantity).sum()
    }

    /// Keep only the best `depth` levels per side
    #[must_use]
    pub fn truncated(mut self, depth: usize) -> Self {
        self.bids.truncate(depth);
        self.asks.truncate(depth);
        self
    }
}

/// Depth table: asks from worst to best above the spread, then bids from
/// best to worst.
impl fmt::Display for BookSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} @ {}", self.symbol, self.last_update_id)?;
        writeln!(f, "{:>6} {:>20} {:>20}", "side", "price", "quantity")?;
        for level in self.asks.iter().rev() {
            writeln!(f, "{:>6} {:>20} {:>20}", "ask", level.price, level.quantity)?;
        }
        match self.spread() {
            Some(spread) => writeln!(f, "{:>6} {:>20}", "spread", spread)?,
            None => writeln!(f, "{:>6} {:>20}", "spread", "-")?,
        }
        for level in &self.bids {
            writeln!(f, "{:>6} {:>20} {:>20}", "bid", level.price, level.quantity)?;
        }
        Ok(())
    }
}
