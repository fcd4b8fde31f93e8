//! Order book depth types shared by the cache and the sync engine.
//!
//! These are the decoded, exchange-independent forms of the depth stream and
//! the depth snapshot. Wire formats live in [`super::messages`].

use serde::{Deserialize, Serialize};

use super::{Price, Quantity, UpdateId};

/// A single price level change or snapshot level.
///
/// A quantity of zero means "remove this price level".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Level price
    pub price: Price,
    /// Total quantity resting at the price
    pub quantity: Quantity,
}

impl PriceLevel {
    /// Create a new price level
    #[must_use]
    pub const fn new(price: Price, quantity: Quantity) -> Self {
        Self { price, quantity }
    }

    /// Whether this level removes the price from the book
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.quantity.is_zero()
    }
}

impl From<[Price; 2]> for PriceLevel {
    fn from([price, quantity]: [Price; 2]) -> Self {
        Self { price, quantity }
    }
}

/// An incremental depth update covering the update ids `[first_update_id, final_update_id]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEvent {
    /// Exchange symbol, upper case (e.g. `BNBBTC`)
    pub symbol: String,
    /// First update id in the event (`U`)
    pub first_update_id: UpdateId,
    /// Final update id in the event (`u`)
    pub final_update_id: UpdateId,
    /// Bid levels to insert, update or remove
    pub bid_changes: Vec<PriceLevel>,
    /// Ask levels to insert, update or remove
    pub ask_changes: Vec<PriceLevel>,
}

impl DiffEvent {
    /// Create an event with no level changes
    pub fn new(symbol: impl Into<String>, first_update_id: UpdateId, final_update_id: UpdateId) -> Self {
        Self {
            symbol: symbol.into(),
            first_update_id,
            final_update_id,
            bid_changes: Vec::new(),
            ask_changes: Vec::new(),
        }
    }

    /// Add a bid change
    #[must_use]
    pub fn with_bid(mut self, price: Price, quantity: Quantity) -> Self {
        self.bid_changes.push(PriceLevel::new(price, quantity));
        self
    }

    /// Add an ask change
    #[must_use]
    pub fn with_ask(mut self, price: Price, quantity: Quantity) -> Self {
        self.ask_changes.push(PriceLevel::new(price, quantity));
        self
    }

    /// Whether the event range contains `update_id`
    #[must_use]
    pub fn covers(&self, update_id: UpdateId) -> bool {
        self.first_update_id <= update_id && update_id <= self.final_update_id
    }
}

/// A full order book returned by the depth snapshot endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Exchange symbol, upper case
    pub symbol: String,
    /// Update id the snapshot is consistent with
    pub last_update_id: UpdateId,
    /// Bid levels, best first
    pub bids: Vec<PriceLevel>,
    /// Ask levels, best first
    pub asks: Vec<PriceLevel>,
}

impl Snapshot {
    /// Create an empty snapshot at the given update id
    pub fn new(symbol: impl Into<String>, last_update_id: UpdateId) -> Self {
        Self {
            symbol: symbol.into(),
            last_update_id,
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    /// Add a bid level
    #[must_use]
    pub fn with_bid(mut self, price: Price, quantity: Quantity) -> Self {
        self.bids.push(PriceLevel::new(price, quantity));
        self
    }

    /// Add an ask level
    #[must_use]
    pub fn with_ask(mut self, price: Price, quantity: Quantity) -> Self {
        self.asks.push(PriceLevel::new(price, quantity));
        self
    }
}
