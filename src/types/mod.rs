//! Order book types and Binance wire formats.
//!
//! - [`depth`] - Decoded price levels, diff events and snapshots
//! - [`messages`] - WebSocket and REST message bodies

pub mod depth;
pub mod messages;

pub use depth::{DiffEvent, PriceLevel, Snapshot};
pub use messages::WsMessage;

/// Price of a level
///
/// Binance sends prices as decimal strings. `Decimal` keeps them exact so
/// that `"4.00000000"` and `"4.0"` are the same map key, which is not
/// guaranteed with floating point.
pub type Price = rust_decimal::Decimal;

/// Quantity resting at a price level
pub type Quantity = rust_decimal::Decimal;

/// Exchange sequence number of a depth update
pub type UpdateId = u64;

/// Timestamp in milliseconds since Unix epoch
pub type TimestampMs = u64;
