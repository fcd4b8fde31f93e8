//! Error types for the binance-depth crate.
//!
//! This module defines the errors that can occur while fetching snapshots,
//! streaming depth updates and keeping local books in sync.
//!
//! Most sync problems (sequence gaps, buffer overflows, transient fetch
//! failures) are recovered inside the engine by resynchronizing. Only
//! [`Error::SynchronizationFailed`] is surfaced to subscribers.

use std::time::Duration;

use thiserror::Error;

use crate::sync::ResyncReason;
use crate::types::UpdateId;

/// The main error type for this crate
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration or request parameters
    #[error("Configuration error: {0}")]
    Config(String),

    /// API returned an error response
    #[error("API error ({}): {}", .0.status, .0.message)]
    Api(ApiError),

    /// Rate limit exceeded (HTTP 429) or IP banned (HTTP 418)
    #[error("Rate limited{}", retry_suffix(.retry_after_ms))]
    RateLimited {
        /// Retry after this many milliseconds
        retry_after_ms: Option<u64>,
    },

    /// Stream server rejected a command
    #[error("Stream command rejected ({code}): {message}")]
    Stream {
        /// Binance error code
        code: i64,
        /// Error message
        message: String,
    },

    /// WebSocket connection closed unexpectedly
    #[error("WebSocket connection closed")]
    ConnectionClosed,

    /// Snapshot task ended without reporting a result (panicked or aborted)
    #[error("Snapshot fetch aborted")]
    FetchAborted,

    /// Event is older than the cache and was not applied
    #[error("Stale event: final update id {final_update_id} <= last update id {last_update_id}")]
    StaleEvent {
        /// Final update id of the rejected event
        final_update_id: UpdateId,
        /// Last update id of the cache
        last_update_id: UpdateId,
    },

    /// Event buffer reached its configured capacity
    #[error("Event buffer overflow (capacity {capacity})")]
    BufferOverflow {
        /// Configured buffer capacity
        capacity: usize,
    },

    /// Resync attempts exhausted; the subscription is closed
    #[error("Synchronization failed for {symbol} after {attempts} resync attempts: {reason}")]
    SynchronizationFailed {
        /// Symbol whose book could not be synchronized
        symbol: String,
        /// Number of resync attempts made
        attempts: u32,
        /// Cause of the last failed attempt
        reason: ResyncReason,
    },

    /// No active subscription for the symbol
    #[error("Not subscribed: {0}")]
    NotSubscribed(String),

    /// Symbol is already subscribed
    #[error("Already subscribed: {0}")]
    AlreadySubscribed(String),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,
}

fn retry_suffix(retry_after_ms: &Option<u64>) -> String {
    match retry_after_ms {
        Some(ms) => format!(", retry after {}ms", ms),
        None => String::new(),
    }
}

/// Error returned by the Binance API
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status code
    pub status: u16,
    /// Binance error code (e.g. `-1121` for an invalid symbol)
    pub code: Option<i64>,
    /// Error message
    pub message: String,
}

impl ApiError {
    /// Create a new API error
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
        }
    }

    /// Create an API error with an error code
    pub fn with_code(status: u16, code: i64, message: impl Into<String>) -> Self {
        Self {
            status,
            code: Some(code),
            message: message.into(),
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

impl Error {
    /// Whether retrying the same request later may succeed
    ///
    /// Network failures, timeouts, rate limits and server errors are
    /// transient. Client errors (an unknown symbol, a bad depth limit) and
    /// malformed responses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => !e.is_decode() && !e.is_builder(),
            Error::WebSocket(_) | Error::ConnectionClosed | Error::Timeout => true,
            Error::FetchAborted => true,
            Error::RateLimited { .. } => true,
            Error::Api(e) => e.is_server_error(),
            _ => false,
        }
    }

    /// Minimum wait the server asked for before the next request
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited {
                retry_after_ms: Some(ms),
            } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::http::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::http::Error) -> Self {
        Error::Config(format!("HTTP error building WebSocket request: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = Error::Api(ApiError::with_code(400, -1121, "Invalid symbol."));
        assert!(err.to_string().contains("400"));
        assert!(err.to_string().contains("Invalid symbol."));
    }

    #[test]
    fn test_rate_limited_display() {
        let err = Error::RateLimited {
            retry_after_ms: Some(1000),
        };
        assert!(err.to_string().contains("1000"));
        let err = Error::RateLimited {
            retry_after_ms: None,
        };
        assert_eq!(err.to_string(), "Rate limited");
    }

    #[test]
    fn test_stream_error_display() {
        let err = Error::Stream {
            code: 2,
            message: "Invalid request".into(),
        };
        assert_eq!(err.to_string(), "Stream command rejected (2): Invalid request");
        assert!(!err.is_transient());
    }

    #[test]
    fn test_retry_after() {
        let err = Error::RateLimited {
            retry_after_ms: Some(5000),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_millis(5000)));
        assert_eq!(Error::RateLimited { retry_after_ms: None }.retry_after(), None);
        assert_eq!(Error::Timeout.retry_after(), None);
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::Timeout.is_transient());
        assert!(Error::RateLimited {
            retry_after_ms: None
        }
        .is_transient());
        assert!(Error::Api(ApiError::new(503, "unavailable")).is_transient());
        assert!(!Error::Api(ApiError::with_code(400, -1121, "Invalid symbol.")).is_transient());
        assert!(!Error::Config("bad limit".into()).is_transient());
        assert!(Error::FetchAborted.is_transient());
    }

    #[test]
    fn test_synchronization_failed_display() {
        let err = Error::SynchronizationFailed {
            symbol: "BNBBTC".into(),
            attempts: 5,
            reason: ResyncReason::BufferOverflow { capacity: 3 },
        };
        let text = err.to_string();
        assert!(text.contains("BNBBTC"));
        assert!(text.contains("5"));
        assert!(text.contains("overflow"));
    }
}
