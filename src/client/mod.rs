//! API clients for communicating with Binance.
//!
//! This module contains:
//!
//! - [`rest`] - HTTP client for the depth snapshot endpoint
//! - [`websocket`] - WebSocket client for the diff depth stream

pub mod rest;
pub mod websocket;

pub use rest::RestClient;
pub use websocket::WebSocketClient;
