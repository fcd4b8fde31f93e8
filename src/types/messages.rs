//! Wire formats for the Binance depth stream and depth snapshot endpoint.
//!
//! This module contains the commands sent over the WebSocket, the messages
//! received from it, and the REST snapshot body.

use serde::{Deserialize, Serialize};

use super::depth::{DiffEvent, PriceLevel, Snapshot};
use super::{Price, TimestampMs, UpdateId};

/// WebSocket command sent to the server
#[derive(Debug, Clone, Serialize)]
pub struct WsCommand {
    /// Command method
    pub method: WsMethod,
    /// Stream names (e.g. `bnbbtc@depth@100ms`)
    pub params: Vec<String>,
    /// Request id, echoed back in the result message
    pub id: u64,
}

/// Stream command methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WsMethod {
    /// Subscribe to streams
    Subscribe,
    /// Unsubscribe from streams
    Unsubscribe,
    /// List active stream subscriptions
    ListSubscriptions,
}

/// WebSocket message received from the server
///
/// Binance messages carry no common tag, so variants are tried in order.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WsMessage {
    /// Event wrapped in a combined-stream envelope
    Combined(CombinedStreamMsg),
    /// Diff depth event on a raw stream
    DepthUpdate(DepthUpdateMsg),
    /// Error reply to a command
    Error(ErrorMsg),
    /// Reply to a command
    CommandResult(CommandResultMsg),
    /// Any other stream payload
    Other(serde_json::Value),
}

impl WsMessage {
    /// Extract the depth update carried by this message, if any
    pub fn into_depth_update(self) -> Option<DepthUpdateMsg> {
        match self {
            WsMessage::Combined(combined) => Some(combined.data),
            WsMessage::DepthUpdate(update) => Some(update),
            _ => None,
        }
    }
}

/// Combined stream envelope: `{"stream": "...", "data": {...}}`
#[derive(Debug, Clone, Deserialize)]
pub struct CombinedStreamMsg {
    /// Stream name the payload came from
    pub stream: String,
    /// Depth update payload
    pub data: DepthUpdateMsg,
}

/// Diff depth event (`<symbol>@depth` / `<symbol>@depth@100ms`)
#[derive(Debug, Clone, Deserialize)]
pub struct DepthUpdateMsg {
    /// Event type, always `depthUpdate`
    #[serde(rename = "e")]
    pub event_type: String,
    /// Event time
    #[serde(rename = "E")]
    pub event_time: TimestampMs,
    /// Symbol
    #[serde(rename = "s")]
    pub symbol: String,
    /// First update id in event
    #[serde(rename = "U")]
    pub first_update_id: UpdateId,
    /// Final update id in event
    #[serde(rename = "u")]
    pub final_update_id: UpdateId,
    /// Bids to be updated: [[price, quantity], ...]
    #[serde(rename = "b")]
    pub bids: Vec<[Price; 2]>,
    /// Asks to be updated: [[price, quantity], ...]
    #[serde(rename = "a")]
    pub asks: Vec<[Price; 2]>,
}

impl From<DepthUpdateMsg> for DiffEvent {
    fn from(msg: DepthUpdateMsg) -> Self {
        Self {
            symbol: msg.symbol.to_ascii_uppercase(),
            first_update_id: msg.first_update_id,
            final_update_id: msg.final_update_id,
            bid_changes: msg.bids.into_iter().map(PriceLevel::from).collect(),
            ask_changes: msg.asks.into_iter().map(PriceLevel::from).collect(),
        }
    }
}

/// Reply to a command: `{"result": null, "id": 1}`
#[derive(Debug, Clone, Deserialize)]
pub struct CommandResultMsg {
    /// Result payload (`null` for subscribe/unsubscribe)
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Request id
    pub id: u64,
}

/// Error reply: `{"code": 2, "msg": "Invalid request", "id": 1}`
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorMsg {
    /// Error code
    pub code: i64,
    /// Error message
    pub msg: String,
    /// Request id, if the error relates to a command
    #[serde(default)]
    pub id: Option<u64>,
}

/// Body of `GET /api/v3/depth`
#[derive(Debug, Clone, Deserialize)]
pub struct DepthSnapshotResponse {
    /// Update id the snapshot is consistent with
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: UpdateId,
    /// Bids: [[price, quantity], ...]
    pub bids: Vec<[Price; 2]>,
    /// Asks: [[price, quantity], ...]
    pub asks: Vec<[Price; 2]>,
}

impl DepthSnapshotResponse {
    /// Convert into a [`Snapshot`] for `symbol`
    pub fn into_snapshot(self, symbol: &str) -> Snapshot {
        Snapshot {
            symbol: symbol.to_ascii_uppercase(),
            last_update_id: self.last_update_id,
            bids: self.bids.into_iter().map(PriceLevel::from).collect(),
            asks: self.asks.into_iter().map(PriceLevel::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_depth_update() {
        let json = r#"{"e":"depthUpdate","E":123456789,"s":"BNBBTC","U":157,"u":160,
            "b":[["0.0024","10"]],"a":[["0.0026","100"],["0.0027","0.00000000"]]}"#;
        let msg: WsMessage = serde_json::from_str(json).unwrap();
        let update = msg.into_depth_update().unwrap();
        assert_eq!(update.first_update_id, 157);
        assert_eq!(update.final_update_id, 160);

        let event = DiffEvent::from(update);
        assert_eq!(event.symbol, "BNBBTC");
        assert_eq!(event.bid_changes, vec![PriceLevel::new(dec("0.0024"), dec("10"))]);
        assert_eq!(event.ask_changes.len(), 2);
        assert!(event.ask_changes[1].is_removal());
    }

    #[test]
    fn test_parse_combined_stream() {
        let json = r#"{"stream":"bnbbtc@depth@100ms","data":{"e":"depthUpdate","E":1,
            "s":"BNBBTC","U":1,"u":2,"b":[],"a":[]}}"#;
        let msg: WsMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, WsMessage::Combined(ref c) if c.stream == "bnbbtc@depth@100ms"));
        assert_eq!(msg.into_depth_update().unwrap().final_update_id, 2);
    }

    #[test]
    fn test_parse_command_replies() {
        let msg: WsMessage = serde_json::from_str(r#"{"result":null,"id":3}"#).unwrap();
        assert!(matches!(msg, WsMessage::CommandResult(CommandResultMsg { id: 3, .. })));

        let msg: WsMessage =
            serde_json::from_str(r#"{"code":2,"msg":"Invalid request","id":4}"#).unwrap();
        assert!(matches!(msg, WsMessage::Error(ErrorMsg { code: 2, .. })));
    }

    #[test]
    fn test_other_stream_payload() {
        let msg: WsMessage =
            serde_json::from_str(r#"{"e":"trade","E":1,"s":"BNBBTC","p":"0.001"}"#).unwrap();
        assert!(matches!(msg, WsMessage::Other(_)));
        assert!(msg.into_depth_update().is_none());
    }

    #[test]
    fn test_serialize_command() {
        let cmd = WsCommand {
            method: WsMethod::Subscribe,
            params: vec!["bnbbtc@depth@100ms".to_string()],
            id: 1,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(
            json,
            r#"{"method":"SUBSCRIBE","params":["bnbbtc@depth@100ms"],"id":1}"#
        );
    }

    #[test]
    fn test_parse_snapshot() {
        let json = r#"{"lastUpdateId":1027024,"bids":[["4.00000000","431.00000000"]],
            "asks":[["4.00000200","12.00000000"]]}"#;
        let response: DepthSnapshotResponse = serde_json::from_str(json).unwrap();
        let snapshot = response.into_snapshot("bnbbtc");
        assert_eq!(snapshot.symbol, "BNBBTC");
        assert_eq!(snapshot.last_update_id, 1027024);
        assert_eq!(snapshot.bids[0], PriceLevel::new(dec("4"), dec("431")));
        assert_eq!(snapshot.asks[0].price, dec("4.000002"));
    }
}
