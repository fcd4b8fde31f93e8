//! WebSocket client for the Binance diff depth stream.
//!
//! This module provides the [`WebSocketClient`] for streaming
//! `<symbol>@depth` updates. Streams are added and removed on a live
//! connection with `SUBSCRIBE`/`UNSUBSCRIBE` commands, each acknowledged by
//! a `{"result": null, "id": n}` reply.
//!
//! # Example
//!
//! ```rust,no_run
//! use binance_depth::client::WebSocketClient;
//! use binance_depth::Config;
//!
//! # async fn example() -> binance_depth::Result<()> {
//! let mut ws = WebSocketClient::connect(&Config::new()).await?;
//! ws.subscribe_depth(&["BNBBTC", "ETHBTC"]).await?;
//!
//! while let Some(msg) = ws.next().await {
//!     if let Some(update) = msg?.into_depth_update() {
//!         println!("{} [{}, {}]", update.symbol, update.first_update_id, update.final_update_id);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::config::{Config, DepthSpeed};
use crate::error::Error;
use crate::types::messages::{ErrorMsg, WsCommand, WsMethod};
use crate::types::WsMessage;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Command awaiting its reply
#[derive(Debug, Clone)]
struct PendingCommand {
    method: WsMethod,
    streams: Vec<String>,
}

/// WebSocket client for the diff depth stream
///
/// Tracks which streams the server has confirmed by correlating command
/// replies with their request ids.
///
/// # Thread Safety
///
/// This client is NOT thread-safe. For concurrent access from multiple tasks,
/// use channels or wrap in a mutex.
#[derive(Debug)]
pub struct WebSocketClient {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    message_id: u64,
    depth_speed: DepthSpeed,
    /// Streams confirmed by the server
    streams: FxHashSet<String>,
    /// Commands awaiting a reply, by request id
    pending: FxHashMap<u64, PendingCommand>,
}

impl WebSocketClient {
    /// Connect to the Binance stream endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or TLS handshake fails.
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(config.websocket_url()).await?;
        let (write, read) = ws_stream.split();
        debug!(url = config.websocket_url(), "connected to depth stream");

        Ok(Self {
            write,
            read,
            message_id: 1,
            depth_speed: config.depth_speed(),
            streams: FxHashSet::default(),
            pending: FxHashMap::default(),
        })
    }

    /// Send a command to the WebSocket server
    async fn send_command(&mut self, method: WsMethod, params: Vec<String>) -> Result<u64, Error> {
        let id = self.message_id;
        let cmd = WsCommand {
            method,
            params: params.clone(),
            id,
        };
        let json = serde_json::to_string(&cmd)?;
        self.write.send(Message::Text(json)).await?;

        self.pending.insert(
            id,
            PendingCommand {
                method,
                streams: params,
            },
        );
        self.message_id += 1;
        Ok(id)
    }

    /// Get the next message ID without incrementing
    pub fn next_message_id(&self) -> u64 {
        self.message_id
    }

    /// Streams confirmed by the server
    pub fn streams(&self) -> impl Iterator<Item = &str> {
        self.streams.iter().map(String::as_str)
    }

    /// Whether the depth stream for `symbol` is confirmed
    pub fn is_subscribed(&self, symbol: &str) -> bool {
        self.streams.contains(&self.depth_speed.stream_name(symbol))
    }

    /// Subscribe to the diff depth stream for the given symbols
    ///
    /// # Returns
    ///
    /// The message ID of the request (use to correlate with the reply)
    pub async fn subscribe_depth(&mut self, symbols: &[&str]) -> Result<u64, Error> {
        let streams = self.stream_names(symbols);
        self.send_command(WsMethod::Subscribe, streams).await
    }

    /// Unsubscribe from the diff depth stream for the given symbols
    pub async fn unsubscribe_depth(&mut self, symbols: &[&str]) -> Result<u64, Error> {
        let streams = self.stream_names(symbols);
        self.send_command(WsMethod::Unsubscribe, streams).await
    }

    /// Ask the server for its active subscriptions
    pub async fn list_subscriptions(&mut self) -> Result<u64, Error> {
        self.send_command(WsMethod::ListSubscriptions, Vec::new()).await
    }

    fn stream_names(&self, symbols: &[&str]) -> Vec<String> {
        symbols
            .iter()
            .map(|s| self.depth_speed.stream_name(s))
            .collect()
    }

    /// Receive the next message from the WebSocket
    ///
    /// Pings are answered automatically. Command replies update the set of
    /// confirmed streams before being returned; an error reply is returned
    /// as [`Error::Stream`].
    ///
    /// # Returns
    ///
    /// The next message, or `None` if the connection is closed.
    pub async fn next(&mut self) -> Option<Result<WsMessage, Error>> {
        loop {
            match self.read.next().await? {
                Ok(Message::Text(text)) => {
                    let msg = match serde_json::from_str::<WsMessage>(&text) {
                        Ok(msg) => msg,
                        Err(e) => return Some(Err(Error::from(e))),
                    };
                    if let Err(e) = self.handle_reply(&msg) {
                        return Some(Err(e));
                    }
                    return Some(Ok(msg));
                }
                Ok(Message::Ping(data)) => {
                    if let Err(e) = self.write.send(Message::Pong(data)).await {
                        return Some(Err(e.into()));
                    }
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "depth stream closed by server");
                    return Some(Err(Error::ConnectionClosed));
                }
                Ok(_) => {
                    // Binary, Pong, Frame
                    continue;
                }
                Err(e) => {
                    return Some(Err(e.into()));
                }
            }
        }
    }

    /// Track command replies
    fn handle_reply(&mut self, msg: &WsMessage) -> Result<(), Error> {
        match msg {
            WsMessage::CommandResult(reply) => {
                let Some(command) = self.pending.remove(&reply.id) else {
                    return Ok(());
                };
                match command.method {
                    WsMethod::Subscribe => self.streams.extend(command.streams),
                    WsMethod::Unsubscribe => {
                        for stream in &command.streams {
                            self.streams.remove(stream);
                        }
                    }
                    WsMethod::ListSubscriptions => {
                        if let Some(listed) = reply.result.as_ref().and_then(|r| r.as_array()) {
                            self.streams = listed
                                .iter()
                                .filter_map(|s| s.as_str().map(str::to_string))
                                .collect();
                        }
                    }
                }
                Ok(())
            }
            WsMessage::Error(err) => {
                if let Some(id) = err.id {
                    self.pending.remove(&id);
                }
                warn!(code = err.code, msg = %err.msg, id = ?err.id, "stream command rejected");
                Err(command_error(err))
            }
            _ => Ok(()),
        }
    }

    /// Close the WebSocket connection
    pub async fn close(&mut self) -> Result<(), Error> {
        self.write.close().await?;
        Ok(())
    }
}

fn command_error(err: &ErrorMsg) -> Error {
    Error::Stream {
        code: err.code,
        message: err.msg.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_keeps_stream_code() {
        let msg: WsMessage =
            serde_json::from_str(r#"{"code": 2, "msg": "Invalid request", "id": 4}"#).unwrap();
        let WsMessage::Error(err) = msg else {
            panic!("expected error reply, got {:?}", msg);
        };

        match command_error(&err) {
            Error::Stream { code, message } => {
                assert_eq!(code, 2);
                assert_eq!(message, "Invalid request");
            }
            other => panic!("expected stream error, got {:?}", other),
        }
    }

    #[test]
    fn test_subscribe_command_format() {
        let cmd = WsCommand {
            method: WsMethod::Subscribe,
            params: vec![DepthSpeed::Ms100.stream_name("BNBBTC")],
            id: 1,
        };
        assert_eq!(
            serde_json::to_string(&cmd).unwrap(),
            r#"{"method":"SUBSCRIBE","params":["bnbbtc@depth@100ms"],"id":1}"#
        );
    }

    #[test]
    fn test_list_subscriptions_command_format() {
        let cmd = WsCommand {
            method: WsMethod::ListSubscriptions,
            params: Vec::new(),
            id: 9,
        };
        assert_eq!(
            serde_json::to_string(&cmd).unwrap(),
            r#"{"method":"LIST_SUBSCRIPTIONS","params":[],"id":9}"#
        );
    }
}
