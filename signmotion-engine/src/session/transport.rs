//! Duplex transport seam for the session manager.

use crate::error::EngineError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close frame carried no status code.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// A frame received from the peer.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping,
    Pong,
    Close { code: u16, reason: String },
}

/// One open duplex connection.
#[async_trait]
pub trait Connection: Send {
    /// Next inbound frame. `None` once the connection is gone.
    async fn recv(&mut self) -> Option<Result<Frame, EngineError>>;
    async fn send_text(&mut self, text: String) -> Result<(), EngineError>;
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), EngineError>;
}

/// Opens connections to a stream address.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Box<dyn Connection>, EngineError>;
}

/// WebSocket connector over `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    max_message_bytes: usize,
}

impl TungsteniteConnector {
    pub fn new(max_message_bytes: usize) -> Self {
        Self { max_message_bytes }
    }
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new(10 * 1024 * 1024)
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn Connection>, EngineError> {
        let url = url::Url::parse(address)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(EngineError::Config(format!("Invalid stream protocol: {}", url.scheme())));
        }

        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_bytes);
        config.max_frame_size = Some(self.max_message_bytes);

        let (stream, response) = connect_async_with_config(url.as_str(), Some(config), false)
            .await
            .map_err(|e| EngineError::Network(format!("Failed to connect WebSocket: {}", e)))?;
        debug!("WebSocket handshake completed with status {}", response.status());

        Ok(Box::new(TungsteniteConnection { stream, failed: false }))
    }
}

struct TungsteniteConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    failed: bool,
}

#[async_trait]
impl Connection for TungsteniteConnection {
    async fn recv(&mut self) -> Option<Result<Frame, EngineError>> {
        if self.failed {
            return None;
        }
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => {
                    // The stream is unusable after a read error.
                    self.failed = true;
                    return Some(Err(EngineError::Stream(e.to_string())));
                }
            };
            if let Some(frame) = frame_from_message(message) {
                return Some(Ok(frame));
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), EngineError> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), EngineError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason.to_string()),
        };
        self.stream.close(Some(frame)).await?;
        Ok(())
    }
}

/// Map an inbound tungstenite message. Raw frames are never surfaced.
fn frame_from_message(message: Message) -> Option<Frame> {
    let frame = match message {
        Message::Text(text) => Frame::Text(text),
        Message::Binary(data) => Frame::Binary(data),
        Message::Ping(_) => Frame::Ping,
        Message::Pong(_) => Frame::Pong,
        Message::Close(Some(close)) => Frame::Close {
            code: u16::from(close.code),
            reason: close.reason.into_owned(),
        },
        Message::Close(None) => Frame::Close {
            code: CLOSE_NO_STATUS,
            reason: String::new(),
        },
        Message::Frame(_) => return None,
    };
    Some(frame)
}
