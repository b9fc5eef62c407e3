// ABOUTME: Duplex text+binary frame channel, abstracted so the protocol engine is testable
// ABOUTME: WsTransport is the production implementation, wrapping tokio-tungstenite

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream};

use crate::error::{Error, Result};

/// One frame received from the far end of a `Transport`.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Text(String),
    Binary(Vec<u8>),
    /// The connection ended, gracefully or otherwise.
    Closed,
}

/// Abstracts the duplex text+binary channel the protocol engine speaks over,
/// so the engine's state machine is unit-testable without a live socket.
#[async_trait]
pub trait Transport: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    async fn send_binary(&mut self, data: Vec<u8>) -> Result<()>;

    /// Await the next event. Returns `None` once the underlying channel is
    /// exhausted (distinct from a graceful `TransportEvent::Closed`).
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// Production transport: a `tokio-tungstenite` WebSocket.
pub struct WsTransport {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTransport {
    pub async fn connect(url: &str) -> Result<Self> {
        let (socket, _response) = connect_async(url)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.socket
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }

    async fn send_binary(&mut self, data: Vec<u8>) -> Result<()> {
        self.socket
            .send(WsMessage::Binary(data))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        loop {
            match self.socket.next().await? {
                Ok(WsMessage::Text(text)) => return Some(TransportEvent::Text(text)),
                Ok(WsMessage::Binary(data)) => return Some(TransportEvent::Binary(data)),
                Ok(WsMessage::Close(_)) => return Some(TransportEvent::Closed),
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => continue,
                Ok(_) => continue,
                Err(e) => {
                    log::warn!("websocket read error: {e}");
                    return Some(TransportEvent::Closed);
                }
            }
        }
    }
}
