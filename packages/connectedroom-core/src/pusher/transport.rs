//! WebSocket transport abstraction.
//!
//! [`Connector`] opens a [`Transport`]; the connection state machine only
//! sees text frames and close notifications. [`WsConnector`] is the
//! `tokio-tungstenite` implementation.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::protocol::StreamError;

/// Something the transport delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Text(String),
    Closed { code: Option<u16>, reason: String },
}

/// An open, bidirectional text transport.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, text: String) -> Result<(), StreamError>;

    /// Next inbound event. `None` once the stream is exhausted.
    ///
    /// Must be cancel-safe: it is polled inside `tokio::select!`.
    async fn next_event(&mut self) -> Option<Result<TransportEvent, StreamError>>;

    /// Closes the transport; errors are ignored.
    async fn close(&mut self);
}

/// Opens transports to a URL.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, StreamError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// `tokio-tungstenite` connector.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, StreamError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| StreamError::Transport(format!("WebSocket connect: {e}")))?;
        Ok(Box::new(WsTransport { stream }))
    }
}

struct WsTransport {
    stream: WsStream,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<(), StreamError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))
    }

    async fn next_event(&mut self) -> Option<Result<TransportEvent, StreamError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(StreamError::Transport(e.to_string()))),
            };

            match message {
                Message::Text(text) => return Some(Ok(TransportEvent::Text(text.to_string()))),
                Message::Close(frame) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.to_string()),
                        None => (None, String::new()),
                    };
                    return Some(Ok(TransportEvent::Closed { code, reason }));
                }
                // Control frames are answered by tungstenite; Pusher sends no binary.
                Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            log::debug!("[Stream] Close failed: {}", e);
        }
    }
}
