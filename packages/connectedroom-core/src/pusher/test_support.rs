//! Scripted transport used by stream and bootstrap tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::protocol::StreamError;
use super::transport::{Connector, Transport, TransportEvent};

type ServerTx = mpsc::UnboundedSender<Result<TransportEvent, StreamError>>;

struct ScriptedTransport {
    inbound: mpsc::UnboundedReceiver<Result<TransportEvent, StreamError>>,
    sent: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&mut self, text: String) -> Result<(), StreamError> {
        self.sent
            .send(text)
            .map_err(|_| StreamError::Transport("peer gone".into()))
    }

    async fn next_event(&mut self) -> Option<Result<TransportEvent, StreamError>> {
        self.inbound.recv().await
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}

/// Server side of one scripted connection.
pub struct ServerEnd {
    tx: ServerTx,
    sent: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    pub fn push_text(&self, text: &str) {
        self.tx.send(Ok(TransportEvent::Text(text.to_string()))).ok();
    }

    pub fn establish(&self, socket_id: &str) {
        let data = json!({ "socket_id": socket_id, "activity_timeout": 120 }).to_string();
        self.push_text(&json!({ "event": "pusher:connection_established", "data": data }).to_string());
    }

    pub fn close_with(&self, code: u16) {
        self.tx
            .send(Ok(TransportEvent::Closed {
                code: Some(code),
                reason: "bye".into(),
            }))
            .ok();
    }

    pub async fn next_sent(&mut self) -> Value {
        let text = self.sent.recv().await.unwrap();
        serde_json::from_str(&text).unwrap()
    }
}

/// Hands out pre-scripted transports in order; refuses once they run out.
#[derive(Default)]
pub struct ScriptedConnector {
    pending: Mutex<VecDeque<ScriptedTransport>>,
    connects: Mutex<Vec<Instant>>,
}

impl ScriptedConnector {
    pub fn expect_connection(&self) -> ServerEnd {
        let (tx, inbound) = mpsc::unbounded_channel();
        let (sent, sent_rx) = mpsc::unbounded_channel();
        self.pending.lock().push_back(ScriptedTransport { inbound, sent });
        ServerEnd { tx, sent: sent_rx }
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.connects.lock().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>, StreamError> {
        self.connects.lock().push(Instant::now());
        match self.pending.lock().pop_front() {
            Some(t) => Ok(Box::new(t)),
            None => Err(StreamError::Transport("connection refused".into())),
        }
    }
}
