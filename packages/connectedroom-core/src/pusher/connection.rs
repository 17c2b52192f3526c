//! Long-lived Pusher connection with reconnect and backoff.
//!
//! A [`StreamConnection`] owns at most one listen task. The task connects,
//! subscribes to the session's private channels, forwards channel events to
//! the caller's queue and, when the session ends for any reason other than a
//! local stop, sleeps according to the reconnect policy and starts over.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::backoff::reconnect_delay;
use super::protocol::{ConnectionEstablished, PusherErrorData, PusherFrame, StreamError};
use super::transport::{Connector, Transport, TransportEvent};
use crate::auth::IntegrationApi;
use crate::protocol_constants::{
    EVENT_CONNECTION_ESTABLISHED, EVENT_ERROR, EVENT_PING, EVENT_PONG,
    EVENT_SUBSCRIPTION_ERROR, EVENT_SUBSCRIPTION_SUCCEEDED, PONG_TIMEOUT_SECS,
    DEFAULT_ACTIVITY_TIMEOUT_SECS,
};
use crate::state::ReconnectConfig;

/// Lifecycle of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// A channel event received from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub channel: String,
    pub event: String,
    /// Raw `data` field (usually a JSON-encoded string).
    pub data: Value,
}

/// Everything one listen task needs for its whole life.
pub struct Subscription {
    /// Private channels to subscribe after each (re)connect.
    pub channels: Vec<String>,
    /// Signs channel subscriptions.
    pub authorizer: Arc<dyn IntegrationApi>,
}

struct Shared {
    state: RwLock<ConnectionState>,
    attempts: AtomicU32,
    do_not_reconnect: AtomicBool,
    cancel: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    fn stopped(&self) -> bool {
        self.do_not_reconnect.load(Ordering::SeqCst)
    }
}

/// Pusher connection with reconnect/backoff.
///
/// `stop` always wins: the stop flag is re-checked after every backoff sleep
/// and right after a transport opens, and the cancellation token interrupts
/// both the sleep and a live session.
pub struct StreamConnection {
    url: String,
    reconnect: ReconnectConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
}

impl StreamConnection {
    pub fn new(url: impl Into<String>, reconnect: ReconnectConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            url: url.into(),
            reconnect,
            connector,
            shared: Arc::new(Shared {
                state: RwLock::new(ConnectionState::Disconnected),
                attempts: AtomicU32::new(0),
                do_not_reconnect: AtomicBool::new(false),
                cancel: Mutex::new(CancellationToken::new()),
                task: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    /// Failed attempts since the last established connection.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.stopped()
    }

    /// Starts the listen task.
    ///
    /// No-op if the connection was stopped or a listen task is still alive.
    /// Channel events are converted into `M` and sent to `sink`.
    pub fn connect<M>(&self, subscription: Subscription, sink: mpsc::Sender<M>)
    where
        M: From<InboundMessage> + Send + 'static,
    {
        let mut task = self.shared.task.lock();
        if self.shared.stopped() {
            log::debug!("[Stream] connect ignored: connection stopped");
            return;
        }
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            log::debug!("[Stream] connect ignored: listen task already running");
            return;
        }

        let listener = Listener {
            url: self.url.clone(),
            reconnect: self.reconnect,
            connector: Arc::clone(&self.connector),
            shared: Arc::clone(&self.shared),
            cancel: self.shared.cancel.lock().clone(),
            subscription,
            sink,
        };
        *task = Some(tokio::spawn(listener.run()));
    }

    /// Stops the connection for good and waits for the listen task to exit.
    ///
    /// Cancels a pending reconnect sleep and closes the live transport.
    pub async fn stop(&self) {
        log::info!("[Stream] Stopping");
        self.shared.do_not_reconnect.store(true, Ordering::SeqCst);
        self.shared.cancel.lock().cancel();

        let handle = self.shared.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    log::error!("[Stream] Listen task panicked: {}", e);
                }
            }
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Clears a previous [`stop`](Self::stop) so `connect` works again.
    pub fn reset_stop(&self) {
        let _task = self.shared.task.lock();
        *self.shared.cancel.lock() = CancellationToken::new();
        self.shared.attempts.store(0, Ordering::SeqCst);
        self.shared.do_not_reconnect.store(false, Ordering::SeqCst);
    }
}

struct Listener<M> {
    url: String,
    reconnect: ReconnectConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    subscription: Subscription,
    sink: mpsc::Sender<M>,
}

impl<M> Listener<M>
where
    M: From<InboundMessage> + Send + 'static,
{
    async fn run(self) {
        loop {
            if self.shared.stopped() {
                break;
            }

            self.shared.set_state(ConnectionState::Connecting);
            log::info!("[Stream] Connecting to {}", self.url);

            let opened = tokio::select! {
                _ = self.cancel.cancelled() => break,
                r = self.connector.connect(&self.url) => r,
            };

            let error = match opened {
                Ok(mut transport) => {
                    if self.shared.stopped() {
                        transport.close().await;
                        break;
                    }
                    self.run_session(transport).await
                }
                Err(e) => e,
            };

            self.shared.set_state(ConnectionState::Disconnected);
            if error == StreamError::Stopped || self.shared.stopped() {
                break;
            }

            let attempt = self.shared.attempts.fetch_add(1, Ordering::SeqCst);
            let delay = reconnect_delay(&self.reconnect, error.reconnect_policy(), attempt);
            log::warn!(
                "[Stream] {} - reconnecting in {}ms (attempt {})",
                error,
                delay.as_millis(),
                attempt + 1
            );

            self.shared.set_state(ConnectionState::Reconnecting);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.shared.set_state(ConnectionState::Disconnected);
        log::info!("[Stream] Listen task exited");
    }

    /// Drives one open transport until it fails or the connection is stopped.
    async fn run_session(&self, mut transport: Box<dyn Transport>) -> StreamError {
        let mut activity = Duration::from_secs(DEFAULT_ACTIVITY_TIMEOUT_SECS);
        let mut deadline = Instant::now() + activity;
        let mut awaiting_pong = false;

        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => {
                    transport.close().await;
                    return StreamError::Stopped;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    if awaiting_pong {
                        transport.close().await;
                        return StreamError::Transport("pong not received".to_string());
                    }
                    log::debug!("[Stream] No activity for {}s, sending ping", activity.as_secs());
                    if let Err(e) = transport.send(PusherFrame::ping()).await {
                        return e;
                    }
                    awaiting_pong = true;
                    deadline = Instant::now() + Duration::from_secs(PONG_TIMEOUT_SECS);
                    continue;
                }
                event = transport.next_event() => event,
            };

            awaiting_pong = false;
            deadline = Instant::now() + activity;

            let text = match event {
                None => {
                    return StreamError::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    }
                }
                Some(Err(e)) => return e,
                Some(Ok(TransportEvent::Closed { code, reason })) => {
                    return StreamError::Closed { code, reason };
                }
                Some(Ok(TransportEvent::Text(text))) => text,
            };

            let frame = match PusherFrame::parse(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("[Stream] Ignoring frame: {}", e);
                    continue;
                }
            };

            match frame.event.as_str() {
                EVENT_CONNECTION_ESTABLISHED => {
                    let established: ConnectionEstablished = match frame.data_as() {
                        Ok(e) => e,
                        Err(e) => {
                            transport.close().await;
                            return e;
                        }
                    };
                    self.shared.attempts.store(0, Ordering::SeqCst);
                    self.shared.set_state(ConnectionState::Connected);
                    activity = Duration::from_secs(established.activity_timeout_secs());
                    deadline = Instant::now() + activity;
                    log::info!(
                        "[Stream] Connected (socket_id={}, activity_timeout={}s)",
                        established.socket_id,
                        activity.as_secs()
                    );

                    if let Err(e) = self.subscribe_all(transport.as_mut(), &established.socket_id).await {
                        return e;
                    }
                }
                EVENT_ERROR => {
                    let error: PusherErrorData = frame.data_as().unwrap_or_default();
                    let message = error.message.unwrap_or_default();
                    match error.code {
                        Some(code) if (4000..5000).contains(&code) => {
                            transport.close().await;
                            return StreamError::Closed {
                                code: Some(code),
                                reason: message,
                            };
                        }
                        code => log::warn!("[Stream] Server error {:?}: {}", code, message),
                    }
                }
                EVENT_PING => {
                    if let Err(e) = transport.send(PusherFrame::pong()).await {
                        return e;
                    }
                }
                EVENT_PONG => {}
                EVENT_SUBSCRIPTION_SUCCEEDED => {
                    log::info!(
                        "[Stream] Subscribed to {}",
                        frame.channel.as_deref().unwrap_or("?")
                    );
                }
                EVENT_SUBSCRIPTION_ERROR => {
                    log::error!(
                        "[Stream] Subscription to {} failed: {}",
                        frame.channel.as_deref().unwrap_or("?"),
                        frame.data_json()
                    );
                }
                _ => {
                    let Some(channel) = frame.channel else {
                        log::debug!("[Stream] Ignoring unbound event {}", frame.event);
                        continue;
                    };
                    let message = InboundMessage {
                        channel,
                        event: frame.event,
                        data: frame.data,
                    };
                    if self.sink.send(M::from(message)).await.is_err() {
                        log::info!("[Stream] Consumer gone, closing");
                        transport.close().await;
                        return StreamError::Stopped;
                    }
                }
            }
        }
    }

    async fn subscribe_all(&self, transport: &mut dyn Transport, socket_id: &str) -> Result<(), StreamError> {
        for channel in &self.subscription.channels {
            match self.subscription.authorizer.authorize_channel(socket_id, channel).await {
                Ok(auth) => transport.send(PusherFrame::subscribe(channel, &auth)).await?,
                Err(e) => log::error!("[Stream] {}", e),
            }
        }
        Ok(())
    }
}
