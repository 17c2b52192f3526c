//! Composition root for one ConnectedRoom config entry.
//!
//! [`ConnectedRoom`] is the single place where the auth client, the stream
//! connection and the per-entry services are instantiated and wired
//! together. The embedding application supplies the [`Host`] and calls
//! [`ConnectedRoom::connect`] once it has an API key.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthClient, IntegrationApi, Session};
use crate::error::{ConnectedRoomError, ConnectedRoomResult};
use crate::host::Host;
use crate::protocol_constants::{COORDINATOR_QUEUE_CAPACITY, HTTP_TIMEOUT_SECS};
use crate::pusher::{
    command_channel, game_channel, session_channels, ConnectionState, Connector, StreamConnection,
    Subscription, WsConnector,
};
use crate::services::{CommandRelay, Coordinator, CoordinatorMessage, Dispatcher, Sequencer};
use crate::state::Config;

/// Everything spawned for one authenticated session.
struct ActiveSession {
    session: Session,
    cancel: CancellationToken,
    coordinator: JoinHandle<()>,
}

/// Creates the shared HTTP client used for every backend request.
fn create_http_client() -> ConnectedRoomResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .map_err(|e| ConnectedRoomError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// A wired ConnectedRoom client for one config entry.
pub struct ConnectedRoom {
    config: Arc<Config>,
    host: Host,
    auth: AuthClient,
    stream: StreamConnection,
    active: Mutex<Option<ActiveSession>>,
}

impl ConnectedRoom {
    /// Validates `config` and wires the client with the WebSocket connector.
    pub fn new(config: Config, host: Host) -> ConnectedRoomResult<Self> {
        Self::with_connector(config, host, Arc::new(WsConnector))
    }

    /// Like [`new`](Self::new), with a custom transport connector.
    pub fn with_connector(
        config: Config,
        host: Host,
        connector: Arc<dyn Connector>,
    ) -> ConnectedRoomResult<Self> {
        config.validate().map_err(ConnectedRoomError::Configuration)?;

        let http_client = create_http_client()?;
        let auth = AuthClient::new(
            http_client,
            config.server.clone(),
            config.home_assistant_id.clone(),
        );
        let stream = StreamConnection::new(
            config.server.websocket_url(),
            config.reconnect,
            connector,
        );

        Ok(Self {
            config: Arc::new(config),
            host,
            auth,
            stream,
            active: Mutex::new(None),
        })
    }

    /// Current state of the event stream.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.stream.state()
    }

    /// The authenticated session, while connected.
    pub fn session(&self) -> Option<Session> {
        self.active.lock().as_ref().map(|a| a.session.clone())
    }

    /// Logs in, starts the coordinator and opens the event stream.
    ///
    /// Wiring order:
    /// 1. Authenticate and bind the session
    /// 2. Coordinator queue, sequencer, dispatcher and command relay
    /// 3. Device bindings for remote commands
    /// 4. Stream connection feeding the coordinator queue
    ///
    /// A previous session is stopped first.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectedRoomError::InvalidAuth`] when the backend rejects
    /// the key and [`ConnectedRoomError::Auth`] when it cannot be reached.
    pub async fn connect(&self, api_key: &str) -> ConnectedRoomResult<Session> {
        self.stop().await;

        let session = self.auth.authenticate(api_key).await?;
        let api: Arc<dyn IntegrationApi> = Arc::new(self.auth.bind(session.clone()));

        let (tx, rx) = mpsc::channel::<CoordinatorMessage>(COORDINATOR_QUEUE_CAPACITY);
        let options = Arc::new(self.config.options.clone());

        let sequencer = Sequencer::new(
            self.host.clone(),
            Arc::clone(&options),
            self.config.sequencer,
            tx.clone(),
        );
        let dispatcher = Dispatcher::new(self.host.clone(), Arc::clone(&options));
        let relay = Arc::new(CommandRelay::new(self.host.clone(), Arc::clone(&api)));

        let channel = command_channel(&session);
        if channel.is_some() && !options.command_entities.is_empty() {
            relay.sync_bindings(&options.command_entities).await;
        }

        let coordinator = Coordinator::new(
            game_channel(&session),
            channel,
            dispatcher,
            sequencer,
            relay,
            rx,
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(coordinator.run(cancel.clone()));

        self.stream.reset_stop();
        self.stream.connect(
            Subscription {
                channels: session_channels(&session),
                authorizer: api,
            },
            tx,
        );

        *self.active.lock() = Some(ActiveSession {
            session: session.clone(),
            cancel,
            coordinator: handle,
        });
        Ok(session)
    }

    /// Stops the stream for good and tears down the coordinator.
    pub async fn stop(&self) {
        let active = self.active.lock().take();
        let Some(active) = active else {
            return;
        };

        log::info!("[Bootstrap] Beginning graceful shutdown...");
        self.stream.stop().await;

        active.cancel.cancel();
        if let Err(e) = active.coordinator.await {
            if e.is_panic() {
                log::error!("[Bootstrap] Coordinator panicked: {}", e);
            }
        }
        log::info!("[Bootstrap] Shutdown complete");
    }
}
