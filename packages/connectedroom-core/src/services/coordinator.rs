//! Single-consumer queue for one config entry.
//!
//! Inbound Pusher messages, sequencer timer expiries and horn state changes
//! all land on one bounded queue and are handled one at a time by
//! [`Coordinator::run`]. The dispatcher, sequencer and relay therefore never
//! see concurrent access to their state.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::command_relay::CommandRelay;
use super::dispatcher::Dispatcher;
use super::sequencer::{Sequencer, SequencerEvent};
use crate::events::decode;
use crate::pusher::InboundMessage;

/// Work item on the coordinator queue.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorMessage {
    /// A channel event from the stream connection.
    Inbound(InboundMessage),
    /// Timer expiry or horn state change for the sequencer.
    Sequencer(SequencerEvent),
}

impl From<InboundMessage> for CoordinatorMessage {
    fn from(message: InboundMessage) -> Self {
        Self::Inbound(message)
    }
}

pub struct Coordinator {
    game_channel: String,
    command_channel: Option<String>,
    dispatcher: Dispatcher,
    sequencer: Sequencer,
    relay: Arc<CommandRelay>,
    rx: mpsc::Receiver<CoordinatorMessage>,
}

impl Coordinator {
    pub fn new(
        game_channel: String,
        command_channel: Option<String>,
        dispatcher: Dispatcher,
        sequencer: Sequencer,
        relay: Arc<CommandRelay>,
        rx: mpsc::Receiver<CoordinatorMessage>,
    ) -> Self {
        Self {
            game_channel,
            command_channel,
            dispatcher,
            sequencer,
            relay,
            rx,
        }
    }

    /// Processes messages until cancelled or every sender is gone.
    pub async fn run(mut self, cancel: CancellationToken) {
        log::info!("[Coordinator] Started for channel {}", self.game_channel);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    log::debug!("[Coordinator] Cancelled");
                    break;
                }

                message = self.rx.recv() => match message {
                    Some(message) => self.handle(message).await,
                    None => {
                        log::debug!("[Coordinator] Queue closed");
                        break;
                    }
                },
            }
        }

        self.sequencer.shutdown();
        log::info!("[Coordinator] Stopped");
    }

    async fn handle(&mut self, message: CoordinatorMessage) {
        match message {
            CoordinatorMessage::Sequencer(event) => self.sequencer.handle(event).await,
            CoordinatorMessage::Inbound(inbound) => self.route(inbound).await,
        }
    }

    async fn route(&mut self, inbound: InboundMessage) {
        if inbound.channel == self.game_channel {
            match decode(&inbound.event, &inbound.data) {
                Ok(Some(decoded)) => self.dispatcher.dispatch(&decoded, &mut self.sequencer).await,
                Ok(None) => {}
                Err(e) => log::warn!("[Coordinator] Dropping event: {}", e),
            }
        } else if self.command_channel.as_deref() == Some(inbound.channel.as_str()) {
            self.relay.handle(&inbound.event, &inbound.data).await;
        } else {
            log::debug!(
                "[Coordinator] Message on unknown channel {}: {}",
                inbound.channel,
                inbound.event
            );
        }
    }
}
