//! Per-client session logic, independent of the transport.
//!
//! A `ClientSession` turns parsed client messages into registry commands
//! and provider calls. It owns the sending half of its client's outbound
//! queue for replies; updates reach the same queue through the dispatcher.
//!
//! States:
//!
//! ```text
//! Connected ──disconnect()──▶ Disconnected
//! ```
//!
//! Messages arriving after disconnect are ignored. Disconnect releases every
//! subscription exactly once; calling it again does nothing.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use pvbridge_core::{PvValue, SubscriberId, VariableName};
use pvbridge_protocol::{parse_client_message, ClientMessage, ProtocolError, ServerMessage};

use crate::dispatch::{Frame, OutboxSender, UpdateSink};
use crate::provider::PvProvider;
use crate::registry::{RegistryError, RegistryHandle};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Disconnected,
}

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Outbound queue closed")]
    OutboxClosed,

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// State and behaviour of one connected client.
pub struct ClientSession {
    id: SubscriberId,
    registry: RegistryHandle,
    provider: Arc<dyn PvProvider>,
    updates: UpdateSink,
    outbox: OutboxSender,
    state: SessionState,
}

impl ClientSession {
    pub fn new(
        id: SubscriberId,
        registry: RegistryHandle,
        provider: Arc<dyn PvProvider>,
        updates: UpdateSink,
        outbox: OutboxSender,
    ) -> Self {
        Self {
            id,
            registry,
            provider,
            updates,
            outbox,
            state: SessionState::Connected,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handles one inbound text frame.
    ///
    /// Malformed frames are answered with an error message and otherwise
    /// ignored.
    ///
    /// # Errors
    ///
    /// Only errors that make the session unusable are returned.
    pub async fn handle_text(&mut self, text: &str) -> Result<(), SessionError> {
        match parse_client_message(text) {
            Ok(msg) => self.handle_message(msg).await,
            Err(e) => {
                debug!(client_id = %self.id, error = %e, "Rejected client frame");
                self.reply_error(&e).await
            }
        }
    }

    /// Handles one parsed client message.
    pub async fn handle_message(&mut self, msg: ClientMessage) -> Result<(), SessionError> {
        if self.state == SessionState::Disconnected {
            trace!(client_id = %self.id, "Ignoring message after disconnect");
            return Ok(());
        }

        match msg {
            ClientMessage::Subscribe { pvs } => self.subscribe(pvs).await,
            ClientMessage::Unsubscribe { pvs } => self.unsubscribe(pvs).await,
            ClientMessage::Write { pv, value } => {
                self.write(pv, value).await;
                Ok(())
            }
            ClientMessage::List => {
                let pvs = self.registry.subscriptions(self.id).await;
                self.send(ServerMessage::list(pvs)).await
            }
            ClientMessage::Ping => {
                trace!(client_id = %self.id, "Ping");
                Ok(())
            }
        }
    }

    async fn subscribe(&mut self, pvs: Vec<VariableName>) -> Result<(), SessionError> {
        for pv in pvs {
            if !self.registry.subscribe(self.id, pv.clone()).await? {
                continue;
            }

            debug!(client_id = %self.id, pv = %pv, "Starting upstream subscription");
            if let Err(e) = self.provider.subscribe(&pv, self.updates.clone()).await {
                warn!(pv = %pv, error = %e, "Upstream subscribe failed");
                // Drop our own registration so a later subscribe retries.
                self.registry.unsubscribe(self.id, pv.clone()).await?;
                self.send(ServerMessage::error(format!(
                    "Failed to subscribe to {pv}: {e}"
                )))
                .await?;
            }
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, pvs: Vec<VariableName>) -> Result<(), SessionError> {
        for pv in pvs {
            if self.registry.unsubscribe(self.id, pv.clone()).await? {
                debug!(client_id = %self.id, pv = %pv, "Stopping upstream subscription");
                if let Err(e) = self.provider.unsubscribe(&pv).await {
                    warn!(pv = %pv, error = %e, "Upstream unsubscribe failed");
                }
            }
        }
        Ok(())
    }

    /// Forwards a write if the variable is watched by any client.
    async fn write(&self, pv: VariableName, value: PvValue) {
        if !self.registry.is_watched(pv.clone()).await {
            debug!(client_id = %self.id, pv = %pv, "Dropping write to unwatched variable");
            return;
        }

        if let Err(e) = self.provider.write(&pv, value).await {
            warn!(pv = %pv, error = %e, "Upstream write failed");
        }
    }

    /// Sends a protocol error to the client.
    pub async fn reply_error(&self, err: &ProtocolError) -> Result<(), SessionError> {
        self.send(ServerMessage::from(err)).await
    }

    async fn send(&self, msg: ServerMessage) -> Result<(), SessionError> {
        let frame: Frame = msg.to_json()?.into();
        self.outbox
            .send(frame)
            .await
            .map_err(|_| SessionError::OutboxClosed)
    }

    /// Moves to `Disconnected` and releases every subscription.
    ///
    /// Returns the variables whose upstream subscription was stopped. Only
    /// the first call does any work.
    pub async fn disconnect(&mut self) -> Vec<VariableName> {
        if self.state == SessionState::Disconnected {
            return Vec::new();
        }
        self.state = SessionState::Disconnected;

        let released = release_subscriber(self.id, &self.registry, self.provider.as_ref()).await;
        info!(client_id = %self.id, released = released.len(), "Client disconnected");
        released
    }
}

/// Removes all of `subscriber`'s subscriptions and stops upstream monitoring
/// of every variable left without subscribers.
///
/// Safe to call more than once: the registry reports each emptied variable
/// only to the first caller.
pub async fn release_subscriber(
    subscriber: SubscriberId,
    registry: &RegistryHandle,
    provider: &dyn PvProvider,
) -> Vec<VariableName> {
    let emptied = match registry.unsubscribe_all(subscriber).await {
        Ok(emptied) => emptied,
        Err(e) => {
            warn!(client_id = %subscriber, error = %e, "Failed to release subscriptions");
            return Vec::new();
        }
    };

    for variable in &emptied {
        if let Err(e) = provider.unsubscribe(variable).await {
            warn!(pv = %variable, error = %e, "Upstream unsubscribe failed");
        }
    }

    emptied
}
