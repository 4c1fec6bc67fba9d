//! Client interface for interacting with the `RegistryActor`.
//!
//! The `RegistryHandle` is a cheap-to-clone front for the actor. Every method
//! is one command round-trip; channel failures map to
//! `RegistryError::ChannelClosed`.

use tokio::sync::{mpsc, oneshot};

use pvbridge_core::{SubscriberId, VariableName};

use super::commands::{RegistryCommand, RegistryError};
use super::index::IndexStats;

/// Handle for interacting with the registry actor.
///
/// ```ignore
/// let registry = spawn_registry();
/// if registry.subscribe(client, pv.clone()).await? {
///     provider.subscribe(&pv, sink).await?;
/// }
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(build(tx))
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Record that `subscriber` watches `variable`.
    ///
    /// Returns `true` if this made `subscriber` the variable's first
    /// subscriber; the caller must then start the upstream subscription.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn subscribe(
        &self,
        subscriber: SubscriberId,
        variable: VariableName,
    ) -> Result<bool, RegistryError> {
        self.request(|respond_to| RegistryCommand::Subscribe {
            subscriber,
            variable,
            respond_to,
        })
        .await
    }

    /// Record that `subscriber` stopped watching `variable`.
    ///
    /// Returns `true` if `subscriber` was the last one; the caller must then
    /// stop the upstream subscription.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn unsubscribe(
        &self,
        subscriber: SubscriberId,
        variable: VariableName,
    ) -> Result<bool, RegistryError> {
        self.request(|respond_to| RegistryCommand::Unsubscribe {
            subscriber,
            variable,
            respond_to,
        })
        .await
    }

    /// Remove every subscription held by `subscriber`.
    ///
    /// Returns the variables that now have no subscriber at all. A second
    /// call for the same subscriber returns an empty list.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn unsubscribe_all(
        &self,
        subscriber: SubscriberId,
    ) -> Result<Vec<VariableName>, RegistryError> {
        self.request(|respond_to| RegistryCommand::UnsubscribeAll {
            subscriber,
            respond_to,
        })
        .await
    }

    /// Snapshot of the subscribers watching `variable`.
    ///
    /// Returns an empty vector if the actor is gone.
    pub async fn subscribers(&self, variable: VariableName) -> Vec<SubscriberId> {
        self.request(|respond_to| RegistryCommand::Subscribers {
            variable,
            respond_to,
        })
        .await
        .unwrap_or_default()
    }

    /// Variables watched by `subscriber`, sorted by name.
    ///
    /// Returns an empty vector if the actor is gone.
    pub async fn subscriptions(&self, subscriber: SubscriberId) -> Vec<VariableName> {
        self.request(|respond_to| RegistryCommand::Subscriptions {
            subscriber,
            respond_to,
        })
        .await
        .unwrap_or_default()
    }

    /// Whether `variable` has at least one subscriber.
    ///
    /// Returns `false` if the actor is gone.
    pub async fn is_watched(&self, variable: VariableName) -> bool {
        self.request(|respond_to| RegistryCommand::IsWatched {
            variable,
            respond_to,
        })
        .await
        .unwrap_or(false)
    }

    /// Current index counts.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn stats(&self) -> Result<IndexStats, RegistryError> {
        self.request(|respond_to| RegistryCommand::Stats { respond_to })
            .await
    }
}
