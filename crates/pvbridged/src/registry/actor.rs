//! Registry actor - owns the subscription index and processes commands.
//!
//! The actor is the single owner of subscription state. Commands arrive over
//! an mpsc channel and are applied strictly one after another, which is what
//! makes each first/last transition observable by exactly one caller.
//!
//! The actor never calls the upstream provider. Side effects triggered by a
//! transition are the caller's job.

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::commands::RegistryCommand;
use super::index::SubscriptionIndex;

/// The registry actor.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Bidirectional (subscriber, variable) index
    index: SubscriptionIndex,
}

impl RegistryActor {
    /// Creates a new registry actor reading from `receiver`.
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>) -> Self {
        Self {
            receiver,
            index: SubscriptionIndex::new(),
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until every handle has been dropped.
    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        let stats = self.index.stats();
        info!(
            variables = stats.variables,
            subscribers = stats.subscribers,
            "Registry actor stopped"
        );
    }

    /// Dispatches a command to the index.
    ///
    /// Responder send errors are ignored: the caller may have given up.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Subscribe {
                subscriber,
                variable,
                respond_to,
            } => {
                let first = self.index.subscribe(subscriber, variable.clone());
                if first {
                    debug!(client_id = %subscriber, pv = %variable, "First subscriber");
                }
                let _ = respond_to.send(first);
            }
            RegistryCommand::Unsubscribe {
                subscriber,
                variable,
                respond_to,
            } => {
                let last = self.index.unsubscribe(subscriber, &variable);
                if last {
                    debug!(client_id = %subscriber, pv = %variable, "Last subscriber left");
                }
                let _ = respond_to.send(last);
            }
            RegistryCommand::UnsubscribeAll {
                subscriber,
                respond_to,
            } => {
                let emptied = self.index.unsubscribe_all(subscriber);
                debug!(
                    client_id = %subscriber,
                    emptied = emptied.len(),
                    "Removed all subscriptions"
                );
                let _ = respond_to.send(emptied);
            }
            RegistryCommand::Subscribers {
                variable,
                respond_to,
            } => {
                let _ = respond_to.send(self.index.subscribers(&variable));
            }
            RegistryCommand::Subscriptions {
                subscriber,
                respond_to,
            } => {
                let _ = respond_to.send(self.index.subscriptions(subscriber));
            }
            RegistryCommand::IsWatched {
                variable,
                respond_to,
            } => {
                let _ = respond_to.send(self.index.is_watched(&variable));
            }
            RegistryCommand::Stats { respond_to } => {
                let _ = respond_to.send(self.index.stats());
            }
        }
    }
}
