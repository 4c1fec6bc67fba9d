//! Registry actor commands and errors.
//!
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors seen by callers of the handle

use pvbridge_core::{SubscriberId, VariableName};
use thiserror::Error;
use tokio::sync::oneshot;

use super::index::IndexStats;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command carries a oneshot channel for the response. The actor handles
/// them one at a time, so every command is atomic with respect to the others
/// and its transition flag is exact.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Add a (subscriber, variable) pair.
    ///
    /// Responds `true` if the variable went from zero subscribers to one.
    Subscribe {
        subscriber: SubscriberId,
        variable: VariableName,
        respond_to: oneshot::Sender<bool>,
    },

    /// Remove a (subscriber, variable) pair.
    ///
    /// Responds `true` if the variable went from one subscriber to zero.
    Unsubscribe {
        subscriber: SubscriberId,
        variable: VariableName,
        respond_to: oneshot::Sender<bool>,
    },

    /// Remove every pair for a subscriber.
    ///
    /// Responds with the variables that no longer have any subscriber.
    UnsubscribeAll {
        subscriber: SubscriberId,
        respond_to: oneshot::Sender<Vec<VariableName>>,
    },

    /// Snapshot of the subscribers watching a variable.
    Subscribers {
        variable: VariableName,
        respond_to: oneshot::Sender<Vec<SubscriberId>>,
    },

    /// Variables watched by one subscriber, sorted.
    Subscriptions {
        subscriber: SubscriberId,
        respond_to: oneshot::Sender<Vec<VariableName>>,
    },

    /// Whether a variable has at least one subscriber.
    IsWatched {
        variable: VariableName,
        respond_to: oneshot::Sender<bool>,
    },

    /// Index counts.
    Stats {
        respond_to: oneshot::Sender<IndexStats>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The actor is gone, usually because the bridge is shutting down.
    #[error("registry channel closed")]
    ChannelClosed,
}
