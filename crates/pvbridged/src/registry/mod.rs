//! Subscription registry using the actor pattern.
//!
//! The registry is the bridge's source of truth for who watches what. It
//! answers two questions atomically with every mutation: did this make the
//! variable watched, and did this make it unwatched.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  RegistryCommand   ┌──────────────────────┐
//! │  ClientSession  │───────────────────▶│    RegistryActor     │
//! │  (per client)   │   (mpsc channel)   │  SubscriptionIndex   │
//! └─────────────────┘                    │  var ⇄ subscriber    │
//! ┌─────────────────┐  Subscribers{pv}   │                      │
//! │   Dispatcher    │───────────────────▶│                      │
//! └─────────────────┘                    └──────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;
mod index;

pub use actor::RegistryActor;
pub use commands::{RegistryCommand, RegistryError};
pub use handle::RegistryHandle;
pub use index::{IndexStats, SubscriptionIndex};

/// Command channel buffer size
const COMMAND_BUFFER: usize = 256;

/// Spawn the registry actor and return a handle for interaction.
///
/// The actor stops once every clone of the handle has been dropped.
///
/// ```no_run
/// use pvbridged::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let registry = spawn_registry();
///     let stats = registry.stats().await;
/// }
/// ```
pub fn spawn_registry() -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = RegistryActor::new(cmd_rx);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx)
}
