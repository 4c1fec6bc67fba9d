//! Upstream variable providers.
//!
//! A provider speaks to the control system. The bridge asks it to start a
//! subscription on a variable's 0→1 transition, to stop it on 1→0, and to
//! write values on behalf of clients. Updates flow back through the
//! [`UpdateSink`] given at subscribe time.

mod local;

pub use local::{LocalProvider, SIM_PREFIX};

use async_trait::async_trait;
use thiserror::Error;

use pvbridge_core::{PvValue, VariableName};

pub use crate::dispatch::UpdateSink;

/// Errors reported by a provider.
///
/// These never tear the bridge down: callers log them and carry on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("Unknown channel: {0}")]
    UnknownChannel(VariableName),

    #[error("Channel is read-only: {0}")]
    ReadOnly(VariableName),
}

/// Connection to the source of variable values.
///
/// Implementations must be safe to call concurrently. The bridge calls
/// `subscribe` at most once per variable between two `unsubscribe` calls,
/// but `write` may arrive at any time.
#[async_trait]
pub trait PvProvider: Send + Sync + 'static {
    /// Starts monitoring `variable`. Every update is pushed into `updates`.
    async fn subscribe(
        &self,
        variable: &VariableName,
        updates: UpdateSink,
    ) -> Result<(), ProviderError>;

    /// Stops monitoring `variable`. Unknown variables are not an error.
    async fn unsubscribe(&self, variable: &VariableName) -> Result<(), ProviderError>;

    /// Writes `value` to `variable`.
    async fn write(&self, variable: &VariableName, value: PvValue) -> Result<(), ProviderError>;
}
