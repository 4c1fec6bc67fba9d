//! Runtime configuration for the bridge.
//!
//! Defaults suit a local development setup. The listen address can be
//! overridden with the `PVBRIDGE_BIND` environment variable, and the command
//! line takes precedence over both.

use std::env;

/// Default listen address.
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Environment variable overriding the listen address.
pub const BIND_ENV: &str = "PVBRIDGE_BIND";

/// Capacity of the provider → dispatcher hand-off queue.
pub const DEFAULT_UPDATE_QUEUE: usize = 1024;

/// Frames buffered per client before updates for it are dropped.
pub const DEFAULT_CLIENT_BUFFER: usize = 256;

/// Maximum inbound frame size (1 MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Maximum number of concurrent WebSocket clients
pub const DEFAULT_MAX_CLIENTS: usize = 256;

/// Bridge settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Address the WebSocket listener binds to (`host:port`)
    pub bind: String,

    /// Capacity of the update hand-off queue
    pub update_queue: usize,

    /// Capacity of each client's outbound queue
    pub client_buffer: usize,

    /// Largest accepted inbound text frame, in bytes
    pub max_message_size: usize,

    /// Connections beyond this count are refused
    pub max_clients: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            update_queue: DEFAULT_UPDATE_QUEUE,
            client_buffer: DEFAULT_CLIENT_BUFFER,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_clients: DEFAULT_MAX_CLIENTS,
        }
    }
}

impl BridgeConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(bind) = env::var(BIND_ENV) {
            let bind = bind.trim();
            if !bind.is_empty() {
                config.bind = bind.to_string();
            }
        }
        config
    }

    /// Replaces the listen address.
    #[must_use]
    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }
}
