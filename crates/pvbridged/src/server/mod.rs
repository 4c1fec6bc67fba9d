//! WebSocket server for the bridge.
//!
//! The server:
//! - Listens on TCP and upgrades each connection to a WebSocket
//! - Gives every client a `ClientSession` and an outbound queue
//! - Runs the `Dispatcher` that fans provider updates out to sessions
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  BridgeServer   │
//! │  TcpListener    │
//! └───────┬─────────┘
//!         │ accept() + WebSocket upgrade
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  ClientSession  │────▶│  RegistryHandle │
//! │   (per client)  │     │                 │────▶│   PvProvider    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//!         ▲                                                │ UpdateSink
//!         │ outbox                                         ▼
//!         └─────────────────────────────────────── Dispatcher
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - A panicking connection task still releases its subscriptions

mod connection;
mod session;

pub use connection::{ConnectionError, ConnectionHandler};
pub use session::{release_subscriber, ClientSession, SessionError, SessionState};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pvbridge_core::SubscriberId;

use crate::config::BridgeConfig;
use crate::dispatch::{Dispatcher, Outboxes, UpdateSink};
use crate::provider::PvProvider;
use crate::registry::{spawn_registry, RegistryHandle};

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },

    #[error("Failed to read local address: {0}")]
    LocalAddr(String),
}

/// WebSocket server for the bridge.
pub struct BridgeServer {
    listener: TcpListener,
    config: BridgeConfig,
    registry: RegistryHandle,
    provider: Arc<dyn PvProvider>,
    updates: UpdateSink,
    outboxes: Outboxes,
    cancel_token: CancellationToken,

    /// Connection counter for generating client IDs
    connection_counter: AtomicU64,
}

impl BridgeServer {
    /// Binds the listener and starts the registry and the dispatcher.
    ///
    /// Nothing is accepted until [`run`](Self::run) is called.
    pub async fn bind(
        config: BridgeConfig,
        provider: Arc<dyn PvProvider>,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind)
            .await
            .map_err(|e| ServerError::Bind {
                addr: config.bind.clone(),
                error: e.to_string(),
            })?;

        let registry = spawn_registry();
        let outboxes = Outboxes::new();
        let (updates, update_rx) = UpdateSink::channel(config.update_queue);

        let dispatcher = Dispatcher::new(registry.clone(), outboxes.clone());
        tokio::spawn(dispatcher.run(update_rx, cancel_token.clone()));

        Ok(Self {
            listener,
            config,
            registry,
            provider,
            updates,
            outboxes,
            cancel_token,
            connection_counter: AtomicU64::new(0),
        })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::LocalAddr(e.to_string()))
    }

    /// Handle to the subscription registry.
    pub fn registry(&self) -> RegistryHandle {
        self.registry.clone()
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(addr = %self.config.bind, "Bridge server listening");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.handle_connection(stream, addr).await,
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        info!("Server stopped");
        Ok(())
    }

    /// Admits a new TCP connection and spawns its tasks.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        if self.outboxes.len().await >= self.config.max_clients {
            warn!(
                addr = %addr,
                max = self.config.max_clients,
                "Rejecting connection: too many clients"
            );
            return;
        }

        let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let client_id = SubscriberId::new(conn_num);

        let (outbox_tx, outbox_rx) = mpsc::channel(self.config.client_buffer.max(1));
        self.outboxes.insert(client_id, outbox_tx.clone()).await;

        let session = ClientSession::new(
            client_id,
            self.registry.clone(),
            Arc::clone(&self.provider),
            self.updates.clone(),
            outbox_tx,
        );

        let registry = self.registry.clone();
        let provider = Arc::clone(&self.provider);
        let outboxes = self.outboxes.clone();
        let cancel = self.cancel_token.clone();
        let max_message_size = self.config.max_message_size;

        tokio::spawn(async move {
            let connection_outboxes = outboxes.clone();
            let connection = tokio::spawn(async move {
                let ws = match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(e) => {
                        debug!(addr = %addr, error = %e, "WebSocket handshake failed");
                        return Ok(());
                    }
                };

                ConnectionHandler::new(
                    ws,
                    session,
                    outbox_rx,
                    connection_outboxes,
                    max_message_size,
                    cancel,
                )
                .run()
                .await
            });

            match connection.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(client_id = %client_id, error = %e, "Connection ended"),
                Err(e) => {
                    error!(client_id = %client_id, error = %e, "Connection task failed");
                }
            }

            // No-op after a clean exit; recovers state after a panic or an
            // aborted handshake.
            release_subscriber(client_id, &registry, provider.as_ref()).await;
            outboxes.remove(client_id).await;
        });
    }
}
