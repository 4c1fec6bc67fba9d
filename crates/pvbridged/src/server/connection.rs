//! WebSocket plumbing for one client connection.
//!
//! Each connection gets a `ConnectionHandler` that:
//! - Splits the WebSocket into a reader and a writer half
//! - Spawns a writer task draining the client's outbound queue
//! - Feeds inbound text frames to the `ClientSession`
//! - Releases the session's subscriptions when the connection ends
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Transport errors end the connection gracefully

use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pvbridge_core::SubscriberId;
use pvbridge_protocol::ProtocolError;

use super::session::{ClientSession, SessionError};
use crate::dispatch::{Frame, Outboxes};

/// Write timeout per frame (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("WebSocket error: {0}")]
    Transport(String),

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Writer stopped")]
    WriterStopped,

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Connection handler for a single WebSocket client.
pub struct ConnectionHandler<S> {
    ws: WebSocketStream<S>,
    session: ClientSession,
    outbox: mpsc::Receiver<Frame>,
    outboxes: Outboxes,
    max_message_size: usize,
    cancel: CancellationToken,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Creates a handler.
    ///
    /// The session's outbox sender must already be registered in
    /// `outboxes`; the handler unregisters it when the connection ends.
    pub fn new(
        ws: WebSocketStream<S>,
        session: ClientSession,
        outbox: mpsc::Receiver<Frame>,
        outboxes: Outboxes,
        max_message_size: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ws,
            session,
            outbox,
            outboxes,
            max_message_size,
            cancel,
        }
    }

    /// Runs the connection until the client leaves, the transport fails, or
    /// shutdown is requested. Subscriptions are released on every path.
    pub async fn run(self) -> Result<(), ConnectionError> {
        let Self {
            ws,
            mut session,
            outbox,
            outboxes,
            max_message_size,
            cancel,
        } = self;

        let client_id = session.id();
        info!(client_id = %client_id, "Client connected");

        let (sink, mut stream) = ws.split();
        let mut writer = tokio::spawn(write_loop(sink, outbox, client_id));

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(client_id = %client_id, "Shutdown requested");
                    break Ok(());
                }

                // The writer only finishes on its own if the client is unreachable
                joined = &mut writer => {
                    break match joined {
                        Ok(Err(e)) => Err(e),
                        _ => Err(ConnectionError::WriterStopped),
                    };
                }

                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            let text = text.as_str();
                            if text.len() > max_message_size {
                                let err = ProtocolError::MessageTooLarge {
                                    size: text.len(),
                                    max: max_message_size,
                                };
                                if let Err(e) = session.reply_error(&err).await {
                                    break Err(e.into());
                                }
                                continue;
                            }
                            if let Err(e) = session.handle_text(text).await {
                                break Err(e.into());
                            }
                        }
                        Some(Ok(Message::Binary(_))) => {
                            if let Err(e) = session.reply_error(&ProtocolError::BinaryFrame).await {
                                break Err(e.into());
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!(client_id = %client_id, "Client closed connection");
                            break Ok(());
                        }
                        // Ping/pong are answered by tungstenite
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            break Err(ConnectionError::Transport(e.to_string()));
                        }
                    }
                }
            }
        };

        session.disconnect().await;
        outboxes.remove(client_id).await;
        drop(session);

        // Both senders are gone now: the writer flushes what is queued and
        // sends a close frame.
        if !writer.is_finished() && timeout(WRITE_TIMEOUT, &mut writer).await.is_err() {
            warn!(client_id = %client_id, "Writer did not finish, aborting");
            writer.abort();
        }

        result
    }
}

/// Drains the outbound queue into the WebSocket until every sender is gone.
async fn write_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut outbox: mpsc::Receiver<Frame>,
    client_id: SubscriberId,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(frame) = outbox.recv().await {
        let message = Message::Text(frame.to_string().into());
        match timeout(WRITE_TIMEOUT, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(client_id = %client_id, error = %e, "Failed to send frame");
                return Err(ConnectionError::Transport(e.to_string()));
            }
            Err(_) => {
                debug!(client_id = %client_id, "Write timed out");
                return Err(ConnectionError::WriteTimeout);
            }
        }
    }

    let _ = sink.close().await;
    Ok(())
}
