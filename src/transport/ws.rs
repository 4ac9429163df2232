//! WebSocket client transport.
//!
//! Connects to the engine's WebSocket endpoint and runs an event loop task
//! that multiplexes outbound sends with inbound frame delivery.
//!
//! # Event Loop
//!
//! The transport spawns a tokio task per connection that handles:
//!
//! - Incoming frames from the engine (decoded and handed to the router)
//! - Outgoing messages from the dispatcher and workers
//! - Graceful shutdown on disconnect

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{from_str, to_string};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::EngineMessage;

use super::{InboundHandler, Transport};

// ============================================================================
// Types
// ============================================================================

/// Internal commands for the event loop.
enum TransportCommand {
    /// Send a serialized message over the socket.
    Send(EngineMessage),
    /// Close the socket and stop the loop.
    Shutdown,
}

/// Shared inbound handler slot.
type HandlerSlot = Arc<Mutex<Option<InboundHandler>>>;

// ============================================================================
// WsTransport
// ============================================================================

/// WebSocket connection to the remote engine.
///
/// A single `WsTransport` supports repeated connect/disconnect cycles;
/// each successful [`connect`](Transport::connect) replaces the event loop.
///
/// # Thread Safety
///
/// `WsTransport` is `Send + Sync`; all operations are non-blocking.
pub struct WsTransport {
    /// Engine endpoint.
    url: Url,
    /// Channel to the current event loop, if connected.
    command_tx: Mutex<Option<mpsc::UnboundedSender<TransportCommand>>>,
    /// Inbound handler (shared with the event loop).
    handler: HandlerSlot,
    /// Wire-level diagnostic dump flag (shared with the event loop).
    dump: Arc<AtomicBool>,
}

impl WsTransport {
    /// Creates a transport for the given engine address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the address is not a valid `ws://` or
    /// `wss://` URL.
    pub fn new(address: &str) -> Result<Self> {
        let url = Url::parse(address)
            .map_err(|e| Error::config(format!("Invalid engine address '{address}': {e}")))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "Engine address must use ws:// or wss://, got: {address}"
            )));
        }

        Ok(Self {
            url,
            command_tx: Mutex::new(None),
            handler: Arc::new(Mutex::new(None)),
            dump: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Returns the engine endpoint this transport targets.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

// ============================================================================
// WsTransport - Transport Impl
// ============================================================================

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self) -> Result<()> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::connect(e.to_string()))?;

        info!(url = %self.url, "Engine connection established");

        let (command_tx, command_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&self.handler),
            Arc::clone(&self.dump),
        ));

        *self.command_tx.lock() = Some(command_tx);
        Ok(())
    }

    async fn send(&self, message: EngineMessage) -> Result<()> {
        let tx = self
            .command_tx
            .lock()
            .clone()
            .ok_or(Error::ConnectionClosed)?;

        tx.send(TransportCommand::Send(message))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn set_inbound_handler(&self, handler: InboundHandler) {
        *self.handler.lock() = Some(handler);
    }

    async fn disconnect(&self) {
        let tx = self.command_tx.lock().take();
        if let Some(tx) = tx {
            let _ = tx.send(TransportCommand::Shutdown);
            debug!("Transport disconnect requested");
        }
    }

    fn set_diagnostic_dump(&self, enabled: bool) {
        self.dump.store(enabled, Ordering::Relaxed);
        debug!(enabled, "Wire diagnostic dump toggled");
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Event loop that owns the socket for one connection's lifetime.
async fn run_event_loop(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    mut command_rx: mpsc::UnboundedReceiver<TransportCommand>,
    handler: HandlerSlot,
    dump: Arc<AtomicBool>,
) {
    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            // Incoming frames from the engine
            frame = ws_read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if dump.load(Ordering::Relaxed) {
                            info!(frame = %text, "wire <-");
                        }
                        deliver_inbound(&text, &handler);
                    }

                    Some(Ok(Message::Close(_))) => {
                        debug!("Socket closed by engine");
                        break;
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "Socket error");
                        break;
                    }

                    None => {
                        debug!("Socket stream ended");
                        break;
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                }
            }

            // Outbound messages from the dispatch side
            command = command_rx.recv() => {
                match command {
                    Some(TransportCommand::Send(message)) => {
                        let json = match to_string(&message) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!(error = %e, command = %message.command, "Failed to encode message");
                                continue;
                            }
                        };

                        if dump.load(Ordering::Relaxed) {
                            info!(frame = %json, "wire ->");
                        }

                        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
                            error!(error = %e, "Socket send failed");
                            break;
                        }

                        trace!(command = %message.command, "Message sent");
                    }

                    Some(TransportCommand::Shutdown) => {
                        debug!("Shutdown command received");
                        let _ = ws_write.close().await;
                        break;
                    }

                    None => {
                        debug!("Command channel closed");
                        break;
                    }
                }
            }
        }
    }

    debug!("Transport event loop terminated");
}

/// Decodes an inbound frame and hands it to the installed handler.
fn deliver_inbound(text: &str, handler: &HandlerSlot) {
    let message: EngineMessage = match from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, frame = %text, "Failed to parse inbound frame");
            return;
        }
    };

    let guard = handler.lock();
    if let Some(ref handler) = *guard {
        handler(message);
    } else {
        trace!(command = %message.command, "Inbound frame before handler installed");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_ws_address() {
        let result = WsTransport::new("http://127.0.0.1:9000");
        assert!(result.is_err());

        let result = WsTransport::new("not a url");
        assert!(result.is_err());
    }

    #[test]
    fn test_accepts_ws_address() {
        let transport = WsTransport::new("ws://127.0.0.1:9000").expect("valid address");
        assert_eq!(transport.url().scheme(), "ws");
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let transport = WsTransport::new("ws://127.0.0.1:9000").expect("valid address");
        let message = EngineMessage::new("/doc/close", vec![]);

        let result = transport.send(message).await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_engine_fails() {
        // Port 9 (discard) is almost certainly not listening.
        let transport = WsTransport::new("ws://127.0.0.1:9").expect("valid address");
        let result = transport.connect().await;
        assert!(result.is_err());
    }
}
