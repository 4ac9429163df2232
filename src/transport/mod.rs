//! Transport layer for the engine connection.
//!
//! The dispatcher talks to the engine through the [`Transport`] trait: a
//! duplex message channel that is injected as a dependency, so tests can
//! substitute a mock and the wire flavor can change without touching the
//! dispatch core.
//!
//! # Connection Lifecycle
//!
//! 1. `Transport::connect` - One attempt to reach the engine
//! 2. `Transport::set_inbound_handler` - Install the dispatcher's router
//! 3. `Transport::send` - Fire-and-forget outbound messages
//! 4. `Transport::disconnect` - Tear down on shutdown or fatal failure
//!
//! The inbound handler is invoked on the transport's own task; it must hand
//! off into the owning component's channel rather than mutate shared state.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `ws` | WebSocket client transport and event loop |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::EngineMessage;

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket client transport.
pub mod ws;

// ============================================================================
// Re-exports
// ============================================================================

pub use ws::WsTransport;

// ============================================================================
// Types
// ============================================================================

/// Inbound message callback type.
///
/// Called for each message received from the engine, on the transport's
/// own task.
pub type InboundHandler = Box<dyn Fn(EngineMessage) + Send + Sync>;

// ============================================================================
// Transport
// ============================================================================

/// Duplex message channel to the remote engine.
///
/// One connection is shared by all worker slots; only the dispatcher may
/// call [`connect`](Transport::connect) or
/// [`disconnect`](Transport::disconnect).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Makes one connection attempt to the engine.
    ///
    /// Retry policy is the dispatcher's concern, not the transport's.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`](crate::Error::Connect) if the engine is
    /// unreachable.
    async fn connect(&self) -> Result<()>;

    /// Sends a message to the engine.
    ///
    /// Fire-and-forget: delivery is not acknowledged at this layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed)
    /// if there is no live connection.
    async fn send(&self, message: EngineMessage) -> Result<()>;

    /// Installs the inbound message callback.
    ///
    /// Replaces any previously installed handler.
    fn set_inbound_handler(&self, handler: InboundHandler);

    /// Closes the connection.
    async fn disconnect(&self);

    /// Enables or disables wire-level diagnostic dumping.
    ///
    /// When enabled, every raw frame in both directions is logged.
    fn set_diagnostic_dump(&self, enabled: bool);
}
