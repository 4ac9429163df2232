//! Render Dispatch - Async job-dispatch client for a remote rendering engine.
//!
//! This library drives a long-running external rendering engine through a
//! single bidirectional message socket: callers submit render jobs, the
//! library serializes each job's description to a spool file the engine can
//! read, hands off control via a small message protocol, tracks progress and
//! completion asynchronously, and reports the outcome back through
//! callbacks.
//!
//! # Architecture
//!
//! The client follows an actor model over one shared connection:
//!
//! - **Dispatcher** (one task): owns the job queue, the worker slot pool,
//!   and both inbound routing tables
//! - **Workers** (one task per slot): each runs the open/start/poll/close
//!   protocol for its bound job against the shared [`Transport`]
//! - **Transport**: duplex message channel to the engine; inbound frames are
//!   handed off into the dispatcher's task, never handled in place
//!
//! Query replies are correlated by a sync id that packs the slot id into
//! its high bits; open notifications are correlated by document path.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use render_dispatch::{Client, JobDescriptor, Result};
//!
//! struct ToneSweep;
//!
//! impl JobDescriptor for ToneSweep {
//!     fn serialize_to(&self, _path: &std::path::Path) -> Result<()> {
//!         // Write the engine-readable job description here.
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder()
//!         .address("ws://127.0.0.1:8090")
//!         .pool_size(4)
//!         .build()?;
//!
//!     client.connect(Duration::from_secs(30)).await?;
//!     client.submit(
//!         "tone-sweep",
//!         Box::new(ToneSweep),
//!         Arc::new(|pct| println!("{pct}%")),
//!         Box::new(|ok| println!("done: {ok}")),
//!     );
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Caller-facing facade: [`Client`], [`ClientBuilder`] |
//! | [`dispatch`] | Dispatcher actor, worker pool, job types |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Slot ids, sync ids, document handles |
//! | [`protocol`] | Engine message types (internal wire format) |
//! | [`transport`] | WebSocket transport layer |
//!
//! # Guarantees
//!
//! - **Exactly-once completion**: every submitted job resolves through its
//!   callback exactly once, whatever the failure mode
//! - **Bounded waits**: every protocol wait carries a deadline; a timeout
//!   fails the affected job and frees its slot, nothing else
//! - **Monotonic progress**: the progress callback fires only when the
//!   integer percentage increases

// ============================================================================
// Modules
// ============================================================================

/// Caller-facing facade.
///
/// Use [`Client::builder()`] to configure address, pool size, and
/// diagnostics, then [`Client::connect`] and submit jobs.
pub mod client;

/// Dispatch core: queue, worker pool, per-job state machine.
pub mod dispatch;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers: slot ids, packed sync ids, document handles.
pub mod identifiers;

/// Engine message types.
///
/// Internal module defining the command/argument wire format.
pub mod protocol;

/// Transport layer.
///
/// The [`Transport`] trait plus the WebSocket implementation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientBuilder, DEFAULT_ADDRESS, DEFAULT_POOL_SIZE};

// Dispatch types
pub use dispatch::{ConnectionState, DoneCallback, Job, JobDescriptor, ProgressCallback};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{DocHandle, MAX_SLOT_INDEX, SlotId, SyncId};

// Transport types
pub use transport::{Transport, WsTransport};
