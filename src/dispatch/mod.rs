//! Job dispatch core: queue, worker pool, and per-job protocol state machine.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐ submit ┌────────────────────────┐  open/route  ┌──────────┐
//! │  Client  │───────►│  Dispatcher (1 task)   │◄────────────►│ Worker 0 │
//! │  facade  │        │  queue · slots · gate  │              ├──────────┤
//! └──────────┘        │  path + sync-id tables │◄────────────►│ Worker N │
//!                     └───────────▲────────────┘              └────┬─────┘
//!                                 │ inbound hand-off                │ send
//!                          ┌──────┴──────┐                          │
//!                          │  Transport  │◄─────────────────────────┘
//!                          └─────────────┘
//! ```
//!
//! All queue, slot-binding, and path-table state is owned by the single
//! dispatcher task; workers and the transport communicate with it purely by
//! message passing.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `job` | [`Job`], [`JobDescriptor`], callback types |
//! | `worker` | Per-slot protocol state machine task |
//! | `dispatcher` | Dispatcher actor and its command set |

// ============================================================================
// Submodules
// ============================================================================

/// Job and descriptor types.
pub mod job;

/// Per-slot worker state machine.
pub mod worker;

/// Dispatcher actor.
pub mod dispatcher;

#[cfg(test)]
pub(crate) mod testkit;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatcher::{ConnectionState, Dispatcher, DispatcherHandle};
pub use job::{DoneCallback, Job, JobDescriptor, ProgressCallback};
