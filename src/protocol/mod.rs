//! Wire protocol message types.
//!
//! This module defines the message format exchanged with the remote
//! rendering engine over the transport.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | `/doc/open` | Local → Engine | Open a job document at a path |
//! | `/doc/start` | Local → Engine | Start processing an opened document |
//! | `/doc/query` | Local → Engine | Query document properties |
//! | `/doc/close` | Local → Engine | Close a document |
//! | `/doc/opened` | Engine → Local | Document opened, carries handle |
//! | `/doc/openFailed` | Engine → Local | Document could not be opened |
//! | `/reply` | Engine → Local | Query reply, carries sync id |
//!
//! Every message is an addressable command name plus an ordered list of
//! typed arguments (string/int/float/bool). Two different correlation keys
//! are in play: open notifications are keyed by document *path*, query
//! replies by *sync id*. The dispatcher keeps both lookup tables.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | [`EngineMessage`], [`Arg`], outbound constructors |
//! | `inbound` | [`Inbound`] classification of engine notifications |

// ============================================================================
// Submodules
// ============================================================================

/// Engine message and argument types.
pub mod message;

/// Inbound message classification.
pub mod inbound;

// ============================================================================
// Re-exports
// ============================================================================

pub use inbound::Inbound;
pub use message::{
    Arg, EngineMessage, PROP_ERROR, PROP_PROGRESS, PROP_RUNNING, PROP_VERSION,
};
