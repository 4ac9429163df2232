//! Error types for the render-dispatch client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use render_dispatch::{Result, Error};
//!
//! async fn example(transport: &dyn Transport) -> Result<()> {
//!     transport.send(message).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connect`], [`Error::ConnectTimeout`], [`Error::ConnectionClosed`], [`Error::AlreadyConnected`] |
//! | Protocol | [`Error::Protocol`], [`Error::QueryTimeout`] |
//! | Document | [`Error::OpenTimeout`], [`Error::OpenRejected`] |
//! | Job | [`Error::RemoteReported`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::SyncId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection to the engine failed.
    ///
    /// Returned when the transport cannot reach the remote engine.
    #[error("Connection failed: {message}")]
    Connect {
        /// Description of the connection error.
        message: String,
    },

    /// Connection retry budget exhausted.
    ///
    /// Returned when the engine does not accept a connection within
    /// the caller-supplied timeout.
    #[error("Connection timeout after {timeout_secs}s")]
    ConnectTimeout {
        /// Seconds waited before giving up.
        timeout_secs: u64,
    },

    /// A connect attempt was made while a connection exists or is in progress.
    #[error("Already connected or connecting")]
    AlreadyConnected,

    /// Connection closed unexpectedly.
    ///
    /// Returned when the socket is lost during operation.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Document Errors
    // ========================================================================
    /// The engine did not acknowledge a document open within the deadline.
    ///
    /// Whether the engine actually opened the document is unknown.
    #[error("Open timed out for document: {}", path.display())]
    OpenTimeout {
        /// Path of the document that was being opened.
        path: PathBuf,
    },

    /// The engine explicitly rejected a document open.
    #[error("Open rejected for document: {}", path.display())]
    OpenRejected {
        /// Path of the rejected document.
        path: PathBuf,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// A query received no reply within its deadline.
    ///
    /// Terminal for the job that issued the query; there is no retry.
    #[error("Query {sync_id} timed out after {timeout_ms}ms")]
    QueryTimeout {
        /// The sync id of the unanswered query.
        sync_id: SyncId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Protocol violation or malformed message.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Job Errors
    // ========================================================================
    /// The engine reported an error string while the job was running.
    #[error("Engine reported error: {message}")]
    RemoteReported {
        /// Error text as reported by the engine.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error (descriptor serialization, spool file creation).
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Creates a connect timeout error.
    #[inline]
    pub fn connect_timeout(timeout_secs: u64) -> Self {
        Self::ConnectTimeout { timeout_secs }
    }

    /// Creates an open timeout error.
    #[inline]
    pub fn open_timeout(path: impl Into<PathBuf>) -> Self {
        Self::OpenTimeout { path: path.into() }
    }

    /// Creates an open rejected error.
    #[inline]
    pub fn open_rejected(path: impl Into<PathBuf>) -> Self {
        Self::OpenRejected { path: path.into() }
    }

    /// Creates a query timeout error.
    #[inline]
    pub fn query_timeout(sync_id: SyncId, timeout_ms: u64) -> Self {
        Self::QueryTimeout {
            sync_id,
            timeout_ms,
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a remote-reported error.
    #[inline]
    pub fn remote_reported(message: impl Into<String>) -> Self {
        Self::RemoteReported {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout { .. } | Self::OpenTimeout { .. } | Self::QueryTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::ConnectTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error terminates a single job without
    /// affecting the connection or sibling slots.
    #[inline]
    #[must_use]
    pub fn is_job_local(&self) -> bool {
        matches!(
            self,
            Self::OpenTimeout { .. }
                | Self::OpenRejected { .. }
                | Self::QueryTimeout { .. }
                | Self::RemoteReported { .. }
                | Self::Io(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
