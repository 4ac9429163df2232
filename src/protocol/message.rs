//! Engine message and argument types.
//!
//! Defines the message format for commands sent to and received from the
//! remote rendering engine.
//!
//! # Format
//!
//! ```json
//! {
//!   "command": "/doc/query",
//!   "args": ["/tmp/spool/fade-1.job", 50331649, "running", "progress", "error"]
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::identifiers::{DocHandle, SyncId};

// ============================================================================
// Command Addresses
// ============================================================================

/// Outbound: open a job document.
pub const CMD_OPEN: &str = "/doc/open";

/// Outbound: start processing an opened document.
pub const CMD_START: &str = "/doc/start";

/// Outbound: query document properties.
pub const CMD_QUERY: &str = "/doc/query";

/// Outbound: close a document.
pub const CMD_CLOSE: &str = "/doc/close";

/// Inbound: document opened successfully.
pub const CMD_OPENED: &str = "/doc/opened";

/// Inbound: document could not be opened.
pub const CMD_OPEN_FAILED: &str = "/doc/openFailed";

/// Inbound: reply to a query.
pub const CMD_REPLY: &str = "/reply";

// ============================================================================
// Property Names
// ============================================================================

/// Whether the document's job is still running.
pub const PROP_RUNNING: &str = "running";

/// Fractional progress of the running job (0.0–1.0).
pub const PROP_PROGRESS: &str = "progress";

/// Error text reported by the engine; empty means no error.
pub const PROP_ERROR: &str = "error";

/// Sentinel property used for the post-start handshake query.
pub const PROP_VERSION: &str = "engine.version";

// ============================================================================
// Arg
// ============================================================================

/// A single typed message argument.
///
/// The wire representation is the bare JSON value; variant order matters
/// for untagged deserialization (bool before int before float).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arg {
    /// Boolean argument.
    Bool(bool),
    /// Integer argument.
    Int(i64),
    /// Floating-point argument.
    Float(f64),
    /// String argument.
    Str(String),
}

impl Arg {
    /// Returns the string value, if this is a string argument.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value, if this is an integer argument.
    #[inline]
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as a float.
    ///
    /// Integer arguments widen; engines are not consistent about whether
    /// a whole-number progress value arrives as int or float.
    #[inline]
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Returns the boolean value, if this is a boolean argument.
    #[inline]
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

// ============================================================================
// EngineMessage
// ============================================================================

/// A protocol message: command address plus ordered typed arguments.
///
/// # Format
///
/// ```json
/// {
///   "command": "/doc/open",
///   "args": ["/tmp/spool/fade-1.job", false]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineMessage {
    /// Addressable command name.
    pub command: String,

    /// Ordered argument list.
    #[serde(default)]
    pub args: Vec<Arg>,
}

impl EngineMessage {
    /// Creates a message with the given command and arguments.
    #[inline]
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

// ============================================================================
// EngineMessage - Outbound Constructors
// ============================================================================

impl EngineMessage {
    /// Builds an open-document instruction.
    ///
    /// # Arguments
    ///
    /// * `path` - Spool file path readable by the engine
    /// * `show_window` - Whether the engine should show a document window
    #[must_use]
    pub fn open_document(path: &Path, show_window: bool) -> Self {
        Self::new(
            CMD_OPEN,
            vec![
                Arg::Str(path.to_string_lossy().into_owned()),
                Arg::Bool(show_window),
            ],
        )
    }

    /// Builds a start instruction for an opened document.
    #[must_use]
    pub fn start(handle: &DocHandle) -> Self {
        Self::new(CMD_START, vec![Arg::Str(handle.as_str().to_string())])
    }

    /// Builds a property query.
    ///
    /// # Arguments
    ///
    /// * `path` - Document path the query addresses
    /// * `sync_id` - Correlation token; the reply echoes it back
    /// * `properties` - Property names to query, in reply order
    #[must_use]
    pub fn query(path: &Path, sync_id: SyncId, properties: &[&str]) -> Self {
        let mut args = Vec::with_capacity(properties.len() + 2);
        args.push(Arg::Str(path.to_string_lossy().into_owned()));
        args.push(Arg::Int(i64::from(sync_id.raw())));
        args.extend(properties.iter().map(|p| Arg::from(*p)));

        Self::new(CMD_QUERY, args)
    }

    /// Builds a close instruction for an opened document.
    #[must_use]
    pub fn close(handle: &DocHandle) -> Self {
        Self::new(CMD_CLOSE, vec![Arg::Str(handle.as_str().to_string())])
    }
}

// ============================================================================
// Tests
// ============================================================================
