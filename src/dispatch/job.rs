//! Job and descriptor types.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// Completion callback type.
///
/// Invoked exactly once per job with the final outcome.
pub type DoneCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// Progress callback type.
///
/// Invoked with the integer percentage whenever it changes; values are
/// strictly increasing for a given job.
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync + 'static>;

// ============================================================================
// JobDescriptor
// ============================================================================

/// Opaque, externally defined payload describing what the engine should do.
///
/// What a job configures is out of this crate's scope; the dispatcher only
/// needs the descriptor to be writable as an engine-readable file.
pub trait JobDescriptor: Send + 'static {
    /// Writes the engine-readable payload to the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be produced or written; the
    /// job then fails locally without reaching the engine.
    fn serialize_to(&self, path: &Path) -> Result<()>;
}

// ============================================================================
// Job
// ============================================================================

/// A submitted render job.
///
/// Immutable once enqueued. Lifecycle: created at submission, queued,
/// bound to exactly one worker slot, terminated with exactly one
/// completion callback invocation.
pub struct Job {
    /// Caller-supplied name, used in logs and spool file names.
    pub name: String,

    /// Payload describing the work.
    pub descriptor: Box<dyn JobDescriptor>,

    /// Progress notification callback.
    pub on_progress: ProgressCallback,

    /// Completion callback; fires exactly once.
    pub on_done: DoneCallback,
}

impl Job {
    /// Creates a new job.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        descriptor: Box<dyn JobDescriptor>,
        on_progress: ProgressCallback,
        on_done: DoneCallback,
    ) -> Self {
        Self {
            name: name.into(),
            descriptor,
            on_progress,
            on_done,
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
