//! Per-slot worker: the protocol state machine for one job at a time.
//!
//! Each pool slot is one tokio task cycling through
//! `Idle → AwaitingOpen → Starting → Polling → Idle`. The dispatcher hands
//! the worker an open instruction and routes matching inbound messages to
//! it; the worker sends all protocol messages for its bound job itself.
//!
//! Every wait is bounded. A timeout is terminal for the current job only:
//! the worker reports failure and returns to idle, ready for the next
//! assignment.

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{DocHandle, SlotId, SyncId, SyncIdAllocator};
use crate::protocol::{Arg, EngineMessage, PROP_ERROR, PROP_PROGRESS, PROP_RUNNING, PROP_VERSION};
use crate::transport::Transport;

use super::dispatcher::DispatchCommand;
use super::job::ProgressCallback;

// ============================================================================
// Constants
// ============================================================================

/// Bounded wait for the engine's open-succeeded/open-failed notification.
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for the post-start handshake reply.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for each status query reply.
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between status polls.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// The engine never shows a document window for dispatched jobs.
const SHOW_WINDOW: bool = false;

// ============================================================================
// WorkerCommand
// ============================================================================

/// Messages the dispatcher routes to a worker.
pub(crate) enum WorkerCommand {
    /// Bind a job: open the document at `path` and run it to completion.
    Open {
        /// Spool file path of the serialized job descriptor.
        path: PathBuf,
        /// Job name, for logging.
        name: String,
        /// Progress callback for the bound job.
        on_progress: ProgressCallback,
    },

    /// The engine opened the worker's current document.
    Opened {
        /// Remote handle for start/close instructions.
        handle: DocHandle,
    },

    /// The engine rejected the worker's current document.
    OpenFailed,

    /// A query reply tagged with this worker's slot.
    Reply {
        /// Echoed correlation token.
        sync_id: SyncId,
        /// Property values.
        values: Vec<Arg>,
    },
}

impl std::fmt::Debug for WorkerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open { path, name, .. } => f
                .debug_struct("Open")
                .field("path", path)
                .field("name", name)
                .finish_non_exhaustive(),
            Self::Opened { handle } => f.debug_struct("Opened").field("handle", handle).finish(),
            Self::OpenFailed => f.write_str("OpenFailed"),
            Self::Reply { sync_id, values } => f
                .debug_struct("Reply")
                .field("sync_id", sync_id)
                .field("values", values)
                .finish(),
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

/// One pool slot's state machine task.
pub(crate) struct Worker {
    /// This worker's slot.
    slot: SlotId,
    /// Inbox of dispatcher-routed commands.
    rx: mpsc::UnboundedReceiver<WorkerCommand>,
    /// Shared engine connection.
    transport: Arc<dyn Transport>,
    /// Channel back to the dispatcher.
    dispatcher: mpsc::UnboundedSender<DispatchCommand>,
    /// Per-slot sync id source; never shared.
    sync_ids: SyncIdAllocator,
}

impl Worker {
    /// Spawns a worker task for the given slot.
    ///
    /// Returns the sender the dispatcher routes commands through. The task
    /// exits when that sender is dropped.
    pub(crate) fn spawn(
        slot: SlotId,
        transport: Arc<dyn Transport>,
        dispatcher: mpsc::UnboundedSender<DispatchCommand>,
    ) -> mpsc::UnboundedSender<WorkerCommand> {
        let (tx, rx) = mpsc::unbounded_channel();

        let worker = Self {
            slot,
            rx,
            transport,
            dispatcher,
            sync_ids: SyncIdAllocator::new(slot),
        };

        tokio::spawn(worker.run());
        tx
    }

    /// Idle loop: wait for an assignment, run it, report, repeat.
    async fn run(mut self) {
        debug!(slot = %self.slot, "Worker started");

        while let Some(command) = self.rx.recv().await {
            let WorkerCommand::Open {
                path,
                name,
                on_progress,
            } = command
            else {
                // Stale routing from a previous job; nothing is bound.
                trace!(slot = %self.slot, ?command, "Dropping message while idle");
                continue;
            };

            let success = match self.run_job(&path, &name, &on_progress).await {
                Ok(()) => {
                    debug!(slot = %self.slot, job = %name, "Job completed");
                    true
                }
                Err(e) => {
                    warn!(
                        slot = %self.slot,
                        job = %name,
                        path = %path.display(),
                        error = %e,
                        "Job failed"
                    );

                    if e.is_connection_error()
                        && self
                            .dispatcher
                            .send(DispatchCommand::ConnectionLost)
                            .is_err()
                    {
                        break;
                    }

                    false
                }
            };

            let report = DispatchCommand::JobFinished {
                slot: self.slot,
                success,
            };
            if self.dispatcher.send(report).is_err() {
                break;
            }
        }

        debug!(slot = %self.slot, "Worker stopped");
    }

    /// Runs one job from open through close.
    async fn run_job(
        &mut self,
        path: &Path,
        name: &str,
        on_progress: &ProgressCallback,
    ) -> Result<()> {
        // AwaitingOpen
        self.transport
            .send(EngineMessage::open_document(path, SHOW_WINDOW))
            .await?;
        let handle = self.await_open(path).await?;
        debug!(slot = %self.slot, job = %name, handle = %handle, "Document opened");

        // Starting
        self.transport.send(EngineMessage::start(&handle)).await?;

        // The start instruction is fire-and-forget. Waiting for one sentinel
        // query reply guarantees the engine has consumed it before the first
        // poll; otherwise the poll can observe pre-start state.
        self.query(path, &[PROP_VERSION], HANDSHAKE_TIMEOUT).await?;

        // Polling
        let error_text = self.poll_until_done(path, on_progress).await?;

        self.transport.send(EngineMessage::close(&handle)).await?;

        if error_text.is_empty() {
            Ok(())
        } else {
            Err(Error::remote_reported(error_text))
        }
    }

    /// Waits for the open-succeeded or open-failed notification.
    async fn await_open(&mut self, path: &Path) -> Result<DocHandle> {
        let deadline = Instant::now() + OPEN_TIMEOUT;

        loop {
            match timeout_at(deadline, self.rx.recv()).await {
                Err(_) => return Err(Error::open_timeout(path)),
                Ok(None) => return Err(Error::ConnectionClosed),
                Ok(Some(WorkerCommand::Opened { handle })) => return Ok(handle),
                Ok(Some(WorkerCommand::OpenFailed)) => return Err(Error::open_rejected(path)),
                Ok(Some(other)) => {
                    trace!(slot = %self.slot, ?other, "Dropping stale message while awaiting open");
                }
            }
        }
    }

    /// Issues one query and waits for its reply.
    ///
    /// Strictly synchronous per slot: no new query is issued while this one
    /// is outstanding. A timeout is terminal; stale replies from earlier
    /// timed-out queries are discarded by sync id.
    async fn query(
        &mut self,
        path: &Path,
        properties: &[&str],
        reply_timeout: Duration,
    ) -> Result<Vec<Arg>> {
        let sync_id = self.sync_ids.next();
        self.transport
            .send(EngineMessage::query(path, sync_id, properties))
            .await?;

        let deadline = Instant::now() + reply_timeout;

        loop {
            match timeout_at(deadline, self.rx.recv()).await {
                Err(_) => {
                    return Err(Error::query_timeout(
                        sync_id,
                        reply_timeout.as_millis() as u64,
                    ));
                }
                Ok(None) => return Err(Error::ConnectionClosed),
                Ok(Some(WorkerCommand::Reply {
                    sync_id: id,
                    values,
                })) if id == sync_id => return Ok(values),
                Ok(Some(other)) => {
                    trace!(slot = %self.slot, ?other, "Dropping stale message while awaiting reply");
                }
            }
        }
    }

    /// Polls the document until its running flag clears.
    ///
    /// Returns the engine's error text from the final poll (empty on
    /// success). The progress callback fires only when the integer
    /// percentage increases.
    async fn poll_until_done(
        &mut self,
        path: &Path,
        on_progress: &ProgressCallback,
    ) -> Result<String> {
        let mut last_percent: Option<u8> = None;

        loop {
            sleep(POLL_INTERVAL).await;

            let values = self
                .query(path, &[PROP_RUNNING, PROP_PROGRESS, PROP_ERROR], QUERY_TIMEOUT)
                .await?;
            let status = PollStatus::from_values(&values)?;

            let percent = status.percent();
            if last_percent.is_none_or(|p| percent > p) {
                on_progress(percent);
                last_percent = Some(percent);
            }

            if !status.running {
                return Ok(status.error);
            }
        }
    }
}

// ============================================================================
// PollStatus
// ============================================================================

/// Decoded reply to a status query.
#[derive(Debug, Clone, PartialEq)]
struct PollStatus {
    /// Whether the job is still running.
    running: bool,
    /// Fractional progress, 0.0–1.0.
    progress: f64,
    /// Error text; empty means no error.
    error: String,
}

impl PollStatus {
    /// Decodes the value list of a running/progress/error query reply.
    fn from_values(values: &[Arg]) -> Result<Self> {
        let running = values
            .first()
            .and_then(Arg::as_bool)
            .ok_or_else(|| Error::protocol("Status reply missing running flag"))?;
        let progress = values
            .get(1)
            .and_then(Arg::as_f64)
            .ok_or_else(|| Error::protocol("Status reply missing progress"))?;
        let error = values
            .get(2)
            .and_then(Arg::as_str)
            .ok_or_else(|| Error::protocol("Status reply missing error text"))?
            .to_string();

        Ok(Self {
            running,
            progress,
            error,
        })
    }

    /// Integer percentage, clamped to 0–100.
    fn percent(&self) -> u8 {
        (self.progress.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

// ============================================================================
// Tests
// ============================================================================
