//! Dispatcher actor: queue, slot pool, connection lifecycle, routing.
//!
//! The dispatcher is one tokio task consuming a command channel. All of its
//! state (the FIFO queue, the slot bindings, the path table, the pause
//! gate) is owned by that task alone; workers, the transport's inbound
//! callback, and the client facade reach it only through
//! [`DispatchCommand`] messages.
//!
//! # Routing
//!
//! Two correlation keys are in play, mirroring the wire contract:
//!
//! - Query replies carry a sync id whose high bits name the owning slot.
//! - Open notifications carry the document path; the dispatcher keeps a
//!   path→slot table populated at assignment time.
//!
//! Messages that match neither table are dropped; the owning worker times
//! out on its own schedule.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::identifiers::SlotId;
use crate::protocol::{EngineMessage, Inbound};
use crate::transport::Transport;

use super::job::{DoneCallback, Job};
use super::worker::{Worker, WorkerCommand};

// ============================================================================
// Constants
// ============================================================================

/// Fixed delay before the first connect attempt, giving the engine time to
/// finish its own boot sequence.
const STARTUP_DELAY: Duration = Duration::from_secs(2);

/// Fixed backoff between connect attempts.
const CONNECT_BACKOFF: Duration = Duration::from_secs(1);

// ============================================================================
// Types
// ============================================================================

/// Callback resolving a connect attempt.
pub type ConnectCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// Commands consumed by the dispatcher task.
pub(crate) enum DispatchCommand {
    /// Begin a connection attempt with the given retry budget.
    Connect {
        /// Retry budget in wall-clock time.
        timeout: Duration,
        /// Resolved exactly once with the outcome.
        on_result: ConnectCallback,
    },

    /// Internal: the spawned retry loop concluded.
    ConnectFinished {
        /// Whether the transport connected.
        success: bool,
        /// The caller's callback, resolved after state is finalized.
        on_result: ConnectCallback,
    },

    /// Enqueue a job.
    Submit(Job),

    /// Gate slot assignment.
    Pause,

    /// Reopen the gate and drain the queue.
    Resume,

    /// Raw inbound message handed off from the transport's task.
    Inbound(EngineMessage),

    /// A worker finished its bound job.
    JobFinished {
        /// The reporting slot.
        slot: SlotId,
        /// Final outcome.
        success: bool,
    },

    /// A worker observed the connection drop mid-operation.
    ConnectionLost,

    /// Toggle wire-level diagnostic dumping.
    SetDiagnostics(bool),

    /// Report the current connection state.
    QueryState(oneshot::Sender<ConnectionState>),

    /// Tear down: fail everything pending and stop the task.
    Shutdown,
}

impl std::fmt::Debug for DispatchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect { timeout, .. } => {
                f.debug_struct("Connect").field("timeout", timeout).finish()
            }
            Self::ConnectFinished { success, .. } => f
                .debug_struct("ConnectFinished")
                .field("success", success)
                .finish(),
            Self::Submit(job) => f.debug_tuple("Submit").field(job).finish(),
            Self::Pause => f.write_str("Pause"),
            Self::Resume => f.write_str("Resume"),
            Self::Inbound(msg) => f.debug_tuple("Inbound").field(&msg.command).finish(),
            Self::JobFinished { slot, success } => f
                .debug_struct("JobFinished")
                .field("slot", slot)
                .field("success", success)
                .finish(),
            Self::ConnectionLost => f.write_str("ConnectionLost"),
            Self::SetDiagnostics(enabled) => {
                f.debug_tuple("SetDiagnostics").field(enabled).finish()
            }
            Self::QueryState(_) => f.write_str("QueryState"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of the engine connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; `connect` is allowed.
    Disconnected,
    /// A connect retry loop is in flight; further `connect` calls are
    /// rejected locally.
    Connecting,
    /// Connected, pool allocated, accepting jobs.
    Ready,
    /// The connection dropped mid-operation; `connect` is allowed and
    /// re-allocates the pool.
    Failed,
}

// ============================================================================
// Slot / Binding
// ============================================================================

/// One worker slot in the pool.
struct Slot {
    /// Slot identity, packed into the worker's sync ids.
    id: SlotId,
    /// Channel to the worker task.
    tx: mpsc::UnboundedSender<WorkerCommand>,
    /// The currently bound job, if any.
    binding: Option<Binding>,
}

/// Dispatcher-side record of a job bound to a slot.
///
/// The worker holds the progress callback; the dispatcher holds the
/// completion callback so it fires exactly once from a single place.
struct Binding {
    /// Job name, for logging.
    name: String,
    /// Spool file path; the open notification is keyed by this.
    path: PathBuf,
    /// Completion callback.
    on_done: DoneCallback,
}

// ============================================================================
// DispatcherHandle
// ============================================================================

/// Cheap handle for sending commands to a running dispatcher.
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::UnboundedSender<DispatchCommand>,
}

impl DispatcherHandle {
    /// Sends a command; returns it back if the dispatcher has stopped.
    pub(crate) fn send(
        &self,
        command: DispatchCommand,
    ) -> Result<(), mpsc::error::SendError<DispatchCommand>> {
        self.tx.send(command)
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// The dispatch actor.
///
/// Owns the queue, the slot pool, the pause gate, and the connection
/// lifecycle. Runs until a [`DispatchCommand::Shutdown`] arrives or every
/// handle is dropped.
pub struct Dispatcher {
    /// Shared engine connection.
    transport: Arc<dyn Transport>,
    /// Fixed pool size for the connection's lifetime (1–255).
    pool_size: u8,
    /// Self-sender, cloned into workers and the inbound handler.
    cmd_tx: mpsc::UnboundedSender<DispatchCommand>,
    /// Command inbox.
    cmd_rx: mpsc::UnboundedReceiver<DispatchCommand>,
    /// Connection lifecycle state.
    state: ConnectionState,
    /// Slot assignment gate.
    paused: bool,
    /// FIFO job queue; only ever holds single jobs, never chains.
    queue: VecDeque<Job>,
    /// Worker pool; empty unless `Ready`.
    slots: Vec<Slot>,
    /// Path-keyed routing table for open notifications.
    path_table: FxHashMap<PathBuf, SlotId>,
    /// Spool directory for serialized descriptors; lives while connected.
    spool: Option<TempDir>,
}

impl Dispatcher {
    /// Spawns the dispatcher task.
    ///
    /// `pool_size` must be 1–255; the client builder validates it.
    #[must_use]
    pub fn spawn(transport: Arc<dyn Transport>, pool_size: u8) -> DispatcherHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = DispatcherHandle {
            tx: cmd_tx.clone(),
        };

        let dispatcher = Self {
            transport,
            pool_size: pool_size.max(1),
            cmd_tx,
            cmd_rx,
            state: ConnectionState::Disconnected,
            paused: false,
            queue: VecDeque::new(),
            slots: Vec::new(),
            path_table: FxHashMap::default(),
            spool: None,
        };

        tokio::spawn(dispatcher.run());
        handle
    }

    /// Command loop.
    async fn run(mut self) {
        debug!(pool_size = self.pool_size, "Dispatcher started");

        while let Some(command) = self.cmd_rx.recv().await {
            match command {
                DispatchCommand::Connect { timeout, on_result } => {
                    self.handle_connect(timeout, on_result);
                }
                DispatchCommand::ConnectFinished { success, on_result } => {
                    self.handle_connect_finished(success, on_result).await;
                }
                DispatchCommand::Submit(job) => self.handle_submit(job),
                DispatchCommand::Pause => {
                    debug!("Slot assignment paused");
                    self.paused = true;
                }
                DispatchCommand::Resume => {
                    debug!("Slot assignment resumed");
                    self.paused = false;
                    self.assign_slots();
                }
                DispatchCommand::Inbound(message) => self.handle_inbound(message),
                DispatchCommand::JobFinished { slot, success } => {
                    self.handle_job_finished(slot, success);
                }
                DispatchCommand::ConnectionLost => {
                    if self.state == ConnectionState::Ready {
                        warn!("Engine connection lost");
                        self.state = ConnectionState::Failed;
                    }
                }
                DispatchCommand::SetDiagnostics(enabled) => {
                    self.transport.set_diagnostic_dump(enabled);
                }
                DispatchCommand::QueryState(reply) => {
                    let _ = reply.send(self.state);
                }
                DispatchCommand::Shutdown => {
                    debug!("Shutdown command received");
                    break;
                }
            }
        }

        self.teardown().await;
        debug!("Dispatcher stopped");
    }
}

// ============================================================================
// Dispatcher - Connection Lifecycle
// ============================================================================

impl Dispatcher {
    /// Starts a connect retry loop, unless one is running or we are ready.
    fn handle_connect(&mut self, timeout: Duration, on_result: ConnectCallback) {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Ready => {
                warn!(state = ?self.state, "Connect rejected: {}", Error::AlreadyConnected);
                on_result(false);
            }
            ConnectionState::Disconnected | ConnectionState::Failed => {
                // A failed connection leaves a stale pool behind.
                self.release_pool();

                self.state = ConnectionState::Connecting;
                info!(timeout_secs = timeout.as_secs(), "Connecting to engine");

                let transport = Arc::clone(&self.transport);
                let tx = self.cmd_tx.clone();
                tokio::spawn(async move {
                    let success = connect_with_retry(transport.as_ref(), timeout).await;
                    let _ = tx.send(DispatchCommand::ConnectFinished { success, on_result });
                });
            }
        }
    }

    /// Finalizes state after the retry loop, then resolves the callback.
    ///
    /// Ordering matters: the pool must exist before the callback runs so a
    /// submit from inside the callback finds a ready dispatcher.
    async fn handle_connect_finished(&mut self, success: bool, on_result: ConnectCallback) {
        if self.state != ConnectionState::Connecting {
            // Shutdown raced the retry loop.
            debug!(state = ?self.state, "Stale connect result");
            on_result(false);
            return;
        }

        if !success {
            self.state = ConnectionState::Disconnected;
            on_result(false);
            return;
        }

        let spool = match TempDir::new() {
            Ok(dir) => dir,
            Err(e) => {
                warn!(error = %e, "Failed to create spool directory");
                self.transport.disconnect().await;
                self.state = ConnectionState::Disconnected;
                on_result(false);
                return;
            }
        };

        self.slots = (0..self.pool_size)
            .filter_map(SlotId::new)
            .map(|id| Slot {
                id,
                tx: Worker::spawn(id, Arc::clone(&self.transport), self.cmd_tx.clone()),
                binding: None,
            })
            .collect();

        let tx = self.cmd_tx.clone();
        self.transport.set_inbound_handler(Box::new(move |message| {
            let _ = tx.send(DispatchCommand::Inbound(message));
        }));

        self.spool = Some(spool);
        self.state = ConnectionState::Ready;
        info!(pool_size = self.slots.len(), "Engine connection ready");

        on_result(true);
        self.assign_slots();
    }

    /// Fails any in-flight bindings and drops the worker pool.
    ///
    /// Workers exit once their command senders are dropped. Queued jobs
    /// survive a reconnect; bound ones do not.
    fn release_pool(&mut self) {
        for slot in &mut self.slots {
            if let Some(binding) = slot.binding.take() {
                warn!(slot = %slot.id, job = %binding.name, "Failing job bound to released slot");
                let _ = std::fs::remove_file(&binding.path);
                (binding.on_done)(false);
            }
        }

        self.slots.clear();
        self.path_table.clear();
        self.spool = None;
    }

    /// Final teardown when the task stops.
    async fn teardown(&mut self) {
        self.release_pool();

        for job in self.queue.drain(..) {
            (job.on_done)(false);
        }

        self.transport.disconnect().await;
        self.state = ConnectionState::Disconnected;
    }
}

// ============================================================================
// Dispatcher - Queue and Slot Assignment
// ============================================================================

impl Dispatcher {
    /// Enqueues a job if the connection is ready.
    fn handle_submit(&mut self, job: Job) {
        if self.state != ConnectionState::Ready {
            warn!(job = %job.name, state = ?self.state, "Submit before connection is ready");
            (job.on_done)(false);
            return;
        }

        debug!(job = %job.name, queued = self.queue.len() + 1, "Job submitted");
        self.queue.push_back(job);
        self.assign_slots();
    }

    /// Drains the queue against idle slots while the gate is open.
    ///
    /// Queued jobs stay queued across a `Failed` connection; they only run
    /// against a ready pool.
    fn assign_slots(&mut self) {
        if self.state != ConnectionState::Ready {
            return;
        }

        while !self.paused && !self.queue.is_empty() {
            let Some(idx) = self.slots.iter().position(|s| s.binding.is_none()) else {
                break;
            };
            let Some(job) = self.queue.pop_front() else {
                break;
            };
            self.assign(idx, job);
        }
    }

    /// Binds one job to an idle slot and forwards the open request.
    ///
    /// Descriptor serialization failures resolve the job locally; the
    /// dispatcher and the slot stay serviceable.
    fn assign(&mut self, idx: usize, job: Job) {
        let Some(spool) = self.spool.as_ref() else {
            warn!(job = %job.name, "No spool directory while ready");
            (job.on_done)(false);
            return;
        };

        let path = spool
            .path()
            .join(format!("{}-{}.job", spool_stem(&job.name), Uuid::new_v4()));

        if let Err(e) = job.descriptor.serialize_to(&path) {
            warn!(job = %job.name, path = %path.display(), error = %e, "Descriptor serialization failed");
            (job.on_done)(false);
            return;
        }

        let Job {
            name,
            on_progress,
            on_done,
            ..
        } = job;

        let slot = &mut self.slots[idx];
        let open = WorkerCommand::Open {
            path: path.clone(),
            name: name.clone(),
            on_progress,
        };

        if slot.tx.send(open).is_err() {
            warn!(slot = %slot.id, job = %name, "Worker task is gone");
            let _ = std::fs::remove_file(&path);
            on_done(false);
            return;
        }

        debug!(slot = %slot.id, job = %name, path = %path.display(), "Job bound to slot");
        self.path_table.insert(path.clone(), slot.id);
        slot.binding = Some(Binding {
            name,
            path,
            on_done,
        });
    }

    /// Releases a slot and resolves its job's completion callback.
    fn handle_job_finished(&mut self, slot_id: SlotId, success: bool) {
        let Some(slot) = self.slots.get_mut(slot_id.index() as usize) else {
            debug!(slot = %slot_id, "Completion report for unknown slot");
            return;
        };

        let Some(binding) = slot.binding.take() else {
            debug!(slot = %slot_id, "Completion report for idle slot");
            return;
        };

        self.path_table.remove(&binding.path);
        let _ = std::fs::remove_file(&binding.path);

        info!(slot = %slot_id, job = %binding.name, success, "Job finished");
        (binding.on_done)(success);

        self.assign_slots();
    }
}

// ============================================================================
// Dispatcher - Inbound Routing
// ============================================================================

impl Dispatcher {
    /// Routes one inbound message to its owning worker.
    fn handle_inbound(&mut self, message: EngineMessage) {
        let Some(inbound) = Inbound::classify(message) else {
            trace!("Dropping unroutable inbound message");
            return;
        };

        match inbound {
            Inbound::OpenSucceeded { path, handle } => {
                self.route_open(path, |_| WorkerCommand::Opened {
                    handle: handle.clone(),
                });
            }
            Inbound::OpenFailed { path } => {
                self.route_open(path, |_| WorkerCommand::OpenFailed);
            }
            Inbound::QueryReply { sync_id, values } => {
                let Some(slot_id) = sync_id.slot() else {
                    debug!(sync_id = %sync_id, "Reply with invalid slot tag");
                    return;
                };
                let Some(slot) = self.slots.get(slot_id.index() as usize) else {
                    debug!(sync_id = %sync_id, "Reply for unknown slot");
                    return;
                };

                let _ = slot.tx.send(WorkerCommand::Reply { sync_id, values });
            }
        }
    }

    /// Forwards an open notification via the path table.
    ///
    /// Unmatched paths are dropped silently; the owning worker times out.
    fn route_open(&self, path: PathBuf, make: impl Fn(SlotId) -> WorkerCommand) {
        let Some(&slot_id) = self.path_table.get(&path) else {
            trace!(path = %path.display(), "Open notification for unbound document");
            return;
        };

        if let Some(slot) = self.slots.get(slot_id.index() as usize) {
            let _ = slot.tx.send(make(slot_id));
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Connect retry loop: fixed startup delay, then attempts with a fixed
/// backoff until the budget is spent.
async fn connect_with_retry(transport: &dyn Transport, timeout: Duration) -> bool {
    sleep(STARTUP_DELAY).await;
    let deadline = Instant::now() + timeout;

    loop {
        match transport.connect().await {
            Ok(()) => return true,
            Err(e) => debug!(error = %e, "Connect attempt failed"),
        }

        if Instant::now() >= deadline {
            warn!(timeout_secs = timeout.as_secs(), "Connect retry budget exhausted");
            return false;
        }

        sleep(CONNECT_BACKOFF).await;
    }
}

/// Reduces a job name to a safe spool file stem.
fn spool_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}


// ============================================================================
// Tests
// ============================================================================
