//! Shared test doubles: a recording transport and a scripted engine.

// ============================================================================
// Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;

use crate::error::{Error, Result};
use crate::protocol::message::{CMD_OPEN, CMD_OPEN_FAILED, CMD_OPENED, CMD_QUERY, CMD_REPLY};
use crate::protocol::{Arg, EngineMessage, PROP_VERSION};
use crate::transport::{InboundHandler, Transport};

use super::dispatcher::{DispatchCommand, Dispatcher, DispatcherHandle};
use super::job::{Job, JobDescriptor, ProgressCallback};

// ============================================================================
// MockTransport
// ============================================================================

/// Transport double: records sends, lets tests inject inbound frames.
pub(crate) struct MockTransport {
    /// Fail this many connect attempts before succeeding.
    pub(crate) fail_connects: AtomicUsize,
    /// Total connect attempts observed.
    pub(crate) connects: AtomicUsize,
    /// All messages sent by the dispatch side.
    sent: Mutex<Vec<EngineMessage>>,
    /// Copy of every sent message for the simulator.
    tap: Mutex<Option<mpsc::UnboundedSender<EngineMessage>>>,
    /// Installed inbound router.
    handler: Mutex<Option<InboundHandler>>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Self::failing(0)
    }

    pub(crate) fn failing(fail_connects: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_connects: AtomicUsize::new(fail_connects),
            connects: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            tap: Mutex::new(None),
            handler: Mutex::new(None),
        })
    }

    /// Returns a receiver observing every outbound message.
    pub(crate) fn tap(&self) -> mpsc::UnboundedReceiver<EngineMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.tap.lock() = Some(tx);
        rx
    }

    /// Injects an inbound frame through the installed handler.
    pub(crate) fn inject(&self, message: EngineMessage) {
        let guard = self.handler.lock();
        if let Some(ref handler) = *guard {
            handler(message);
        }
    }

    pub(crate) fn sent_commands(&self) -> Vec<String> {
        self.sent.lock().iter().map(|m| m.command.clone()).collect()
    }

    pub(crate) fn count_sent(&self, command: &str) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.command == command)
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<()> {
        let attempt = self.connects.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_connects.load(Ordering::SeqCst) {
            return Err(Error::connect("engine not up yet"));
        }
        Ok(())
    }

    async fn send(&self, message: EngineMessage) -> Result<()> {
        self.sent.lock().push(message.clone());
        if let Some(ref tap) = *self.tap.lock() {
            let _ = tap.send(message);
        }
        Ok(())
    }

    fn set_inbound_handler(&self, handler: InboundHandler) {
        *self.handler.lock() = Some(handler);
    }

    async fn disconnect(&self) {}

    fn set_diagnostic_dump(&self, _enabled: bool) {}
}

// ============================================================================
// Scripted engine simulator
// ============================================================================

#[derive(Clone, Copy)]
pub(crate) enum OpenBehavior {
    Succeed,
    Reject,
    Ignore,
}

/// Per-job behavior script, assigned to documents in open order.
#[derive(Clone)]
pub(crate) struct JobScript {
    pub(crate) open: OpenBehavior,
    pub(crate) answer_version: bool,
    /// (running, progress, error) per status poll; the last entry repeats
    /// if polled again. Empty means ignore status queries.
    pub(crate) statuses: Vec<(bool, f64, &'static str)>,
}

impl JobScript {
    /// Opens, handshakes, and completes cleanly at the given progress steps.
    pub(crate) fn clean(steps: &[f64]) -> Self {
        let mut statuses: Vec<_> = steps.iter().map(|p| (true, *p, "")).collect();
        let last = steps.last().copied().unwrap_or(1.0);
        statuses.push((false, last, ""));
        Self {
            open: OpenBehavior::Succeed,
            answer_version: true,
            statuses,
        }
    }

    pub(crate) fn failing_remote(error: &'static str) -> Self {
        Self {
            open: OpenBehavior::Succeed,
            answer_version: true,
            statuses: vec![(true, 0.1, ""), (false, 0.5, error)],
        }
    }
}

/// Replays scripts against the mock, reacting to each outbound message.
///
/// Reacts eagerly (no timers of its own) so replies land while the worker
/// is still runnable, keeping paused-clock tests deterministic.
pub(crate) fn spawn_engine(mock: &Arc<MockTransport>, scripts: Vec<JobScript>) {
    let mut tap = mock.tap();
    let mock = Arc::clone(mock);

    tokio::spawn(async move {
        let mut assigned = 0usize;
        let mut docs: FxHashMap<String, (JobScript, usize)> = FxHashMap::default();
        let mut next_handle = 0u32;

        while let Some(message) = tap.recv().await {
            match message.command.as_str() {
                CMD_OPEN => {
                    let path = message.args[0].as_str().unwrap().to_string();
                    let script = scripts[assigned.min(scripts.len() - 1)].clone();
                    assigned += 1;

                    match script.open {
                        OpenBehavior::Succeed => {
                            next_handle += 1;
                            let handle = format!("doc-{next_handle}");
                            docs.insert(path.clone(), (script, 0));
                            mock.inject(EngineMessage::new(
                                CMD_OPENED,
                                vec![Arg::Str(path), Arg::Str(handle)],
                            ));
                        }
                        OpenBehavior::Reject => {
                            mock.inject(EngineMessage::new(CMD_OPEN_FAILED, vec![Arg::Str(path)]));
                        }
                        OpenBehavior::Ignore => {}
                    }
                }

                CMD_QUERY => {
                    let path = message.args[0].as_str().unwrap().to_string();
                    let sync_id = message.args[1].as_i64().unwrap();
                    let Some((script, polls)) = docs.get_mut(&path) else {
                        continue;
                    };

                    let is_handshake = message.args[2..]
                        .iter()
                        .any(|a| a.as_str() == Some(PROP_VERSION));

                    if is_handshake {
                        if script.answer_version {
                            mock.inject(EngineMessage::new(
                                CMD_REPLY,
                                vec![Arg::Int(sync_id), Arg::Str("1.0".into())],
                            ));
                        }
                        continue;
                    }

                    if script.statuses.is_empty() {
                        continue;
                    }
                    let idx = (*polls).min(script.statuses.len() - 1);
                    let (running, progress, error) = script.statuses[idx];
                    *polls += 1;

                    mock.inject(EngineMessage::new(
                        CMD_REPLY,
                        vec![
                            Arg::Int(sync_id),
                            Arg::Bool(running),
                            Arg::Float(progress),
                            Arg::Str(error.into()),
                        ],
                    ));
                }

                _ => {}
            }
        }
    });
}

// ============================================================================
// Job helpers
// ============================================================================

pub(crate) struct TestDescriptor {
    pub(crate) fail: bool,
}

impl JobDescriptor for TestDescriptor {
    fn serialize_to(&self, path: &Path) -> Result<()> {
        if self.fail {
            return Err(Error::Io(std::io::Error::other("cannot serialize")));
        }
        std::fs::write(path, b"job = test\n")?;
        Ok(())
    }
}

/// Collected job outcomes: completion results plus progress values.
#[derive(Default)]
pub(crate) struct Observed {
    pub(crate) results: Mutex<Vec<bool>>,
    pub(crate) progress: Mutex<Vec<u8>>,
}

pub(crate) fn job(name: &str, observed: &Arc<Observed>) -> Job {
    job_with(name, false, observed)
}

pub(crate) fn job_with(name: &str, fail_serialize: bool, observed: &Arc<Observed>) -> Job {
    let done = Arc::clone(observed);
    let progress = Arc::clone(observed);

    Job::new(
        name,
        Box::new(TestDescriptor {
            fail: fail_serialize,
        }),
        Arc::new(move |pct| progress.progress.lock().push(pct)) as ProgressCallback,
        Box::new(move |ok| done.results.lock().push(ok)),
    )
}

// ============================================================================
// Dispatcher helpers
// ============================================================================

pub(crate) fn start(mock: &Arc<MockTransport>, pool_size: u8) -> DispatcherHandle {
    Dispatcher::spawn(Arc::clone(mock) as Arc<dyn Transport>, pool_size)
}

pub(crate) async fn connect(handle: &DispatcherHandle, timeout_secs: u64) -> bool {
    let (tx, rx) = oneshot::channel();
    handle
        .send(DispatchCommand::Connect {
            timeout: Duration::from_secs(timeout_secs),
            on_result: Box::new(move |ok| {
                let _ = tx.send(ok);
            }),
        })
        .expect("dispatcher alive");
    rx.await.expect("connect resolved")
}

/// Opt-in log output for debugging a failing scenario; honors `RUST_LOG`.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Waits until `ready` holds, advancing simulated time as needed.
pub(crate) async fn wait_until(ready: impl Fn() -> bool) {
    for _ in 0..600 {
        if ready() {
            return;
        }
        sleep(Duration::from_millis(100)).await;
    }
    panic!("condition not reached within simulated time budget");
}
