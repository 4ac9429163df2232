//! Caller-facing client facade.
//!
//! [`Client`] wraps the dispatcher behind a small submission API: connect
//! with a retry budget, submit single jobs or chains, pause and resume
//! scheduling, toggle wire diagnostics. Configuration goes through
//! [`ClientBuilder`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use render_dispatch::{Client, JobDescriptor};
//! # use render_dispatch::Result;
//! # struct Silence;
//! # impl JobDescriptor for Silence {
//! #     fn serialize_to(&self, _path: &std::path::Path) -> Result<()> { Ok(()) }
//! # }
//!
//! # async fn run() -> Result<()> {
//! let client = Client::builder()
//!     .address("ws://127.0.0.1:8090")
//!     .pool_size(4)
//!     .build()?;
//!
//! client.connect(Duration::from_secs(30)).await?;
//! client.submit(
//!     "silence",
//!     Box::new(Silence),
//!     Arc::new(|pct| println!("{pct}%")),
//!     Box::new(|ok| println!("done: {ok}")),
//! );
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::dispatch::dispatcher::DispatchCommand;
use crate::dispatch::{
    ConnectionState, Dispatcher, DispatcherHandle, DoneCallback, Job, JobDescriptor,
    ProgressCallback,
};
use crate::error::{Error, Result};
use crate::transport::{Transport, WsTransport};

// ============================================================================
// Constants
// ============================================================================

/// Default engine endpoint.
pub const DEFAULT_ADDRESS: &str = "ws://127.0.0.1:8090";

/// Default worker pool size.
pub const DEFAULT_POOL_SIZE: u8 = 1;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for [`Client`].
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    /// Engine endpoint, `ws://` or `wss://`.
    address: String,
    /// Worker pool size, 1–255.
    pool_size: u8,
    /// Dump wire frames to the log from the start.
    diagnostic_dump: bool,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    /// Creates a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            diagnostic_dump: false,
        }
    }

    /// Sets the engine endpoint address.
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Sets the worker pool size (1–255).
    ///
    /// The pool size caps how many jobs run concurrently over the shared
    /// connection; it is fixed for the client's lifetime.
    #[must_use]
    pub fn pool_size(mut self, size: u8) -> Self {
        self.pool_size = size;
        self
    }

    /// Enables wire-frame dumping from the first connect.
    #[must_use]
    pub fn diagnostic_dump(mut self, enabled: bool) -> Self {
        self.diagnostic_dump = enabled;
        self
    }

    /// Builds the client and starts its dispatcher task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the pool size is zero or the address is
    /// not a valid `ws://`/`wss://` URL.
    pub fn build(self) -> Result<Client> {
        if self.pool_size == 0 {
            return Err(Error::config("Pool size must be between 1 and 255"));
        }

        let transport = WsTransport::new(&self.address)?;
        if self.diagnostic_dump {
            transport.set_diagnostic_dump(true);
        }

        debug!(
            address = %self.address,
            pool_size = self.pool_size,
            "Client configured"
        );

        let handle = Dispatcher::spawn(Arc::new(transport), self.pool_size);
        Ok(Client { handle })
    }
}

// ============================================================================
// Client
// ============================================================================

/// Handle to a running dispatch client.
///
/// All submission methods resolve through the job's callbacks; the only
/// synchronous failures are configuration errors at build time.
pub struct Client {
    /// Channel to the dispatcher task.
    handle: DispatcherHandle,
}

impl Client {
    /// Returns a builder with default configuration.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Connects to the engine, retrying within the given budget.
    ///
    /// A fixed startup delay precedes the first attempt; further attempts
    /// follow with a fixed backoff until the budget is spent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyConnected`] if a connection exists or is in
    /// progress, [`Error::ConnectTimeout`] if the budget runs out, and
    /// [`Error::ConnectionClosed`] if the client has been shut down.
    pub async fn connect(&self, timeout: Duration) -> Result<()> {
        if matches!(
            self.state().await,
            ConnectionState::Connecting | ConnectionState::Ready
        ) {
            return Err(Error::AlreadyConnected);
        }

        let (tx, rx) = oneshot::channel();
        self.handle
            .send(DispatchCommand::Connect {
                timeout,
                on_result: Box::new(move |ok| {
                    let _ = tx.send(ok);
                }),
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match rx.await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::connect_timeout(timeout.as_secs())),
            Err(_) => Err(Error::ConnectionClosed),
        }
    }

    /// Submits one job.
    ///
    /// The job resolves through `on_done` exactly once: `true` after the
    /// engine runs it to completion without error, `false` on any failure,
    /// including submission before the connection is ready.
    pub fn submit(
        &self,
        name: impl Into<String>,
        descriptor: Box<dyn JobDescriptor>,
        on_progress: ProgressCallback,
        on_done: DoneCallback,
    ) {
        send_job(
            &self.handle,
            Job::new(name, descriptor, on_progress, on_done),
        );
    }

    /// Submits a chain of jobs sharing one name and progress callback.
    ///
    /// Links run strictly in order. `on_done` fires exactly once for the
    /// whole chain: `true` after the last link succeeds, `false` as soon as
    /// any link fails; later links are then never submitted. An empty chain
    /// resolves `true` immediately.
    ///
    /// Only single jobs ever reach the queue; chaining is a continuation in
    /// each link's completion callback.
    pub fn submit_chain(
        &self,
        name: impl Into<String>,
        descriptors: Vec<Box<dyn JobDescriptor>>,
        on_progress: ProgressCallback,
        on_done: DoneCallback,
    ) {
        let mut rest: VecDeque<_> = descriptors.into();
        let Some(first) = rest.pop_front() else {
            on_done(true);
            return;
        };

        let job = chain_link(self.handle.clone(), name.into(), 1, first, rest, on_progress, on_done);
        send_job(&self.handle, job);
    }

    /// Pauses slot assignment; running jobs continue, queued jobs wait.
    pub fn pause(&self) {
        let _ = self.handle.send(DispatchCommand::Pause);
    }

    /// Resumes slot assignment and drains the queue.
    pub fn resume(&self) {
        let _ = self.handle.send(DispatchCommand::Resume);
    }

    /// Toggles wire-frame dumping at runtime.
    pub fn set_diagnostics(&self, enabled: bool) {
        let _ = self.handle.send(DispatchCommand::SetDiagnostics(enabled));
    }

    /// Returns the current connection state.
    pub async fn state(&self) -> ConnectionState {
        let (tx, rx) = oneshot::channel();
        if self.handle.send(DispatchCommand::QueryState(tx)).is_err() {
            return ConnectionState::Disconnected;
        }
        rx.await.unwrap_or(ConnectionState::Disconnected)
    }

    /// Shuts the client down.
    ///
    /// Queued and in-flight jobs resolve `false`; the connection closes.
    pub fn shutdown(&self) {
        let _ = self.handle.send(DispatchCommand::Shutdown);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Hands a job to the dispatcher, resolving it locally if the task is gone.
fn send_job(handle: &DispatcherHandle, job: Job) {
    if let Err(err) = handle.send(DispatchCommand::Submit(job)) {
        if let DispatchCommand::Submit(job) = err.0 {
            warn!(job = %job.name, "Dispatcher stopped; failing job locally");
            (job.on_done)(false);
        }
    }
}

/// Builds one chain link whose completion continues or short-circuits.
fn chain_link(
    handle: DispatcherHandle,
    name: String,
    index: usize,
    descriptor: Box<dyn JobDescriptor>,
    mut rest: VecDeque<Box<dyn JobDescriptor>>,
    on_progress: ProgressCallback,
    on_chain_done: DoneCallback,
) -> Job {
    let link_name = format!("{name}-{index}");
    let next_progress = Arc::clone(&on_progress);

    let continuation: DoneCallback = Box::new(move |success| {
        if !success {
            on_chain_done(false);
            return;
        }

        let Some(next) = rest.pop_front() else {
            on_chain_done(true);
            return;
        };

        let job = chain_link(
            handle.clone(),
            name,
            index + 1,
            next,
            rest,
            next_progress,
            on_chain_done,
        );
        send_job(&handle, job);
    });

    Job::new(link_name, descriptor, on_progress, continuation)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    use crate::dispatch::testkit::{
        JobScript, MockTransport, Observed, TestDescriptor, spawn_engine, start, wait_until,
    };
    use crate::protocol::message::CMD_OPEN;

    fn client(mock: &Arc<MockTransport>, pool_size: u8) -> Client {
        Client {
            handle: start(mock, pool_size),
        }
    }

    fn descriptors(count: usize) -> Vec<Box<dyn JobDescriptor>> {
        (0..count)
            .map(|_| Box::new(TestDescriptor { fail: false }) as Box<dyn JobDescriptor>)
            .collect()
    }

    fn chain_callbacks(observed: &Arc<Observed>) -> (ProgressCallback, DoneCallback) {
        let progress = Arc::clone(observed);
        let done = Arc::clone(observed);
        (
            Arc::new(move |pct| progress.progress.lock().push(pct)),
            Box::new(move |ok| done.results.lock().push(ok)),
        )
    }

    // ========================================================================
    // Builder tests
    // ========================================================================

    #[tokio::test]
    async fn test_builder_defaults() {
        let client = Client::builder().build().expect("default config is valid");
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_builder_rejects_zero_pool() {
        let result = Client::builder().pool_size(0).build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_builder_rejects_bad_address() {
        let result = Client::builder().address("http://nope").build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    // ========================================================================
    // Connect tests
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_connect_then_already_connected() {
        let mock = MockTransport::new();
        let client = client(&mock, 1);

        client.connect(Duration::from_secs(5)).await.expect("connects");
        assert_eq!(client.state().await, ConnectionState::Ready);

        let second = client.connect(Duration::from_secs(5)).await;
        assert!(matches!(second, Err(Error::AlreadyConnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_budget_exhausted() {
        let mock = MockTransport::failing(usize::MAX);
        let client = client(&mock, 1);

        let result = client.connect(Duration::from_secs(3)).await;
        assert!(matches!(result, Err(Error::ConnectTimeout { .. })));
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    // ========================================================================
    // Submission tests
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_submit_resolves_via_callback() {
        let mock = MockTransport::new();
        spawn_engine(&mock, vec![JobScript::clean(&[0.5, 1.0])]);
        let client = client(&mock, 1);
        let observed = Arc::new(Observed::default());
        let (on_progress, on_done) = chain_callbacks(&observed);

        client.connect(Duration::from_secs(5)).await.expect("connects");
        client.submit(
            "encode",
            Box::new(TestDescriptor { fail: false }),
            on_progress,
            on_done,
        );

        wait_until(|| !observed.results.lock().is_empty()).await;
        assert_eq!(*observed.results.lock(), vec![true]);
        assert_eq!(*observed.progress.lock(), vec![50, 100]);
    }

    // ========================================================================
    // Chain tests
    // ========================================================================

    #[tokio::test]
    async fn test_empty_chain_resolves_immediately() {
        let mock = MockTransport::new();
        let client = client(&mock, 1);
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);

        client.submit_chain(
            "noop",
            Vec::new(),
            Arc::new(|_| {}),
            Box::new(move |ok| sink.lock().push(ok)),
        );

        assert_eq!(*results.lock(), vec![true]);
        assert_eq!(mock.count_sent(CMD_OPEN), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chain_success_runs_every_link() {
        let mock = MockTransport::new();
        spawn_engine(&mock, vec![JobScript::clean(&[1.0])]);
        let client = client(&mock, 1);
        let observed = Arc::new(Observed::default());
        let (on_progress, on_done) = chain_callbacks(&observed);

        client.connect(Duration::from_secs(5)).await.expect("connects");
        client.submit_chain("batch", descriptors(3), on_progress, on_done);

        wait_until(|| !observed.results.lock().is_empty()).await;

        // One result for the whole chain, all three links dispatched.
        assert_eq!(*observed.results.lock(), vec![true]);
        assert_eq!(mock.count_sent(CMD_OPEN), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chain_short_circuits_on_failure() {
        let mock = MockTransport::new();
        spawn_engine(
            &mock,
            vec![
                JobScript::clean(&[1.0]),
                JobScript::failing_remote("render failed"),
                JobScript::clean(&[1.0]),
            ],
        );
        let client = client(&mock, 1);
        let observed = Arc::new(Observed::default());
        let (on_progress, on_done) = chain_callbacks(&observed);

        client.connect(Duration::from_secs(5)).await.expect("connects");
        client.submit_chain("batch", descriptors(3), on_progress, on_done);

        wait_until(|| !observed.results.lock().is_empty()).await;

        // Exactly one false for the chain; the third link never opened.
        assert_eq!(*observed.results.lock(), vec![false]);
        assert_eq!(mock.count_sent(CMD_OPEN), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chain_fails_on_serialization_error() {
        let mock = MockTransport::new();
        let client = client(&mock, 1);
        let observed = Arc::new(Observed::default());
        let (on_progress, on_done) = chain_callbacks(&observed);

        client.connect(Duration::from_secs(5)).await.expect("connects");
        client.submit_chain(
            "broken",
            vec![Box::new(TestDescriptor { fail: true }) as Box<dyn JobDescriptor>],
            on_progress,
            on_done,
        );

        wait_until(|| !observed.results.lock().is_empty()).await;
        assert_eq!(*observed.results.lock(), vec![false]);
        assert_eq!(mock.count_sent(CMD_OPEN), 0);
    }

    // ========================================================================
    // Pause / shutdown tests
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume_through_facade() {
        let mock = MockTransport::new();
        spawn_engine(&mock, vec![JobScript::clean(&[1.0])]);
        let client = client(&mock, 1);
        let observed = Arc::new(Observed::default());
        let (on_progress, on_done) = chain_callbacks(&observed);

        client.connect(Duration::from_secs(5)).await.expect("connects");
        client.pause();
        client.submit(
            "gated",
            Box::new(TestDescriptor { fail: false }),
            on_progress,
            on_done,
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(mock.count_sent(CMD_OPEN), 0);

        client.resume();
        wait_until(|| !observed.results.lock().is_empty()).await;
        assert_eq!(*observed.results.lock(), vec![true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_after_shutdown_resolves_false() {
        let mock = MockTransport::new();
        let client = client(&mock, 1);
        let observed = Arc::new(Observed::default());
        let (on_progress, on_done) = chain_callbacks(&observed);

        client.connect(Duration::from_secs(5)).await.expect("connects");
        client.shutdown();
        wait_until(|| {
            // The dispatcher task is gone once sends start failing.
            client.handle.send(DispatchCommand::Pause).is_err()
        })
        .await;

        client.submit(
            "late",
            Box::new(TestDescriptor { fail: false }),
            on_progress,
            on_done,
        );

        assert_eq!(*observed.results.lock(), vec![false]);
    }
}
