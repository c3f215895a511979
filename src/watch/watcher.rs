//! # Configuration watcher: debounced reload loop.
//!
//! ```text
//!            signal                 debounce elapsed
//!   Armed ───────────► Debouncing ─────────────────► Reconciling
//!     ▲                                                   │
//!     └──── drain stale signals, re-arm (recreate watch) ─┘
//!
//!   dispose() / drop ──► Disposed (terminal)
//! ```
//!
//! ## Rules
//! - Signals are only raised while `Armed` and enabled; file changes seen
//!   during `Debouncing`/`Reconciling` are ignored.
//! - A file watch that stops by itself (path no longer reachable) counts as a
//!   change; the reload that follows recreates it when re-arming.
//! - A failed reload (I/O, parse, invalid document, panic) is reported as
//!   `ConfigurationFault`; the previous configuration stays in effect.
//! - Per-sink definition errors do not fail the reload (see
//!   [`Pipeline::apply_loaded`]).

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::poll::FileWatch;
use crate::core::Pipeline;
use crate::error::LoadError;
use crate::events::{Event, EventKind};
use crate::loader::ConfigurationLoader;
use crate::publisher::panic_message;

/// Lifecycle state of a [`ConfigurationWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WatcherState {
    /// Waiting for a change signal.
    Armed = 0,
    /// A change was seen; waiting for the file to settle.
    Debouncing = 1,
    /// Loading and applying the candidate configuration.
    Reconciling = 2,
    /// Stopped for good.
    Disposed = 3,
}

impl WatcherState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WatcherState::Armed,
            1 => WatcherState::Debouncing,
            2 => WatcherState::Reconciling,
            _ => WatcherState::Disposed,
        }
    }
}

struct Shared {
    state: AtomicU8,
    enabled: AtomicBool,
    /// Open while `Armed` and enabled.
    gate: Arc<AtomicBool>,
    reloads: AtomicU64,
    faults: AtomicU64,
}

impl Shared {
    fn state(&self) -> WatcherState {
        WatcherState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves to `next` unless disposed.
    fn enter(&self, next: WatcherState) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur != WatcherState::Disposed as u8).then_some(next as u8)
            });
        self.regate();
    }

    fn regate(&self) {
        let open = self.state() == WatcherState::Armed && self.enabled.load(Ordering::Acquire);
        self.gate.store(open, Ordering::Release);
    }
}

/// Watches a configuration file and applies every change to a [`Pipeline`].
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use tracevisor::{
///     ConfigurationWatcher, JsonConfigurationLoader, Pipeline, PipelineConfig, SinkRegistry,
/// };
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let pipeline = Pipeline::builder(PipelineConfig::default()).build()?;
/// let loader = Arc::new(JsonConfigurationLoader::new(SinkRegistry::new()));
///
/// let watcher = ConfigurationWatcher::start(pipeline.clone(), loader, "tracevisor.json").await?;
/// // ... edit the file; sinks are reconciled in place ...
/// watcher.dispose();
/// pipeline.shutdown().await?;
/// # Ok(()) }
/// ```
pub struct ConfigurationWatcher {
    shared: Arc<Shared>,
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConfigurationWatcher {
    /// Loads and applies `path`, then starts watching it.
    ///
    /// Fails if the initial document cannot be read, parsed or validated.
    pub async fn start(
        pipeline: Arc<Pipeline>,
        loader: Arc<dyn ConfigurationLoader>,
        path: impl Into<PathBuf>,
    ) -> Result<Self, LoadError> {
        let path = path.into();
        apply(&pipeline, loader.as_ref(), &path).await?;

        let shared = Arc::new(Shared {
            state: AtomicU8::new(WatcherState::Armed as u8),
            enabled: AtomicBool::new(true),
            gate: Arc::new(AtomicBool::new(true)),
            reloads: AtomicU64::new(0),
            faults: AtomicU64::new(0),
        });
        let token = CancellationToken::new();

        let task = tokio::spawn(
            Reloader {
                shared: Arc::clone(&shared),
                pipeline,
                loader,
                path,
                token: token.clone(),
            }
            .run(),
        );

        Ok(Self {
            shared,
            token,
            task: Mutex::new(Some(task)),
        })
    }

    /// Current state.
    pub fn state(&self) -> WatcherState {
        self.shared.state()
    }

    /// Enables or disables change detection without tearing down the watch.
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::Release);
        self.shared.regate();
    }

    /// Returns true if change detection is enabled.
    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// Number of successful reloads since start.
    pub fn reloads(&self) -> u64 {
        self.shared.reloads.load(Ordering::Acquire)
    }

    /// Number of failed reloads since start.
    pub fn faults(&self) -> u64 {
        self.shared.faults.load(Ordering::Acquire)
    }

    /// Stops watching. Idempotent.
    pub fn dispose(&self) {
        self.shared
            .state
            .store(WatcherState::Disposed as u8, Ordering::Release);
        self.shared.regate();
        self.token.cancel();
    }

    /// Stops watching and waits for an in-flight reload to finish.
    pub async fn stop(&self) {
        self.dispose();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for ConfigurationWatcher {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Background half of the watcher.
struct Reloader {
    shared: Arc<Shared>,
    pipeline: Arc<Pipeline>,
    loader: Arc<dyn ConfigurationLoader>,
    path: PathBuf,
    token: CancellationToken,
}

impl Reloader {
    async fn run(self) {
        let (tx, mut rx) = mpsc::channel(1);
        let mut watch = self.watch(tx.clone());

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = rx.recv() => {}
                _ = watch.stopped() => {
                    tracing::debug!(path = %self.path.display(), "file watch lost; reloading");
                }
            }

            self.shared.enter(WatcherState::Debouncing);
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = time::sleep(self.pipeline.config().debounce) => {}
            }

            self.shared.enter(WatcherState::Reconciling);
            self.reload().await;

            while rx.try_recv().is_ok() {}
            if !watch.is_alive() {
                tracing::debug!(path = %self.path.display(), "recreating file watch");
                watch = self.watch(tx.clone());
            }
            self.shared.enter(WatcherState::Armed);
        }

        watch.close();
    }

    fn watch(&self, tx: mpsc::Sender<()>) -> FileWatch {
        FileWatch::spawn(
            self.path.clone(),
            self.pipeline.config().poll_interval,
            Arc::clone(&self.shared.gate),
            tx,
        )
    }

    async fn reload(&self) {
        let attempt = std::panic::AssertUnwindSafe(apply(
            &self.pipeline,
            self.loader.as_ref(),
            &self.path,
        ))
        .catch_unwind()
        .await;

        let reason = match attempt {
            Ok(Ok(())) => {
                self.shared.reloads.fetch_add(1, Ordering::AcqRel);
                return;
            }
            Ok(Err(err)) => err.to_string(),
            Err(payload) => format!("reload panicked: {}", panic_message(&*payload)),
        };

        self.shared.faults.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(path = %self.path.display(), %reason, "reload failed");
        self.pipeline
            .bus()
            .publish(Event::new(EventKind::ConfigurationFault).with_reason(reason));
    }
}

/// Loads `path` and applies it to `pipeline`.
async fn apply(
    pipeline: &Pipeline,
    loader: &dyn ConfigurationLoader,
    path: &std::path::Path,
) -> Result<(), LoadError> {
    let loaded = loader.load(path).await?;
    pipeline
        .apply_loaded(loaded)
        .await
        .map(drop)
        .map_err(|errors| LoadError::Invalid {
            path: path.to_path_buf(),
            errors,
        })
}
