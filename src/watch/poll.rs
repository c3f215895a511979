//! Polling file-change signal source.
//!
//! Compares the `(modified, len)` stamp of a path every `interval`. A change
//! produces one signal while the gate is open; changes observed with the gate
//! closed are consumed silently.
//!
//! A missing file is a valid state. Any other stat failure (e.g. a parent
//! that is no longer a directory) repeated [`MAX_STAT_FAILURES`] times stops
//! the poller; the owner recreates it.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Observable identity of a file; `None` while it does not exist.
type Stamp = Option<(SystemTime, u64)>;

/// Consecutive failed stat calls after which the poller stops.
const MAX_STAT_FAILURES: u32 = 3;

async fn stamp(path: &Path) -> io::Result<Stamp> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(Some((meta.modified().unwrap_or(UNIX_EPOCH), meta.len()))),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Background poller bound to one path.
pub(crate) struct FileWatch {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl FileWatch {
    /// Starts polling `path`. Signals go to `tx` while `gate` is set.
    pub(crate) fn spawn(
        path: PathBuf,
        interval: Duration,
        gate: Arc<AtomicBool>,
        tx: mpsc::Sender<()>,
    ) -> Self {
        let token = CancellationToken::new();
        let stop = token.clone();
        let interval = interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut last = stamp(&path).await.ok().flatten();
            let mut failures = 0;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = time::sleep(interval) => {}
                }
                let current = match stamp(&path).await {
                    Ok(current) => {
                        failures = 0;
                        current
                    }
                    Err(err) => {
                        failures += 1;
                        if failures >= MAX_STAT_FAILURES {
                            tracing::debug!(path = %path.display(), error = %err, "file watch stopped");
                            break;
                        }
                        continue;
                    }
                };
                if current == last {
                    continue;
                }
                last = current;
                tracing::trace!(path = %path.display(), "configuration file changed");

                if gate.load(Ordering::Acquire) && tx.try_send(()).is_err() && tx.is_closed() {
                    break;
                }
            }
        });

        Self { token, handle }
    }

    /// Returns true while the poller is running.
    pub(crate) fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Resolves once the poller has stopped on its own or was closed.
    pub(crate) async fn stopped(&mut self) {
        if !self.handle.is_finished() {
            let _ = (&mut self.handle).await;
        }
    }

    /// Stops polling.
    pub(crate) fn close(&self) {
        self.token.cancel();
    }
}

impl Drop for FileWatch {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
