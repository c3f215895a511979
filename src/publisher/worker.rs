//! # Publisher worker: the background delivery loop.
//!
//! One worker runs per publisher. A supervising task relaunches it when it
//! faults, so a bug in the loop cannot silently stop delivery.
//!
//! ## Loop
//! ```text
//! loop {
//!   ├─► cancelled?                 → resolve pending flush (Ok), exit
//!   ├─► len < threshold && no flush → wait(interval | wake | cancel)
//!   ├─► peek batch (clones, head of queue, ≤ max_batch_size)
//!   │     └─ empty → resolve pending flush (Ok), continue
//!   ├─► publish(batch) ─► Ok(n)  → remove n from head
//!   │                 │             └─ n == len → reset backoff, re-arm count trigger
//!   │                 └─► Err(e) → PublishFailed, fail pending flush
//!   └─► accepted nothing?
//!        ├─► disarm count trigger
//!        ├─► publish BackoffScheduled
//!        └─► sleep(backoff) | cancel
//! }
//! ```
//!
//! ## Rules
//! - The queue lock is never held across an await.
//! - Only the worker removes entries (dispose clears them).
//! - While disarmed, posts do not wake the worker; the interval or a flush does.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures::FutureExt;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::{select, time};

use super::buffered::Shared;
use crate::error::PublishError;
use crate::events::{Event, EventKind};
use crate::policies::BackoffState;

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Spawns the supervising task that keeps one worker alive until cancellation.
pub(super) fn launch<T>(shared: Arc<Shared<T>>, mut rng: StdRng)
where
    T: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        loop {
            let worker = Worker {
                shared: Arc::clone(&shared),
                backoff: BackoffState::with_rng(
                    shared.options.backoff(),
                    StdRng::from_rng(&mut rng),
                ),
            };
            match tokio::spawn(worker.run()).await {
                Ok(()) => break,
                Err(err) if err.is_panic() && !shared.cancel.is_cancelled() => {
                    let info = panic_message(&*err.into_panic());
                    tracing::debug!(sink = %shared.sink_id, %info, "publisher worker faulted; relaunching");
                    shared.bus.publish(
                        Event::new(EventKind::WorkerRestarted)
                            .with_sink(Arc::clone(&shared.sink_id))
                            .with_reason(info),
                    );
                }
                Err(_) => break,
            }
        }
    });
}

struct Worker<T> {
    shared: Arc<Shared<T>>,
    backoff: BackoffState,
}

impl<T: Clone + Send + Sync + 'static> Worker<T> {
    async fn run(mut self) {
        let shared = Arc::clone(&self.shared);
        loop {
            if shared.cancel.is_cancelled() {
                shared.complete_flush(Ok(()));
                return;
            }

            if shared.len() < shared.threshold() && !shared.flush_pending() {
                self.wait_for_trigger().await;
                if shared.cancel.is_cancelled() {
                    continue;
                }
            }

            let batch = shared.peek_batch();
            if batch.is_empty() {
                shared.complete_flush(Ok(()));
                continue;
            }

            let accepted = match self.publish(&batch).await {
                Ok(n) => {
                    let n = n.min(batch.len());
                    shared.remove_front(n);
                    if n == batch.len() {
                        self.backoff.reset();
                        shared.auto_flush.store(true, Ordering::Release);
                    } else if n == 0 {
                        shared.bus.publish(
                            Event::new(EventKind::PublishRejected)
                                .with_sink(Arc::clone(&shared.sink_id))
                                .with_count(batch.len()),
                        );
                    }
                    n
                }
                Err(err) => {
                    tracing::debug!(sink = %shared.sink_id, error = %err, "batch publish failed");
                    shared.bus.publish(
                        Event::new(EventKind::PublishFailed)
                            .with_sink(Arc::clone(&shared.sink_id))
                            .with_count(batch.len())
                            .with_reason(err.to_string()),
                    );
                    shared.fail_flush(&err);
                    0
                }
            };

            if accepted == 0 && !shared.cancel.is_cancelled() {
                self.back_off().await;
            }
        }
    }

    async fn wait_for_trigger(&self) {
        let shared = &self.shared;
        match shared.options.interval() {
            Some(interval) => select! {
                _ = time::sleep(interval) => {}
                _ = shared.wake.notified() => {}
                _ = shared.cancel.cancelled() => {}
            },
            None => select! {
                _ = shared.wake.notified() => {}
                _ = shared.cancel.cancelled() => {}
            },
        }
    }

    /// Runs one publish call, turning a sink panic into an error.
    async fn publish(&self, batch: &[T]) -> Result<usize, PublishError> {
        match AssertUnwindSafe(self.shared.port.publish(batch))
            .catch_unwind()
            .await
        {
            Ok(res) => res,
            Err(panic) => Err(PublishError::Panicked {
                info: panic_message(&*panic),
            }),
        }
    }

    async fn back_off(&mut self) {
        let shared = &self.shared;
        shared.auto_flush.store(false, Ordering::Release);

        let delay = self.backoff.next();
        tracing::trace!(sink = %shared.sink_id, ?delay, attempt = self.backoff.attempts(), "backing off");
        shared.bus.publish(
            Event::new(EventKind::BackoffScheduled)
                .with_sink(Arc::clone(&shared.sink_id))
                .with_delay(delay)
                .with_attempt(self.backoff.attempts()),
        );

        select! {
            _ = time::sleep(delay) => {}
            _ = shared.cancel.cancelled() => {}
        }
    }
}
