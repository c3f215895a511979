//! # Buffered event publisher.
//!
//! [`BufferedEventPublisher`] owns the bounded queue of one sink and the
//! handle of its background worker. The state both sides touch lives in
//! [`Shared`]; the worker loop itself lives in [`worker`](super::worker).
//!
//! ## Flush protocol
//! ```text
//! flush() ──► queue empty? ── yes ──► Ok(())
//!                 │ no
//!                 ▼
//!      join (or open) the pending completion, wake worker
//!                 │
//!   worker ──► queue drained        → complete(Ok)
//!          ├─► publish failed       → complete(Err(first cause))
//!          └─► cancelled / disposed → complete(Ok)
//! ```
//! Every caller that joins while a completion is pending shares its result.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;

use super::options::BufferingOptions;
use super::port::PublisherRef;
use super::worker;
use crate::error::{ConfigError, ConfigErrors, FlushError, PublishError};
use crate::events::{Bus, Event, EventKind};

/// Longest accepted sink id.
const MAX_SINK_ID_LEN: usize = 200;

/// Value carried by a pending flush completion; `None` until resolved.
pub(super) type FlushState = Option<Result<(), FlushError>>;

/// State shared by the publisher handle and its worker.
pub(super) struct Shared<T> {
    pub(super) sink_id: Arc<str>,
    pub(super) options: BufferingOptions,
    pub(super) port: PublisherRef<T>,
    pub(super) bus: Bus,
    pub(super) cancel: CancellationToken,
    /// Signals the worker that a trigger fired (count reached or flush requested).
    pub(super) wake: Notify,
    /// Cleared while backing off, so posts do not cut the backoff short.
    pub(super) auto_flush: AtomicBool,
    queue: Mutex<VecDeque<T>>,
    flush: Mutex<Option<watch::Sender<FlushState>>>,
    overloaded: AtomicBool,
    disposed: AtomicBool,
}

impl<T: Clone> Shared<T> {
    /// Clones the head of the queue, up to one batch.
    pub(super) fn peek_batch(&self) -> Vec<T> {
        let q = self.queue.lock();
        let n = q.len().min(self.options.max_batch_size());
        q.iter().take(n).cloned().collect()
    }
}

impl<T> Shared<T> {
    pub(super) fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Queue length below which the worker keeps waiting for a trigger.
    pub(super) fn threshold(&self) -> usize {
        let count = self.options.count();
        if count > 0 && self.auto_flush.load(Ordering::Acquire) {
            count
        } else {
            usize::MAX
        }
    }

    pub(super) fn flush_pending(&self) -> bool {
        self.flush.lock().is_some()
    }

    /// Drops the accepted prefix; the queue may have been cleared meanwhile.
    pub(super) fn remove_front(&self, n: usize) {
        let remaining = {
            let mut q = self.queue.lock();
            let n = n.min(q.len());
            q.drain(..n);
            q.len()
        };
        if remaining < self.options.max_buffer_size() && self.overloaded.swap(false, Ordering::AcqRel)
        {
            tracing::debug!(sink = %self.sink_id, remaining, "buffer capacity restored");
            self.bus.publish(
                Event::new(EventKind::CapacityRestored)
                    .with_sink(Arc::clone(&self.sink_id))
                    .with_capacity(self.options.max_buffer_size()),
            );
        }
    }

    /// Resolves the pending flush, if any. Returns whether one was pending.
    pub(super) fn complete_flush(&self, outcome: Result<(), FlushError>) -> bool {
        match self.flush.lock().take() {
            Some(tx) => {
                tx.send_replace(Some(outcome));
                true
            }
            None => false,
        }
    }

    /// Fails the pending flush with the first cause of `err`.
    pub(super) fn fail_flush(&self, err: &PublishError) {
        let err = FlushError::failed(err.clone());
        let reason = err.to_string();
        if self.complete_flush(Err(err)) {
            self.bus.publish(
                Event::new(EventKind::FlushFailed)
                    .with_sink(Arc::clone(&self.sink_id))
                    .with_reason(reason),
            );
        }
    }

    fn mark_overloaded(&self) {
        if !self.overloaded.swap(true, Ordering::AcqRel) {
            tracing::debug!(sink = %self.sink_id, "buffer capacity reached; dropping entries");
            self.bus.publish(
                Event::new(EventKind::CapacityOverloaded)
                    .with_sink(Arc::clone(&self.sink_id))
                    .with_capacity(self.options.max_buffer_size()),
            );
        }
    }

    fn flush_receiver(&self) -> Option<watch::Receiver<FlushState>> {
        if self.queue.lock().is_empty() {
            return None;
        }
        let rx = {
            let mut slot = self.flush.lock();
            match slot.as_ref() {
                Some(tx) => tx.subscribe(),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(tx);
                    rx
                }
            }
        };
        if self.cancel.is_cancelled() {
            // worker is gone or leaving; nobody else will resolve it
            self.complete_flush(Ok(()));
        } else {
            self.wake.notify_one();
        }
        Some(rx)
    }
}

/// Buffers entries for one sink and delivers them in batches.
///
/// Cloning is not supported; share it behind an `Arc`. Dropping the last
/// handle disposes the publisher.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use tracevisor::{BufferedEventPublisher, BufferingConfig, PublishFn};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let sink = PublishFn::arc(|batch: Vec<u32>| async move { Ok(batch.len()) });
/// let options = BufferingConfig {
///     interval: None,
///     count: 5,
///     max_buffer_size: 500,
///     ..Default::default()
/// }
/// .validate()
/// .unwrap();
///
/// let publisher = BufferedEventPublisher::builder("audit", sink)
///     .options(options)
///     .build()
///     .unwrap();
///
/// assert!(publisher.try_post(1));
/// publisher.flush().await.unwrap();
/// assert!(publisher.is_empty());
/// # }
/// ```
pub struct BufferedEventPublisher<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send + Sync + 'static> BufferedEventPublisher<T> {
    /// Starts building a publisher for `sink_id` in front of `port`.
    pub fn builder(sink_id: impl Into<Arc<str>>, port: PublisherRef<T>) -> PublisherBuilder<T> {
        PublisherBuilder {
            sink_id: sink_id.into(),
            port,
            options: BufferingOptions::default(),
            bus: None,
            rng: None,
        }
    }

    /// Appends `entry` without blocking.
    ///
    /// Returns `false` (and drops the entry) when the queue is full or the
    /// publisher is disposed.
    pub fn try_post(&self, entry: T) -> bool {
        let shared = &self.shared;
        if shared.disposed.load(Ordering::Acquire) {
            return false;
        }

        let len = {
            let mut q = shared.queue.lock();
            if q.len() >= shared.options.max_buffer_size() {
                None
            } else {
                q.push_back(entry);
                Some(q.len())
            }
        };

        match len {
            None => {
                shared.mark_overloaded();
                false
            }
            Some(len) => {
                if len >= shared.threshold() {
                    shared.wake.notify_one();
                }
                true
            }
        }
    }

    /// Requests that everything buffered now be published.
    ///
    /// Resolves immediately with `Ok` when the queue is empty. Otherwise it
    /// resolves once the queue has drained, or with the first cause of a
    /// publish failure. Concurrent callers share one outcome. Disposal
    /// resolves pending flushes with `Ok`.
    pub fn flush(&self) -> BoxFuture<'static, Result<(), FlushError>> {
        let rx = self.shared.flush_receiver();
        async move {
            let Some(mut rx) = rx else {
                return Ok(());
            };
            // a dropped sender means the worker is gone: nothing left to wait for
            let outcome = rx
                .wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|state| (*state).clone());
            outcome.unwrap_or(Ok(()))
        }
        .boxed()
    }
}

impl<T> BufferedEventPublisher<T> {
    /// Stops the worker and discards buffered entries. Idempotent.
    ///
    /// In-flight publish calls are not awaited.
    pub fn dispose(&self) {
        let shared = &self.shared;
        if shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        shared.cancel.cancel();

        let lost = {
            let mut q = shared.queue.lock();
            let n = q.len();
            q.clear();
            n
        };
        if lost > 0 {
            tracing::debug!(sink = %shared.sink_id, lost, "publisher disposed with buffered entries");
            shared.bus.publish(
                Event::new(EventKind::EventsLost)
                    .with_sink(Arc::clone(&shared.sink_id))
                    .with_count(lost),
            );
        }
        shared.complete_flush(Ok(()));
    }

    /// Whether [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    /// Number of buffered entries.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sink id this publisher delivers to.
    pub fn sink_id(&self) -> &str {
        &self.shared.sink_id
    }

    /// Effective buffering options.
    pub fn options(&self) -> &BufferingOptions {
        &self.shared.options
    }
}

impl<T> Drop for BufferedEventPublisher<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Builder for [`BufferedEventPublisher`].
pub struct PublisherBuilder<T> {
    sink_id: Arc<str>,
    port: PublisherRef<T>,
    options: BufferingOptions,
    bus: Option<Bus>,
    rng: Option<StdRng>,
}

impl<T: Clone + Send + Sync + 'static> PublisherBuilder<T> {
    /// Sets validated buffering options.
    pub fn options(mut self, options: BufferingOptions) -> Self {
        self.options = options;
        self
    }

    /// Publishes diagnostics to `bus` instead of a private one.
    pub fn bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Seeds the backoff jitter source.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng = Some(StdRng::seed_from_u64(seed));
        self
    }

    /// Validates the sink id and starts the worker.
    ///
    /// Must be called within a Tokio runtime.
    pub fn build(self) -> Result<BufferedEventPublisher<T>, ConfigErrors> {
        validate_sink_id(&self.sink_id)?;

        let shared = Arc::new(Shared {
            sink_id: self.sink_id,
            options: self.options,
            port: self.port,
            bus: self.bus.unwrap_or_default(),
            cancel: CancellationToken::new(),
            wake: Notify::new(),
            auto_flush: AtomicBool::new(true),
            queue: Mutex::new(VecDeque::new()),
            flush: Mutex::new(None),
            overloaded: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        });

        let rng = self
            .rng
            .unwrap_or_else(|| StdRng::from_rng(&mut rand::rng()));
        worker::launch(Arc::clone(&shared), rng);

        Ok(BufferedEventPublisher { shared })
    }
}

fn validate_sink_id(id: &str) -> Result<(), ConfigError> {
    let reason = if id.trim().is_empty() {
        "must not be empty"
    } else if id.chars().count() > MAX_SINK_ID_LEN {
        "must be at most 200 characters"
    } else {
        return Ok(());
    };
    Err(ConfigError::InvalidName {
        what: "sink id",
        value: id.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::FutureExt;
    use tokio::sync::broadcast;

    use super::*;
    use crate::publisher::{BatchPublisher, BufferingConfig};

    #[derive(Clone, Debug)]
    enum Mode {
        AcceptAll,
        AcceptUpTo(usize),
        Reject,
        Fail(PublishError),
        Panic,
    }

    struct Recorder {
        mode: Mutex<Mode>,
        batches: Mutex<Vec<Vec<u32>>>,
        accepted: Mutex<Vec<u32>>,
        calls: AtomicUsize,
    }

    impl Recorder {
        fn new(mode: Mode) -> Arc<Self> {
            Arc::new(Self {
                mode: Mutex::new(mode),
                batches: Mutex::new(Vec::new()),
                accepted: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            })
        }

        fn set(&self, mode: Mode) {
            *self.mode.lock() = mode;
        }

        fn batches(&self) -> Vec<Vec<u32>> {
            self.batches.lock().clone()
        }
    }

    #[async_trait]
    impl BatchPublisher<u32> for Recorder {
        async fn publish(&self, batch: &[u32]) -> Result<usize, PublishError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batches.lock().push(batch.to_vec());
            let mode = self.mode.lock().clone();
            let n = match mode {
                Mode::AcceptAll => batch.len(),
                Mode::AcceptUpTo(n) => n.min(batch.len()),
                Mode::Reject => 0,
                Mode::Fail(err) => return Err(err),
                Mode::Panic => panic!("sink exploded"),
            };
            self.accepted.lock().extend_from_slice(&batch[..n]);
            Ok(n)
        }
    }

    fn options(interval: Option<u64>, count: usize, max: usize) -> BufferingOptions {
        BufferingConfig {
            interval: interval.map(Duration::from_millis),
            count,
            max_buffer_size: max,
            ..Default::default()
        }
        .validate()
        .unwrap()
    }

    fn publisher(
        rec: &Arc<Recorder>,
        opts: BufferingOptions,
        bus: &Bus,
    ) -> BufferedEventPublisher<u32> {
        BufferedEventPublisher::builder("test-sink", rec.clone() as PublisherRef<u32>)
            .options(opts)
            .bus(bus.clone())
            .rng_seed(7)
            .build()
            .unwrap()
    }

    fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn count_kind(events: &[Event], kind: EventKind) -> usize {
        events.iter().filter(|e| e.kind == kind).count()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_trigger_publishes_full_batch() {
        let rec = Recorder::new(Mode::AcceptAll);
        let bus = Bus::new(64);
        let p = publisher(&rec, options(None, 5, 500), &bus);

        for i in 0..4 {
            assert!(p.try_post(i));
        }
        settle().await;
        assert!(rec.batches().is_empty());

        assert!(p.try_post(4));
        settle().await;
        assert_eq!(rec.batches(), vec![vec![0, 1, 2, 3, 4]]);
        assert!(p.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_trigger_waits_full_interval() {
        let rec = Recorder::new(Mode::AcceptAll);
        let bus = Bus::new(64);
        let p = publisher(&rec, options(Some(500), 0, 500), &bus);

        assert!(p.try_post(42));
        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(rec.batches().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(rec.batches(), vec![vec![42]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_acceptance_preserves_order() {
        let rec = Recorder::new(Mode::AcceptUpTo(3));
        let bus = Bus::new(64);
        let p = publisher(&rec, options(None, 5, 500), &bus);

        for i in 0..10 {
            assert!(p.try_post(i));
        }
        p.flush().await.unwrap();

        assert_eq!(*rec.accepted.lock(), (0..10).collect::<Vec<_>>());
        for batch in rec.batches() {
            assert!(batch.len() <= 5);
            assert!(batch.windows(2).all(|w| w[1] == w[0] + 1));
        }
        assert!(p.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_is_bounded_and_overload_reported_once() {
        let rec = Recorder::new(Mode::Reject);
        let bus = Bus::new(1024);
        let mut rx = bus.subscribe();
        let p = publisher(&rec, options(None, 100, 500), &bus);

        let posted = (0..600).filter(|i| p.try_post(*i)).count();
        assert_eq!(posted, 500);
        assert_eq!(p.len(), 500);

        let events = drain(&mut rx);
        assert_eq!(count_kind(&events, EventKind::CapacityOverloaded), 1);
        assert_eq!(count_kind(&events, EventKind::CapacityRestored), 0);

        rec.set(Mode::AcceptAll);
        p.flush().await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(count_kind(&events, EventKind::CapacityOverloaded), 0);
        assert_eq!(count_kind(&events, EventKind::CapacityRestored), 1);
        assert!(p.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_on_empty_queue_resolves_immediately() {
        let rec = Recorder::new(Mode::AcceptAll);
        let bus = Bus::new(64);
        let p = publisher(&rec, options(Some(60_000), 0, 500), &bus);

        assert_eq!(p.flush().now_or_never(), Some(Ok(())));
        assert_eq!(rec.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_drains_without_waiting_for_interval() {
        let rec = Recorder::new(Mode::AcceptAll);
        let bus = Bus::new(64);
        let p = publisher(&rec, options(Some(60_000), 0, 500), &bus);

        for i in 0..7 {
            p.try_post(i);
        }
        let started = tokio::time::Instant::now();
        p.flush().await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(rec.batches().concat(), (0..7).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_flushes_share_outcome() {
        let rec = Recorder::new(Mode::AcceptAll);
        let bus = Bus::new(64);
        let p = publisher(&rec, options(Some(60_000), 0, 500), &bus);

        p.try_post(1);
        let (a, b) = tokio::join!(p.flush(), p.flush());
        assert_eq!(a, Ok(()));
        assert_eq!(b, Ok(()));
        assert_eq!(rec.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_reports_first_cause_of_failure() {
        let rec = Recorder::new(Mode::Fail(PublishError::Aggregate(vec![
            PublishError::fail("disk full"),
            PublishError::fail("timeout"),
        ])));
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let p = publisher(&rec, options(Some(60_000), 0, 500), &bus);

        p.try_post(1);
        let err = p.flush().await.unwrap_err();
        assert_eq!(err, FlushError::failed(PublishError::fail("disk full")));

        settle().await;
        let events = drain(&mut rx);
        assert_eq!(count_kind(&events, EventKind::PublishFailed), 1);
        assert_eq!(count_kind(&events, EventKind::FlushFailed), 1);
        assert_eq!(count_kind(&events, EventKind::BackoffScheduled), 1);
        assert_eq!(p.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_sink_is_reported_as_failure() {
        let rec = Recorder::new(Mode::Panic);
        let bus = Bus::new(64);
        let p = publisher(&rec, options(Some(60_000), 0, 500), &bus);

        p.try_post(1);
        let err = p.flush().await.unwrap_err();
        assert!(matches!(
            err,
            FlushError::Failed {
                source: PublishError::Panicked { .. }
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_and_resets_after_success() {
        let rec = Recorder::new(Mode::Reject);
        let bus = Bus::new(1024);
        let mut rx = bus.subscribe();
        let p = publisher(&rec, options(Some(500), 1, 500), &bus);

        p.try_post(1);
        tokio::time::sleep(Duration::from_secs(4_000)).await;

        let delays: Vec<u32> = drain(&mut rx)
            .iter()
            .filter(|e| e.kind == EventKind::BackoffScheduled)
            .filter_map(|e| e.delay_ms)
            .collect();
        assert!(delays.len() >= 6, "{delays:?}");
        assert_eq!(delays[0], 45_000);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]), "{delays:?}");
        assert!(delays.iter().all(|d| *d <= 3_600_000));

        rec.set(Mode::AcceptAll);
        tokio::time::sleep(Duration::from_secs(4_000)).await;
        assert!(p.is_empty());
        drain(&mut rx);

        rec.set(Mode::Reject);
        p.try_post(2);
        settle().await;
        let delays: Vec<u32> = drain(&mut rx)
            .iter()
            .filter(|e| e.kind == EventKind::BackoffScheduled)
            .filter_map(|e| e.delay_ms)
            .collect();
        assert_eq!(delays, vec![45_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_reports_lost_entries_once() {
        let rec = Recorder::new(Mode::AcceptAll);
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let p = publisher(&rec, options(Some(60_000), 0, 500), &bus);

        for i in 0..4 {
            p.try_post(i);
        }
        p.dispose();
        p.dispose();

        let events = drain(&mut rx);
        let lost: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EventKind::EventsLost)
            .collect();
        assert_eq!(lost.len(), 1);
        assert_eq!(lost[0].count, Some(4));

        assert!(p.is_disposed());
        assert!(!p.try_post(5));
        assert_eq!(p.flush().await, Ok(()));
        settle().await;
        assert!(rec.batches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_resolves_pending_flush() {
        let rec = Recorder::new(Mode::Reject);
        let bus = Bus::new(64);
        let p = publisher(&rec, options(Some(60_000), 0, 500), &bus);

        p.try_post(1);
        let pending = p.flush();
        settle().await;
        p.dispose();
        assert_eq!(pending.await, Ok(()));
    }

    #[tokio::test]
    async fn test_invalid_sink_id_is_rejected() {
        let rec = Recorder::new(Mode::AcceptAll);
        let err = BufferedEventPublisher::builder("  ", rec.clone() as PublisherRef<u32>)
            .build()
            .err()
            .unwrap();
        assert_eq!(err.errors()[0].as_label(), "config_invalid_name");

        let long = "x".repeat(201);
        assert!(
            BufferedEventPublisher::builder(long, rec as PublisherRef<u32>)
                .build()
                .is_err()
        );
    }
}
