//! # Diagnostic events emitted by publishers, the pipeline and the watcher.
//!
//! The [`EventKind`] enum classifies diagnostics across four categories:
//! - **Buffer events**: capacity overload/restore, lost entries
//! - **Delivery events**: publish failures, rejected batches, backoff, flush failures
//! - **Topology events**: sinks added/removed/replaced, subscriptions updated
//! - **Runtime events**: configuration faults, subscriber problems, shutdown
//!
//! The [`Event`] struct carries additional metadata such as timestamps, sink
//! name, counts and delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tracevisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::BackoffScheduled)
//!     .with_sink("audit-db")
//!     .with_reason("connection refused")
//!     .with_delay(Duration::from_secs(45));
//!
//! assert_eq!(ev.kind, EventKind::BackoffScheduled);
//! assert_eq!(ev.sink.as_deref(), Some("audit-db"));
//! assert_eq!(ev.delay_ms, Some(45_000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of diagnostic events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Buffer events ===
    /// A publisher's queue became full; further entries are dropped.
    ///
    /// Emitted once per overload episode.
    ///
    /// Sets:
    /// - `sink`: sink id
    /// - `capacity`: queue bound
    CapacityOverloaded,

    /// A publisher's queue has room again after a successful publish.
    ///
    /// Sets:
    /// - `sink`: sink id
    /// - `capacity`: queue bound
    CapacityRestored,

    /// Entries were still buffered when the publisher was disposed.
    ///
    /// Sets:
    /// - `sink`: sink id
    /// - `count`: number of discarded entries
    EventsLost,

    // === Delivery events ===
    /// The sink returned an error (or panicked) while publishing.
    ///
    /// Sets:
    /// - `sink`: sink id
    /// - `count`: batch length
    /// - `reason`: error message
    PublishFailed,

    /// The sink accepted zero entries of a batch.
    ///
    /// Sets:
    /// - `sink`: sink id
    /// - `count`: batch length
    PublishRejected,

    /// The worker will wait before retrying.
    ///
    /// Sets:
    /// - `sink`: sink id
    /// - `delay_ms`: wait before the next attempt
    /// - `attempt`: consecutive failed attempts so far
    BackoffScheduled,

    /// A pending flush was resolved with a failure.
    ///
    /// Sets:
    /// - `sink`: sink id
    /// - `reason`: first underlying cause
    FlushFailed,

    /// The publisher worker faulted and was relaunched.
    ///
    /// Sets:
    /// - `sink`: sink id
    /// - `reason`: panic message
    WorkerRestarted,

    // === Topology events ===
    /// A sink was added to the live configuration.
    ///
    /// Sets:
    /// - `sink`: sink name
    SinkAdded,

    /// A sink was removed from the live configuration.
    ///
    /// Sets:
    /// - `sink`: sink name
    SinkRemoved,

    /// A sink's declarative configuration changed; it was removed and re-created.
    ///
    /// Sets:
    /// - `sink`: sink name
    SinkReplaced,

    /// Only a sink's event sources changed; the sink instance was kept.
    ///
    /// Sets:
    /// - `sink`: sink name
    /// - `count`: number of sources now subscribed
    SourcesUpdated,

    /// A deferred sink could not be constructed; it receives no events.
    ///
    /// Sets:
    /// - `sink`: sink name
    /// - `reason`: construction failure
    SinkUnavailable,

    /// Global service settings changed; delivery must be restarted.
    ServiceSettingsChanged,

    /// Every sink publisher was torn down and rebuilt.
    ///
    /// Sets:
    /// - `count`: number of sinks after the restart
    PipelineRestarted,

    /// A candidate configuration was reconciled into the live one.
    ///
    /// Sets:
    /// - `count`: number of changes applied
    ConfigurationApplied,

    /// Loading or reconciling a candidate configuration failed; the previous
    /// configuration stays in effect.
    ///
    /// Sets:
    /// - `sink`: offending sink, when the fault is attached to one
    /// - `reason`: error message
    ConfigurationFault,

    // === Runtime events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `sink`: subscriber name
    /// - `reason`: panic info
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `sink`: subscriber name
    /// - `reason`: "full" or "closed"
    SubscriberOverflow,

    /// Shutdown flushes did not complete within the grace period.
    ///
    /// Sets:
    /// - `count`: number of undrained sinks
    ShutdownGraceExceeded,
}

/// Diagnostic event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Sink (or subscriber) the event is about.
    pub sink: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Entry or change count.
    pub count: Option<u64>,
    /// Queue bound.
    pub capacity: Option<u64>,
    /// Delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Consecutive attempt counter.
    pub attempt: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            sink: None,
            reason: None,
            count: None,
            capacity: None,
            delay_ms: None,
            attempt: None,
        }
    }

    /// Attaches a sink name.
    #[inline]
    pub fn with_sink(mut self, sink: impl Into<Arc<str>>) -> Self {
        self.sink = Some(sink.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a count.
    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(n as u64);
        self
    }

    /// Attaches a queue bound.
    #[inline]
    pub fn with_capacity(mut self, n: usize) -> Self {
        self.capacity = Some(n as u64);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_sink(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_sink(subscriber)
            .with_reason(info)
    }
}
