//! # tracevisor
//!
//! **Tracevisor** delivers trace events from a host process to pluggable
//! sinks. Every sink sits behind a bounded, batching, backpressure-aware
//! publisher, and the set of sinks can be reconfigured while the process
//! runs without disturbing the sinks that did not change.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   tracing provider (already filtered)
//!            │ TraceEvent
//!            ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Pipeline (host runtime)                                          │
//! │  - LiveConfiguration (service settings + ordered sinks)           │
//! │  - registry: producer id ──► sinks subscribed to it               │
//! │  - Bus (broadcast diagnostics)                                    │
//! │  - SubscriberSet (fans out to user subscribers)                   │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼ try_post         ▼ try_post         ▼ try_post
//!   ┌────────────┐     ┌────────────┐     ┌────────────┐
//!   │ Buffered   │     │ Buffered   │     │ Buffered   │
//!   │ publisher  │     │ publisher  │     │ publisher  │
//!   │ (worker)   │     │ (worker)   │     │ (worker)   │
//!   └─────┬──────┘     └─────┬──────┘     └─────┬──────┘
//!         ▼ publish(batch)   ▼                  ▼
//!      sink #1            sink #2            sink #3      (BatchPublisher)
//!
//!   ConfigurationWatcher ──► loader ──► reconcile(live, candidate) ──► Pipeline::apply
//! ```
//!
//! ### Publisher worker
//! ```text
//! loop {
//!   ├─► cancelled?             ─► resolve pending flush, exit
//!   ├─► below count threshold and no flush pending
//!   │       └─ wait(interval | wake | cancel), continue
//!   ├─► batch = peek(max_batch_size)
//!   ├─► publish(batch)
//!   │       ├─ Ok(n)  ──► remove n from head
//!   │       │             └─ n == batch: reset backoff, re-enable count trigger
//!   │       └─ Err    ──► fail pending flush (keeps entries)
//!   └─► nothing accepted ─► disable count trigger, BackoffScheduled, sleep
//! }
//! ```
//!
//! ## Features
//! | Area               | Description                                                    | Key types / traits                                    |
//! |--------------------|----------------------------------------------------------------|-------------------------------------------------------|
//! | **Publishing**     | Bounded buffering, batching, flush, backoff.                   | [`BufferedEventPublisher`], [`BatchPublisher`]        |
//! | **Settings**       | Validated sink, source and service descriptions.               | [`SinkSettings`], [`EventSourceSettings`]             |
//! | **Reconciliation** | Minimal diff of a candidate into the live configuration.       | [`reconcile`], [`LiveConfiguration`]                  |
//! | **Loading**        | JSON documents, explicit sink registry, partial success.       | [`JsonConfigurationLoader`], [`SinkRegistry`]         |
//! | **Runtime**        | Live publishers, routing, shutdown, file watching.             | [`Pipeline`], [`ConfigurationWatcher`]                |
//! | **Diagnostics**    | Overload, backoff, topology and fault events.                  | [`Subscribe`], [`Event`], [`EventKind`]               |
//! | **Errors**         | Aggregate validation errors, flush and runtime errors.         | [`ConfigErrors`], [`FlushError`], [`RuntimeError`]    |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], rendering diagnostics through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tracevisor::{
//!     Configuration, EventSourceSettings, Pipeline, PipelineConfig, PublishFn, ServiceSettings,
//!     SinkHandle, SinkRef, SinkSettings, TraceEvent, producer_id,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn tracevisor::Subscribe>> = vec![Arc::new(tracevisor::LogWriter)];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn tracevisor::Subscribe>> = Vec::new();
//!
//!     let pipeline = Pipeline::builder(PipelineConfig::default())
//!         .with_subscribers(subs)
//!         .build()?;
//!
//!     let stdout: SinkRef = PublishFn::arc(|batch: Vec<TraceEvent>| async move {
//!         for ev in &batch {
//!             println!("{} #{}", ev.producer_id, ev.event_id);
//!         }
//!         Ok(batch.len())
//!     });
//!     let sink = SinkSettings::builder("console", SinkHandle::eager("console", stdout))
//!         .source(EventSourceSettings::named("My-App")?)
//!         .build()?;
//!
//!     pipeline
//!         .apply(Configuration::new(ServiceSettings::default(), vec![sink])?)
//!         .await;
//!
//!     pipeline.dispatch(&TraceEvent::new(producer_id("My-App"), 1, &b"hello"[..]));
//!     pipeline.shutdown().await?;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod loader;
mod policies;
mod publisher;
mod reconcile;
mod settings;
mod subscribers;
mod trace;
mod watch;

// ---- Public re-exports ----

pub use crate::core::{Pipeline, PipelineBuilder, PipelineConfig};
pub use error::{
    ConfigError, ConfigErrors, FlushError, LoadError, PublishError, RuntimeError, SinkError,
};
pub use events::{Bus, Event, EventKind};
pub use loader::{
    ConfigurationLoader, JsonConfigurationLoader, LoadedConfiguration, SinkBuilder, SinkRegistry,
};
pub use policies::{BackoffPolicy, BackoffState};
pub use publisher::{
    BatchPublisher, BufferedEventPublisher, BufferingConfig, BufferingOptions, MIN_BUFFER_SIZE,
    MIN_BUFFERING_INTERVAL, PublishFn, PublisherBuilder, PublisherRef,
};
pub use reconcile::{
    LiveConfiguration, ReconcileOutcome, SinkChange, SourceComparison, reconcile, same_service,
    same_sink,
};
pub use settings::{
    Configuration, EventSourceBuilder, EventSourceSettings, Fingerprint, MAX_SINK_NAME_LEN,
    PRODUCER_NAMESPACE, ServiceSettings, SinkDescriptor, SinkHandle, SinkRef, SinkSettings,
    SinkSettingsBuilder, producer_id,
};
pub use subscribers::{Subscribe, SubscriberSet};
pub use trace::{EventLevel, Keywords, TraceEvent};
pub use watch::{ConfigurationWatcher, WatcherState};

// Optional: built-in logger subscriber.
// Disable with: `--no-default-features`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
