//! # Diagnostic subscribers.
//!
//! Diagnostics published on the [`Bus`](crate::Bus) are forwarded by the
//! [`Pipeline`](crate::Pipeline) to a [`SubscriberSet`]: every subscriber gets
//! its own bounded queue and worker, so a slow or panicking subscriber cannot
//! stall delivery.
//!
//! ## Architecture
//! ```text
//! publishers / pipeline / watcher ── publish(Event) ──► Bus
//!                                                        │
//!                                     Pipeline listener ─┘
//!                                                        ▼
//!                                                  SubscriberSet
//!                                         ┌──────────┬───┴──────┬────────┐
//!                                         ▼          ▼          ▼        ▼
//!                                     LogWriter   Metrics    Alerts    ...
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use async_trait::async_trait;
//! use tracevisor::{Event, EventKind, Subscribe};
//!
//! struct LostEventsCounter;
//!
//! #[async_trait]
//! impl Subscribe for LostEventsCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::EventsLost {
//!             // increment a counter by event.count
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "lost-events"
//!     }
//! }
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
