//! Diagnostic events: types and broadcast bus.
//!
//! This module groups the diagnostic **data model** and the **bus** used to
//! publish/subscribe to it. Every runtime signal the pipeline produces
//! (overload, lost events, backoff, configuration changes and faults) is an
//! [`Event`] on a [`Bus`].
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `BufferedEventPublisher` (and its worker), `Pipeline`,
//!   `ConfigurationWatcher`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `Pipeline`'s listener (fans out to `SubscriberSet`), and
//!   anyone holding a receiver from [`Bus::subscribe`].

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
