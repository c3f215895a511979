//! # Buffered, backpressure-aware batch delivery.
//!
//! One [`BufferedEventPublisher`] sits in front of every sink. It accepts
//! single entries, keeps them in a bounded queue and hands them to the sink's
//! [`BatchPublisher`] in batches.
//!
//! ## Architecture
//! ```text
//! try_post(entry) ──► [bounded queue] ──► worker ──► BatchPublisher::publish(batch)
//!      │                   ▲                │                 │
//!      │ full? drop +      │ remove the     │                 ├─ Ok(n)  → drop n from head
//!      │ CapacityOverloaded│ accepted prefix│                 ├─ Ok(0)  → backoff
//!      │                   │                │                 └─ Err(e) → fail pending flush, backoff
//!      └─ count reached ───┴─ wake ─────────┘
//! flush() ──► shared completion ◄── resolved when the queue drains (or publish fails)
//! ```
//!
//! ## Rules
//! - `try_post` never blocks and never fails loudly: a full queue drops the entry.
//! - Batches preserve posting order; only a contiguous prefix is ever removed.
//! - One worker per publisher; a faulted worker is relaunched unless cancelled.
//! - Dispose discards buffered entries and reports how many were lost.

mod buffered;
mod options;
mod port;
mod worker;

pub use buffered::{BufferedEventPublisher, PublisherBuilder};
pub use options::{BufferingConfig, BufferingOptions, MIN_BUFFER_SIZE, MIN_BUFFERING_INTERVAL};
pub use port::{BatchPublisher, PublishFn, PublisherRef};

pub(crate) use worker::panic_message;
