//! Trace entries delivered by the tracing provider.
//!
//! - [`TraceEvent`] one structured event emitted by a producer
//! - [`EventLevel`] ordered verbosity threshold (lowest = most verbose)
//! - [`Keywords`] keyword bitmask used for subscription matching
//!
//! The provider filters by level/keyword before delivery; these types only
//! carry the values so sinks (and hosts without a filtering provider) can
//! inspect them.

mod event;
mod level;

pub use event::TraceEvent;
pub use level::{EventLevel, Keywords};
