//! Live configuration reconciliation.
//!
//! ## Contents
//! - [`LiveConfiguration`] the configuration in effect
//! - [`reconcile`] minimal diff of a candidate into the live configuration
//! - [`ReconcileOutcome`], [`SinkChange`] what was applied
//! - comparers: [`same_sink`], [`same_service`], [`SourceComparison`]

mod comparers;
mod engine;

pub use comparers::{SourceComparison, same_service, same_sink};
pub use engine::{LiveConfiguration, ReconcileOutcome, SinkChange, reconcile};
