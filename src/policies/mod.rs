//! Retry policies.
//!
//! ## Contents
//! - [`BackoffPolicy`] how retry delays evolve (floor / delta / ceiling + jitter)
//! - [`BackoffState`] per-publisher attempt counter with its own random source
//!
//! ## Quick wiring
//! ```text
//! BufferingOptions { backoff: BackoffPolicy, .. }
//!      └─► publisher worker owns a BackoffState:
//!           - next() after a batch was rejected or failed
//!           - reset() after a batch was fully accepted
//! ```

mod backoff;

pub use backoff::{BackoffPolicy, BackoffState};
