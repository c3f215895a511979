//! Configuration change detection.
//!
//! - [`FileWatch`](poll::FileWatch): polling signal source, gated, recreatable;
//! - [`ConfigurationWatcher`]: debounce, load, reconcile, re-arm.

mod poll;
mod watcher;

pub use watcher::{ConfigurationWatcher, WatcherState};
