//! Runtime core: live sinks and their lifecycle.
//!
//! The only public entry point from this module is [`Pipeline`] (built with
//! [`PipelineBuilder`] from a [`PipelineConfig`]).
//!
//! Internal modules:
//! - [`pipeline`]: applies reconciled configurations, routes events, shuts down;
//! - [`registry`]: per-sink publishers and producer subscriptions;
//! - [`config`]: runtime tunables.

mod builder;
mod config;
mod pipeline;
mod registry;

pub use builder::PipelineBuilder;
pub use config::PipelineConfig;
pub use pipeline::Pipeline;
