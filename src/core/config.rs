//! # Pipeline runtime configuration.
//!
//! Provides [`PipelineConfig`], the settings of one [`Pipeline`](crate::Pipeline)
//! and of the [`ConfigurationWatcher`](crate::ConfigurationWatcher) driving it.
//!
//! ## Sentinel values
//! - `removal_flush_timeout = 0s` → removed sinks are disposed without flushing
//! - `bus_capacity = 0` → clamped to 1

use std::time::Duration;

use crate::publisher::BufferingConfig;

/// Configuration of the pipeline host.
///
/// ## Field semantics
/// - `bus_capacity`: diagnostic bus ring buffer size (min 1; clamped by Bus)
/// - `buffering`: buffering of sinks that do not configure their own
/// - `removal_flush_timeout`: budget for flushing a removed or replaced sink
///   before disposing it (`0s` = discard its buffer)
/// - `grace`: budget for flushing every sink on shutdown
/// - `debounce`: quiet period between a change signal and the reload
/// - `poll_interval`: how often the configuration file is checked
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Capacity of the diagnostic bus.
    ///
    /// Receivers lagging behind more than `bus_capacity` diagnostics skip
    /// the oldest ones.
    pub bus_capacity: usize,

    /// Default buffering for sinks without their own.
    pub buffering: BufferingConfig,

    /// Flush budget for sinks leaving the configuration.
    pub removal_flush_timeout: Duration,

    /// Flush budget for [`Pipeline::shutdown`](crate::Pipeline::shutdown).
    pub grace: Duration,

    /// Delay between a change signal and the reload.
    pub debounce: Duration,

    /// Polling period of the configuration file.
    pub poll_interval: Duration,
}

impl PipelineConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the removal flush budget as an `Option`.
    ///
    /// - `None` → dispose immediately, discarding buffered events
    /// - `Some(d)` → flush for at most `d`, then dispose
    #[inline]
    pub fn removal_flush_budget(&self) -> Option<Duration> {
        if self.removal_flush_timeout == Duration::ZERO {
            None
        } else {
            Some(self.removal_flush_timeout)
        }
    }
}

impl Default for PipelineConfig {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024`
    /// - `buffering = BufferingConfig::default()` (30s / 1000 events / 30 000 max)
    /// - `removal_flush_timeout = 5s`
    /// - `grace = 30s`
    /// - `debounce = 500ms`
    /// - `poll_interval = 250ms`
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            buffering: BufferingConfig::default(),
            removal_flush_timeout: Duration::from_secs(5),
            grace: Duration::from_secs(30),
            debounce: Duration::from_millis(500),
            poll_interval: Duration::from_millis(250),
        }
    }
}
