//! # Buffering configuration.
//!
//! [`BufferingConfig`] is what users and configuration documents provide.
//! [`BufferingConfig::validate`] turns it into [`BufferingOptions`], the only
//! form a publisher accepts.
//!
//! ## Rules
//! - At least one trigger must be active: an interval or a count.
//! - Intervals shorter than [`MIN_BUFFERING_INTERVAL`] are raised to it.
//! - The queue bound is at least [`MIN_BUFFER_SIZE`] and at least three
//!   batches of `count`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigErrors};
use crate::policies::BackoffPolicy;

/// Shortest effective buffering interval.
pub const MIN_BUFFERING_INTERVAL: Duration = Duration::from_millis(500);

/// Smallest accepted queue bound.
pub const MIN_BUFFER_SIZE: usize = 500;

/// Slack factor between the queue bound and the count trigger.
const BATCH_SLACK: usize = 3;

/// User-facing buffering settings.
///
/// - `interval = None` disables the time trigger.
/// - `count = 0` disables the count trigger (and leaves batch size unbounded).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BufferingConfig {
    /// Time trigger.
    #[serde(rename = "intervalMs", with = "opt_millis")]
    pub interval: Option<Duration>,
    /// Count trigger and batch size.
    pub count: usize,
    /// Queue bound.
    pub max_buffer_size: usize,
    /// Retry policy.
    #[serde(skip)]
    pub backoff: BackoffPolicy,
}

impl Default for BufferingConfig {
    /// Returns a config with:
    /// - `interval = 30s`;
    /// - `count = 1000`;
    /// - `max_buffer_size = 30_000`;
    /// - default [`BackoffPolicy`].
    fn default() -> Self {
        Self {
            interval: Some(Duration::from_secs(30)),
            count: 1000,
            max_buffer_size: 30_000,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl BufferingConfig {
    /// Validates the settings, reporting every violation at once.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use tracevisor::BufferingConfig;
    ///
    /// let opts = BufferingConfig {
    ///     interval: Some(Duration::from_millis(10)),
    ///     count: 0,
    ///     max_buffer_size: 500,
    ///     ..Default::default()
    /// }
    /// .validate()
    /// .unwrap();
    ///
    /// assert_eq!(opts.interval(), Some(Duration::from_millis(500)));
    /// assert_eq!(opts.max_batch_size(), 500);
    /// ```
    pub fn validate(&self) -> Result<BufferingOptions, ConfigErrors> {
        let mut errors = Vec::new();

        if self.interval.is_none() && self.count == 0 {
            errors.push(ConfigError::BufferingDisabled);
        }
        if self.max_buffer_size < MIN_BUFFER_SIZE {
            errors.push(ConfigError::BufferTooSmall {
                max: self.max_buffer_size,
                min: MIN_BUFFER_SIZE,
            });
        }
        if self.max_buffer_size < self.count.saturating_mul(BATCH_SLACK) {
            errors.push(ConfigError::BufferBelowBatchSlack {
                max: self.max_buffer_size,
                count: self.count,
            });
        }
        ConfigErrors::check(errors)?;

        Ok(BufferingOptions {
            interval: self.interval.map(|i| i.max(MIN_BUFFERING_INTERVAL)),
            count: self.count,
            max_buffer_size: self.max_buffer_size,
            backoff: self.backoff,
        })
    }
}

/// Validated buffering settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BufferingOptions {
    interval: Option<Duration>,
    count: usize,
    max_buffer_size: usize,
    backoff: BackoffPolicy,
}

impl BufferingOptions {
    /// Effective time trigger; `None` waits for a count trigger or a flush.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Count trigger; `0` when disabled.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Queue bound.
    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    /// Largest batch handed to the sink.
    pub fn max_batch_size(&self) -> usize {
        if self.count == 0 {
            self.max_buffer_size
        } else {
            self.count
        }
    }

    /// Retry policy.
    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }
}

impl Default for BufferingOptions {
    fn default() -> Self {
        BufferingOptions {
            interval: Some(Duration::from_secs(30)),
            count: 1000,
            max_buffer_size: 30_000,
            backoff: BackoffPolicy::default(),
        }
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(d) => s.serialize_some(&(d.as_millis().min(u128::from(u64::MAX)) as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
