//! Error types used by the tracevisor runtime, sinks and configuration.
//!
//! This module defines:
//!
//! - [`ConfigError`] / [`ConfigErrors`]: construction-time validation failures.
//! - [`PublishError`]: failures reported by a [`BatchPublisher`](crate::BatchPublisher).
//! - [`FlushError`]: failure observed by a caller awaiting an explicit flush.
//! - [`SinkError`]: a deferred sink could not be constructed on first use.
//! - [`LoadError`]: a configuration source could not be loaded at all.
//! - [`RuntimeError`]: errors raised by the pipeline runtime itself.
//!
//! All types provide `as_label` for logs/metrics.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// # A single construction-time validation failure.
///
/// Never surfaced alone from a constructor that validates several things:
/// those return [`ConfigErrors`] so that every problem is reported at once.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A name (sink, session prefix, sink id) is empty or too long.
    #[error("invalid {what} '{value}': {reason}")]
    InvalidName {
        /// What kind of name was rejected.
        what: &'static str,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Neither a buffering interval nor a buffering count was configured.
    #[error("buffering interval and buffering count cannot both be disabled")]
    BufferingDisabled,

    /// `max_buffer_size` is below the absolute minimum.
    #[error("max buffer size {max} is below the minimum of {min}")]
    BufferTooSmall {
        /// Configured maximum.
        max: usize,
        /// Required minimum.
        min: usize,
    },

    /// `max_buffer_size` cannot absorb three batches of `buffering_count`.
    #[error("max buffer size {max} must be at least 3 x buffering count {count}")]
    BufferBelowBatchSlack {
        /// Configured maximum.
        max: usize,
        /// Configured buffering count.
        count: usize,
    },

    /// Two sinks in one configuration share a name.
    #[error("duplicate sink name '{name}' (entries #{first} and #{second})")]
    DuplicateSinkName {
        /// The duplicated name.
        name: String,
        /// Position of the first entry.
        first: usize,
        /// Position of the second entry.
        second: usize,
    },

    /// A sink declares no event sources.
    #[error("sink '{sink}' declares no event sources")]
    EmptySources {
        /// Sink name.
        sink: String,
    },

    /// Two sources in one sink resolve to the same producer name or identifier.
    #[error("sink '{sink}' subscribes to producer '{source_key}' more than once")]
    DuplicateSource {
        /// Sink name.
        sink: String,
        /// Name or identifier of the duplicated producer.
        source_key: String,
    },

    /// An event source has neither a name nor an identifier.
    #[error("event source requires a name or an id")]
    MissingAnchor,

    /// An event source has both a name and an identifier and they disagree.
    #[error("event source name '{name}' resolves to {derived}, not to the given id {id}")]
    ConflictingAnchor {
        /// Declared name.
        name: String,
        /// Declared identifier.
        id: uuid::Uuid,
        /// Identifier derived from `name`.
        derived: uuid::Uuid,
    },

    /// A sink definition references a type no builder is registered for.
    #[error("sink '{sink}' has unknown type '{kind}'")]
    UnknownSinkType {
        /// Sink name.
        sink: String,
        /// Requested sink type.
        kind: String,
    },

    /// A sink definition could not be interpreted.
    #[error("sink '{sink}' is invalid: {reason}")]
    InvalidSink {
        /// Sink name (may be empty when the name itself is missing).
        sink: String,
        /// Description of the problem.
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use tracevisor::ConfigError;
    ///
    /// assert_eq!(ConfigError::MissingAnchor.as_label(), "config_missing_anchor");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::InvalidName { .. } => "config_invalid_name",
            ConfigError::BufferingDisabled => "config_buffering_disabled",
            ConfigError::BufferTooSmall { .. } => "config_buffer_too_small",
            ConfigError::BufferBelowBatchSlack { .. } => "config_buffer_below_batch_slack",
            ConfigError::DuplicateSinkName { .. } => "config_duplicate_sink",
            ConfigError::EmptySources { .. } => "config_empty_sources",
            ConfigError::DuplicateSource { .. } => "config_duplicate_source",
            ConfigError::MissingAnchor => "config_missing_anchor",
            ConfigError::ConflictingAnchor { .. } => "config_conflicting_anchor",
            ConfigError::UnknownSinkType { .. } => "config_unknown_sink_type",
            ConfigError::InvalidSink { .. } => "config_invalid_sink",
        }
    }

    /// Returns the sink this error is attached to, if any.
    pub fn sink(&self) -> Option<&str> {
        match self {
            ConfigError::DuplicateSinkName { name, .. } => Some(name.as_str()),
            ConfigError::EmptySources { sink }
            | ConfigError::DuplicateSource { sink, .. }
            | ConfigError::UnknownSinkType { sink, .. }
            | ConfigError::InvalidSink { sink, .. } => Some(sink.as_str()).filter(|s| !s.is_empty()),
            _ => None,
        }
    }
}

/// # Aggregate of validation failures.
///
/// Returned by constructors instead of a partially built object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigErrors(Vec<ConfigError>);

impl ConfigErrors {
    /// Returns `Ok(())` when `errors` is empty, otherwise the aggregate.
    pub fn check(errors: Vec<ConfigError>) -> Result<(), ConfigErrors> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigErrors(errors))
        }
    }

    /// Individual failures, in detection order.
    pub fn errors(&self) -> &[ConfigError] {
        &self.0
    }

    /// Consumes the aggregate into its failures.
    pub fn into_inner(self) -> Vec<ConfigError> {
        self.0
    }
}

impl From<ConfigError> for ConfigErrors {
    fn from(err: ConfigError) -> Self {
        ConfigErrors(vec![err])
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration: ")?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigErrors {}

/// # Errors produced by a sink while publishing a batch.
///
/// Returning an error is equivalent to accepting zero entries: the batch stays
/// queued and is retried after backoff.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The sink failed to hand off the batch.
    #[error("publish failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Several independent failures (e.g. a sink fanning out to replicas).
    #[error("{} publish errors", .0.len())]
    Aggregate(Vec<PublishError>),

    /// The sink panicked while publishing.
    #[error("publisher panicked: {info}")]
    Panicked {
        /// Panic payload, if it was a string.
        info: String,
    },

    /// The sink instance could not be constructed.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl PublishError {
    /// Convenience constructor for [`PublishError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        PublishError::Fail {
            error: error.into(),
        }
    }

    /// Reduces nested aggregates to their first cause.
    ///
    /// An empty aggregate is returned unchanged.
    ///
    /// # Example
    /// ```
    /// use tracevisor::PublishError;
    ///
    /// let nested = PublishError::Aggregate(vec![
    ///     PublishError::Aggregate(vec![PublishError::fail("disk full")]),
    ///     PublishError::fail("timeout"),
    /// ]);
    /// assert_eq!(nested.flatten(), PublishError::fail("disk full"));
    /// ```
    pub fn flatten(self) -> PublishError {
        match self {
            PublishError::Aggregate(errors) if !errors.is_empty() => {
                let mut errors = errors;
                errors.swap_remove(0).flatten()
            }
            other => other,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PublishError::Fail { .. } => "publish_failed",
            PublishError::Aggregate(_) => "publish_aggregate",
            PublishError::Panicked { .. } => "publish_panicked",
            PublishError::Sink(_) => "publish_sink_unavailable",
        }
    }
}

/// # Failure observed by callers of [`flush`](crate::BufferedEventPublisher::flush).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlushError {
    /// The background loop failed to publish while the flush was pending.
    #[error("flush failed: {source}")]
    Failed {
        /// First underlying cause.
        #[source]
        source: PublishError,
    },
}

impl FlushError {
    /// Wraps a publish failure, flattening aggregates to their first cause.
    pub fn failed(source: PublishError) -> Self {
        FlushError::Failed {
            source: source.flatten(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            FlushError::Failed { .. } => "flush_failed",
        }
    }
}

/// # A deferred sink could not be constructed.
///
/// Memoized: every later use of the same handle observes the same error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The sink factory failed.
    #[error("sink '{sink}' could not be created: {reason}")]
    Construction {
        /// Sink name.
        sink: String,
        /// Factory failure message.
        reason: String,
    },
}

impl SinkError {
    /// Convenience constructor for [`SinkError::Construction`].
    pub fn construction(sink: impl Into<String>, reason: impl Into<String>) -> Self {
        SinkError::Construction {
            sink: sink.into(),
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SinkError::Construction { .. } => "sink_construction_failed",
        }
    }
}

/// # A configuration source could not be loaded at all.
///
/// Partial failures (individual sink definitions) are not `LoadError`s; they
/// travel as [`ConfigError`]s inside a
/// [`LoadedConfiguration`](crate::LoadedConfiguration).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LoadError {
    /// The source could not be read.
    #[error("cannot read configuration '{}': {source}", path.display())]
    Io {
        /// Source path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The source is not a valid configuration document.
    #[error("cannot parse configuration '{}': {reason}", path.display())]
    Parse {
        /// Source path.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// The global settings of the document are invalid.
    #[error("invalid configuration '{}': {errors}", path.display())]
    Invalid {
        /// Source path.
        path: PathBuf,
        /// Validation failures.
        errors: ConfigErrors,
    },
}

impl LoadError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LoadError::Io { .. } => "load_io",
            LoadError::Parse { .. } => "load_parse",
            LoadError::Invalid { .. } => "load_invalid",
        }
    }
}

/// # Errors produced by the pipeline runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some sinks did not drain in time.
    #[error("shutdown grace {grace:?} exceeded; undrained sinks: {stuck:?}")]
    ShutdownGraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Sinks whose buffers were discarded.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use tracevisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::ShutdownGraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::ShutdownGraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}
