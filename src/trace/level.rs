use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Verbosity threshold of a subscription, and severity of an event.
///
/// Ordered from most verbose to least verbose: a subscription at
/// `Warning` receives `Warning`, `Error` and `Critical` events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    /// Everything, including diagnostic chatter.
    #[default]
    Verbose,
    /// Informational events.
    Informational,
    /// Warnings.
    Warning,
    /// Errors.
    Error,
    /// Critical failures only.
    Critical,
}

impl EventLevel {
    /// True if an event at `level` passes a threshold of `self`.
    #[inline]
    pub fn admits(self, level: EventLevel) -> bool {
        level >= self
    }

    /// Lowercase name, as used in configuration documents.
    pub fn as_str(self) -> &'static str {
        match self {
            EventLevel::Verbose => "verbose",
            EventLevel::Informational => "informational",
            EventLevel::Warning => "warning",
            EventLevel::Error => "error",
            EventLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "verbose" => Ok(EventLevel::Verbose),
            "informational" | "info" => Ok(EventLevel::Informational),
            "warning" | "warn" => Ok(EventLevel::Warning),
            "error" => Ok(EventLevel::Error),
            "critical" => Ok(EventLevel::Critical),
            other => Err(format!("unknown event level '{other}'")),
        }
    }
}

/// Keyword bitmask.
///
/// A subscription with mask `m` matches an event with keywords `k` when
/// `k & m != 0`, or when the event carries no keywords at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keywords(pub u64);

impl Keywords {
    /// No keyword bits.
    pub const NONE: Keywords = Keywords(0);
    /// Every keyword bit.
    pub const ALL: Keywords = Keywords(u64::MAX);

    /// True if no bit is set.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Subscription matching rule (`self` is the subscription mask).
    #[inline]
    pub fn matches(self, event: Keywords) -> bool {
        event.is_empty() || event.0 & self.0 != 0
    }
}

impl Default for Keywords {
    fn default() -> Self {
        Keywords::ALL
    }
}
