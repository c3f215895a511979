//! Equality rules used by reconciliation.
//!
//! - sink identity: ordinal name equality;
//! - subscription equality: [`SourceComparison::NameOnly`] (same producer)
//!   or [`SourceComparison::Full`] (same producer, level, keywords, ordered
//!   arguments and ordered process filters);
//! - service settings: value equality.

use crate::settings::{EventSourceSettings, ServiceSettings, SinkSettings};

/// True if `a` and `b` denote the same sink.
#[inline]
pub fn same_sink(a: &SinkSettings, b: &SinkSettings) -> bool {
    a.name() == b.name()
}

/// True if global settings are equal.
#[inline]
pub fn same_service(a: &ServiceSettings, b: &ServiceSettings) -> bool {
    a == b
}

/// How strictly two subscriptions are compared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceComparison {
    /// Producer identity only.
    NameOnly,
    /// Every subscription attribute.
    Full,
}

impl SourceComparison {
    /// Compares two subscriptions.
    pub fn same_source(self, a: &EventSourceSettings, b: &EventSourceSettings) -> bool {
        match self {
            SourceComparison::NameOnly => a.id() == b.id(),
            SourceComparison::Full => {
                a.id() == b.id()
                    && a.level() == b.level()
                    && a.match_any_keyword() == b.match_any_keyword()
                    && a.arguments() == b.arguments()
                    && a.process_filters() == b.process_filters()
            }
        }
    }

    /// Compares two subscription sets; declaration order is irrelevant.
    ///
    /// Both sides are duplicate-free, so equal length plus inclusion is
    /// set equality.
    pub fn same_sources(self, a: &[EventSourceSettings], b: &[EventSourceSettings]) -> bool {
        a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| self.same_source(x, y)))
    }
}
