//! # Event source (producer subscription) settings.
//!
//! An [`EventSourceSettings`] names one producer a sink listens to, and at
//! which verbosity. A producer is anchored by its name, its identifier, or
//! both; the identifier of a named producer is derived from the name.

use uuid::Uuid;

use crate::error::{ConfigError, ConfigErrors};
use crate::trace::{EventLevel, Keywords, TraceEvent};

/// Namespace for producer identifiers derived from names.
pub const PRODUCER_NAMESPACE: Uuid = Uuid::from_u128(0x482c_2db2_c390_47c8_87f8_1a15_bfc1_30fb);

/// Derives the identifier of a named producer.
///
/// Names are case-insensitive: the upper-cased name is hashed (UUID v5).
///
/// # Example
/// ```
/// use tracevisor::producer_id;
///
/// assert_eq!(producer_id("My-Company-App"), producer_id("my-company-app"));
/// assert_ne!(producer_id("a"), producer_id("b"));
/// ```
pub fn producer_id(name: &str) -> Uuid {
    Uuid::new_v5(&PRODUCER_NAMESPACE, name.trim().to_uppercase().as_bytes())
}

/// Subscription of a sink to one producer.
///
/// Immutable; build it with [`EventSourceSettings::builder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventSourceSettings {
    name: Option<String>,
    id: Uuid,
    level: EventLevel,
    match_any_keyword: Keywords,
    arguments: Vec<(String, String)>,
    process_filters: Option<Vec<String>>,
}

impl EventSourceSettings {
    /// Starts a builder.
    pub fn builder() -> EventSourceBuilder {
        EventSourceBuilder::default()
    }

    /// Subscribes to `name` with default level and keywords.
    pub fn named(name: impl Into<String>) -> Result<Self, ConfigErrors> {
        Self::builder().name(name).build()
    }

    /// Producer name, when the subscription was anchored by name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Resolved producer identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Verbosity threshold.
    pub fn level(&self) -> EventLevel {
        self.level
    }

    /// Keyword mask.
    pub fn match_any_keyword(&self) -> Keywords {
        self.match_any_keyword
    }

    /// Provider arguments, in declaration order.
    pub fn arguments(&self) -> &[(String, String)] {
        &self.arguments
    }

    /// Process-name filter; `None` admits every process.
    pub fn process_filters(&self) -> Option<&[String]> {
        self.process_filters.as_deref()
    }

    /// Name if present, otherwise the identifier.
    pub fn display_key(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.id.to_string(),
        }
    }

    /// True if `event` passes this subscription.
    ///
    /// Checks producer, level threshold, keyword mask and process filter.
    /// Hosts whose tracing provider already filters need only the producer.
    pub fn matches(&self, event: &TraceEvent) -> bool {
        if event.producer_id != self.id
            || !self.level.admits(event.level)
            || !self.match_any_keyword.matches(event.keywords)
        {
            return false;
        }
        match (&self.process_filters, &event.process_name) {
            (None, _) => true,
            (Some(filters), _) if filters.is_empty() => true,
            (Some(filters), Some(process)) => filters.iter().any(|f| f.eq_ignore_ascii_case(process)),
            (Some(_), None) => false,
        }
    }
}

/// Builder for [`EventSourceSettings`].
#[derive(Debug, Default)]
pub struct EventSourceBuilder {
    name: Option<String>,
    id: Option<Uuid>,
    level: EventLevel,
    match_any_keyword: Option<Keywords>,
    arguments: Vec<(String, String)>,
    process_filters: Option<Vec<String>>,
}

impl EventSourceBuilder {
    /// Anchors by producer name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Anchors by producer identifier.
    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the verbosity threshold (default `Verbose`).
    pub fn level(mut self, level: EventLevel) -> Self {
        self.level = level;
        self
    }

    /// Sets the keyword mask (default: every keyword).
    pub fn keywords(mut self, mask: Keywords) -> Self {
        self.match_any_keyword = Some(mask);
        self
    }

    /// Appends a provider argument.
    pub fn argument(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.push((key.into(), value.into()));
        self
    }

    /// Restricts the subscription to a process name (repeatable).
    pub fn process_filter(mut self, process: impl Into<String>) -> Self {
        self.process_filters
            .get_or_insert_with(Vec::new)
            .push(process.into());
        self
    }

    /// Validates the anchor and builds the settings.
    pub fn build(self) -> Result<EventSourceSettings, ConfigErrors> {
        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let id = match (&name, self.id) {
            (None, None) => return Err(ConfigError::MissingAnchor.into()),
            (None, Some(id)) => id,
            (Some(name), None) => producer_id(name),
            (Some(name), Some(id)) => {
                let derived = producer_id(name);
                if derived != id {
                    return Err(ConfigError::ConflictingAnchor {
                        name: name.clone(),
                        id,
                        derived,
                    }
                    .into());
                }
                id
            }
        };

        Ok(EventSourceSettings {
            name,
            id,
            level: self.level,
            match_any_keyword: self.match_any_keyword.unwrap_or_default(),
            arguments: self.arguments,
            process_filters: self.process_filters,
        })
    }
}
