use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use uuid::Uuid;

use super::{EventLevel, Keywords};

/// One trace event as delivered by the tracing provider.
///
/// Cheap to clone: the payload is reference-counted, so fanning one event out
/// to several sinks does not copy it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceEvent {
    /// Identifier of the producer that emitted the event.
    pub producer_id: Uuid,
    /// Producer-local event identifier.
    pub event_id: u32,
    /// Opaque, already-encoded payload.
    pub payload: Bytes,
    /// Emission time.
    pub timestamp: SystemTime,
    /// Event severity.
    pub level: EventLevel,
    /// Event keyword bits.
    pub keywords: Keywords,
    /// Name of the emitting process, when the provider reports it.
    pub process_name: Option<Arc<str>>,
}

impl TraceEvent {
    /// Creates an event stamped with the current time, at `Informational`
    /// level and without keywords.
    pub fn new(producer_id: Uuid, event_id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            producer_id,
            event_id,
            payload: payload.into(),
            timestamp: SystemTime::now(),
            level: EventLevel::Informational,
            keywords: Keywords::NONE,
            process_name: None,
        }
    }

    /// Sets the severity.
    #[inline]
    pub fn with_level(mut self, level: EventLevel) -> Self {
        self.level = level;
        self
    }

    /// Sets the keyword bits.
    #[inline]
    pub fn with_keywords(mut self, keywords: Keywords) -> Self {
        self.keywords = keywords;
        self
    }

    /// Sets the emitting process name.
    #[inline]
    pub fn with_process(mut self, name: impl Into<Arc<str>>) -> Self {
        self.process_name = Some(name.into());
        self
    }
}
