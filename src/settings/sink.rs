//! # Sink settings and the two-phase sink handle.
//!
//! A [`SinkHandle`] separates what a sink **is** (its [`SinkDescriptor`])
//! from the running instance. Loading a configuration only produces
//! descriptors; the instance is built by a factory on first use, and that
//! outcome (success or [`SinkError`]) is memoized.
//!
//! A [`Fingerprint`] summarizes the declarative definition of a sink. Two
//! settings with equal fingerprints describe the same sink instance, so only
//! their subscriptions may differ.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use uuid::Uuid;

use super::source::EventSourceSettings;
use crate::error::{ConfigError, ConfigErrors, SinkError};
use crate::publisher::{BufferingConfig, PublisherRef};
use crate::trace::TraceEvent;

/// Longest accepted sink name.
pub const MAX_SINK_NAME_LEN: usize = 200;

/// Running sink instance.
pub type SinkRef = PublisherRef<TraceEvent>;

type SinkFactory = Box<dyn FnOnce() -> Result<SinkRef, SinkError> + Send>;

/// Static description of a sink, available without constructing it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SinkDescriptor {
    kind: String,
}

impl SinkDescriptor {
    /// Describes a sink of type `kind`.
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }

    /// Sink type, as registered with the loader.
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

/// Descriptor plus lazily constructed instance.
pub struct SinkHandle {
    descriptor: SinkDescriptor,
    factory: Mutex<Option<SinkFactory>>,
    instance: OnceLock<Result<SinkRef, SinkError>>,
}

impl SinkHandle {
    /// Wraps an already constructed sink.
    pub fn eager(kind: impl Into<String>, instance: SinkRef) -> Self {
        Self {
            descriptor: SinkDescriptor::new(kind),
            factory: Mutex::new(None),
            instance: OnceLock::from(Ok(instance)),
        }
    }

    /// Defers construction to the first call of [`instance`](Self::instance).
    pub fn deferred<F>(kind: impl Into<String>, factory: F) -> Self
    where
        F: FnOnce() -> Result<SinkRef, SinkError> + Send + 'static,
    {
        Self {
            descriptor: SinkDescriptor::new(kind),
            factory: Mutex::new(Some(Box::new(factory))),
            instance: OnceLock::new(),
        }
    }

    /// Static description.
    pub fn descriptor(&self) -> &SinkDescriptor {
        &self.descriptor
    }

    /// Whether construction has been attempted.
    pub fn is_constructed(&self) -> bool {
        self.instance.get().is_some()
    }

    /// Returns the instance, constructing it on first use.
    ///
    /// A construction failure is memoized: later calls return the same error
    /// without invoking the factory again.
    pub fn instance(&self) -> Result<SinkRef, SinkError> {
        self.instance
            .get_or_init(|| {
                let factory = self.factory.lock().take();
                match factory {
                    Some(factory) => factory(),
                    None => Err(SinkError::construction(
                        self.descriptor.kind(),
                        "no factory to construct the sink",
                    )),
                }
            })
            .clone()
    }
}

impl fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkHandle")
            .field("kind", &self.descriptor.kind)
            .field("constructed", &self.is_constructed())
            .finish()
    }
}

/// Digest of a sink's declarative definition.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Hashes arbitrary bytes.
    pub fn of(bytes: &[u8]) -> Self {
        Fingerprint(*blake3::hash(bytes).as_bytes())
    }

    /// Hashes a JSON value in canonical form (object keys sorted).
    pub fn of_json(value: &serde_json::Value) -> Self {
        Fingerprint::of(value.to_string().as_bytes())
    }

    /// Full lowercase hex digest.
    pub fn to_hex(&self) -> String {
        blake3::Hash::from_bytes(self.0).to_hex().to_string()
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex()[..16])
    }
}

/// One sink of a configuration: identity, instance and subscriptions.
///
/// Built with [`SinkSettings::builder`]. Cloning shares the [`SinkHandle`].
#[derive(Clone, Debug)]
pub struct SinkSettings {
    name: String,
    sink: Arc<SinkHandle>,
    event_sources: Vec<EventSourceSettings>,
    fingerprint: Fingerprint,
    buffering: Option<BufferingConfig>,
}

impl SinkSettings {
    /// Starts a builder for a sink called `name`.
    pub fn builder(name: impl Into<String>, sink: impl Into<Arc<SinkHandle>>) -> SinkSettingsBuilder {
        SinkSettingsBuilder {
            name: name.into(),
            sink: sink.into(),
            event_sources: Vec::new(),
            fingerprint: None,
            buffering: None,
        }
    }

    /// Sink name, unique within a configuration.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared sink handle.
    pub fn sink(&self) -> &Arc<SinkHandle> {
        &self.sink
    }

    /// Subscriptions, in declaration order.
    pub fn event_sources(&self) -> &[EventSourceSettings] {
        &self.event_sources
    }

    /// Definition digest.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Per-sink buffering, if it overrides the pipeline default.
    pub fn buffering(&self) -> Option<&BufferingConfig> {
        self.buffering.as_ref()
    }

    /// Identifiers of every subscribed producer.
    pub fn producer_ids(&self) -> impl Iterator<Item = Uuid> {
        self.event_sources.iter().map(EventSourceSettings::id)
    }

    /// Replaces the subscriptions, keeping the sink instance.
    pub(crate) fn set_event_sources(&mut self, sources: Vec<EventSourceSettings>) {
        self.event_sources = sources;
    }
}

/// Builder for [`SinkSettings`].
pub struct SinkSettingsBuilder {
    name: String,
    sink: Arc<SinkHandle>,
    event_sources: Vec<EventSourceSettings>,
    fingerprint: Option<Fingerprint>,
    buffering: Option<BufferingConfig>,
}

impl SinkSettingsBuilder {
    /// Adds a subscription.
    pub fn source(mut self, source: EventSourceSettings) -> Self {
        self.event_sources.push(source);
        self
    }

    /// Adds several subscriptions.
    pub fn sources(mut self, sources: impl IntoIterator<Item = EventSourceSettings>) -> Self {
        self.event_sources.extend(sources);
        self
    }

    /// Sets the definition digest.
    ///
    /// Defaults to a digest of the sink type, so two sinks of one type with
    /// no explicit fingerprint are considered the same instance.
    pub fn fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// Overrides the pipeline's default buffering for this sink.
    pub fn buffering(mut self, buffering: BufferingConfig) -> Self {
        self.buffering = Some(buffering);
        self
    }

    /// Validates and builds the settings, reporting every violation.
    pub fn build(self) -> Result<SinkSettings, ConfigErrors> {
        let mut errors = Vec::new();

        let name = self.name.trim().to_string();
        if let Some(reason) = name_problem(&name) {
            errors.push(ConfigError::InvalidName {
                what: "sink name",
                value: name.clone(),
                reason,
            });
        }

        if self.event_sources.is_empty() {
            errors.push(ConfigError::EmptySources { sink: name.clone() });
        }
        errors.extend(duplicate_sources(&name, &self.event_sources));

        if let Some(buffering) = &self.buffering {
            if let Err(errs) = buffering.validate() {
                errors.extend(errs.into_inner());
            }
        }
        ConfigErrors::check(errors)?;

        let fingerprint = self
            .fingerprint
            .unwrap_or_else(|| Fingerprint::of(self.sink.descriptor().kind().as_bytes()));

        Ok(SinkSettings {
            name,
            sink: self.sink,
            event_sources: self.event_sources,
            fingerprint,
            buffering: self.buffering,
        })
    }
}

/// Returns why `name` is not a valid sink or prefix name, if it is not.
pub(crate) fn name_problem(name: &str) -> Option<&'static str> {
    if name.trim().is_empty() {
        Some("must not be empty")
    } else if name.chars().count() > MAX_SINK_NAME_LEN {
        Some("must be at most 200 characters")
    } else {
        None
    }
}

fn duplicate_sources(sink: &str, sources: &[EventSourceSettings]) -> Vec<ConfigError> {
    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    let mut errors = Vec::new();

    for source in sources {
        let dup_name = source
            .name()
            .is_some_and(|n| !names.insert(n.to_uppercase()));
        let dup_id = !ids.insert(source.id());
        if dup_name || dup_id {
            errors.push(ConfigError::DuplicateSource {
                sink: sink.to_string(),
                source_key: source.display_key(),
            });
        }
    }
    errors
}
