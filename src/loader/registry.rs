//! Explicit registry of sink builders, keyed by sink type.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::SinkError;
use crate::settings::SinkRef;

/// Constructs sink instances of one type.
///
/// Implemented for closures `Fn(&str, &serde_json::Value) -> Result<SinkRef, SinkError>`.
pub trait SinkBuilder: Send + Sync + 'static {
    /// Builds the sink called `name` from its `parameters`.
    fn build(&self, name: &str, parameters: &serde_json::Value) -> Result<SinkRef, SinkError>;
}

impl<F> SinkBuilder for F
where
    F: Fn(&str, &serde_json::Value) -> Result<SinkRef, SinkError> + Send + Sync + 'static,
{
    fn build(&self, name: &str, parameters: &serde_json::Value) -> Result<SinkRef, SinkError> {
        self(name, parameters)
    }
}

/// Map of sink type (case-insensitive) to builder.
///
/// # Example
/// ```
/// use tracevisor::{PublishFn, SinkError, SinkRef, SinkRegistry, TraceEvent};
///
/// let registry = SinkRegistry::new().with(
///     "console",
///     |_name: &str, _params: &serde_json::Value| -> Result<SinkRef, SinkError> {
///         Ok(PublishFn::arc(|batch: Vec<TraceEvent>| async move { Ok(batch.len()) }))
///     },
/// );
/// assert!(registry.contains("Console"));
/// ```
#[derive(Clone, Default)]
pub struct SinkRegistry {
    builders: HashMap<String, Arc<dyn SinkBuilder>>,
}

impl SinkRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `builder` for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: impl AsRef<str>, builder: impl SinkBuilder) {
        self.builders
            .insert(kind.as_ref().to_ascii_lowercase(), Arc::new(builder));
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, kind: impl AsRef<str>, builder: impl SinkBuilder) -> Self {
        self.register(kind, builder);
        self
    }

    /// Builder for `kind`, if registered.
    pub fn get(&self, kind: &str) -> Option<Arc<dyn SinkBuilder>> {
        self.builders.get(&kind.to_ascii_lowercase()).cloned()
    }

    /// Whether `kind` is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.builders.contains_key(&kind.to_ascii_lowercase())
    }
}

impl fmt::Debug for SinkRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.builders.keys().collect();
        kinds.sort();
        f.debug_struct("SinkRegistry").field("kinds", &kinds).finish()
    }
}
