//! # Loading candidate configurations.
//!
//! A [`ConfigurationLoader`] turns a source (a file path) into a
//! [`LoadedConfiguration`]. Loading distinguishes two failure modes:
//! - **wholesale** failure ([`LoadError`](crate::LoadError)): the source is
//!   unreadable, unparseable, or its global settings are invalid;
//! - **partial** failure: individual sink definitions are invalid. They are
//!   reported in [`LoadedConfiguration::errors`] while the rest loads.
//!
//! Loaders never construct sink instances. They produce deferred
//! [`SinkHandle`](crate::SinkHandle)s whose factories come from an explicit
//! [`SinkRegistry`].

mod json;
mod registry;

use std::path::Path;

use async_trait::async_trait;

pub use json::JsonConfigurationLoader;
pub use registry::{SinkBuilder, SinkRegistry};

use crate::error::{ConfigError, LoadError};
use crate::settings::{ServiceSettings, SinkSettings};

/// Result of a (possibly partial) load.
#[derive(Clone, Debug, Default)]
pub struct LoadedConfiguration {
    /// Global settings.
    pub service: ServiceSettings,
    /// Sinks that loaded, in document order, with unique names.
    pub sinks: Vec<SinkSettings>,
    /// Definitions that failed, tagged with their sink when known.
    pub errors: Vec<ConfigError>,
}

impl LoadedConfiguration {
    /// True if every definition loaded.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Source of candidate configurations.
#[async_trait]
pub trait ConfigurationLoader: Send + Sync + 'static {
    /// Loads the configuration stored at `source`.
    async fn load(&self, source: &Path) -> Result<LoadedConfiguration, LoadError>;
}
