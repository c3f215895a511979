//! Global service settings.

use crate::error::{ConfigError, ConfigErrors};

use super::sink::name_problem;

/// Settings shared by every sink.
///
/// Compared by value; any difference requires restarting delivery.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceSettings {
    session_name_prefix: String,
}

impl ServiceSettings {
    /// Validates and builds the settings.
    pub fn new(session_name_prefix: impl Into<String>) -> Result<Self, ConfigErrors> {
        let prefix = session_name_prefix.into().trim().to_string();
        if let Some(reason) = name_problem(&prefix) {
            return Err(ConfigError::InvalidName {
                what: "session name prefix",
                value: prefix,
                reason,
            }
            .into());
        }
        Ok(Self {
            session_name_prefix: prefix,
        })
    }

    /// Prefix of the tracing session names owned by the pipeline.
    pub fn session_name_prefix(&self) -> &str {
        &self.session_name_prefix
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            session_name_prefix: "tracevisor".to_string(),
        }
    }
}
