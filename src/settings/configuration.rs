//! A complete, validated configuration: service settings plus sinks.

use std::collections::HashMap;

use super::service::ServiceSettings;
use super::sink::SinkSettings;
use crate::error::{ConfigError, ConfigErrors};

/// Service settings and an ordered list of uniquely named sinks.
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    service: ServiceSettings,
    sinks: Vec<SinkSettings>,
}

impl Configuration {
    /// Validates sink name uniqueness.
    ///
    /// Never returns a partial configuration: every duplicate is reported.
    pub fn new(service: ServiceSettings, sinks: Vec<SinkSettings>) -> Result<Self, ConfigErrors> {
        ConfigErrors::check(duplicate_names(&sinks))?;
        Ok(Self { service, sinks })
    }

    /// Global settings.
    pub fn service(&self) -> &ServiceSettings {
        &self.service
    }

    /// Sinks, in declaration order.
    pub fn sinks(&self) -> &[SinkSettings] {
        &self.sinks
    }

    /// Looks a sink up by name.
    pub fn sink(&self, name: &str) -> Option<&SinkSettings> {
        self.sinks.iter().find(|s| s.name() == name)
    }

    /// Splits into parts.
    pub fn into_parts(self) -> (ServiceSettings, Vec<SinkSettings>) {
        (self.service, self.sinks)
    }
}

/// One error per sink whose name was already used by an earlier sink.
pub(crate) fn duplicate_names(sinks: &[SinkSettings]) -> Vec<ConfigError> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut errors = Vec::new();
    for (i, sink) in sinks.iter().enumerate() {
        if let Some(&first) = seen.get(sink.name()) {
            errors.push(ConfigError::DuplicateSinkName {
                name: sink.name().to_string(),
                first,
                second: i,
            });
        } else {
            seen.insert(sink.name(), i);
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::PublishFn;
    use crate::settings::{EventSourceSettings, SinkHandle};
    use crate::trace::TraceEvent;

    fn sink(name: &str) -> SinkSettings {
        let instance = PublishFn::arc(|b: Vec<TraceEvent>| async move { Ok(b.len()) });
        SinkSettings::builder(name, SinkHandle::eager("memory", instance))
            .source(EventSourceSettings::named("app").unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_duplicate_sink_names_are_rejected() {
        let err = Configuration::new(
            ServiceSettings::default(),
            vec![sink("a"), sink("b"), sink("a"), sink("a")],
        )
        .unwrap_err();
        assert_eq!(
            err.errors(),
            &[
                ConfigError::DuplicateSinkName {
                    name: "a".into(),
                    first: 0,
                    second: 2
                },
                ConfigError::DuplicateSinkName {
                    name: "a".into(),
                    first: 0,
                    second: 3
                },
            ]
        );
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let cfg = Configuration::new(ServiceSettings::default(), vec![sink("a"), sink("A")]).unwrap();
        assert_eq!(cfg.sinks().len(), 2);
        assert_eq!(cfg.sink("A").map(SinkSettings::name), Some("A"));
        assert!(cfg.sink("c").is_none());
    }
}
