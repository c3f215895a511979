//! # JSON configuration documents.
//!
//! ```json
//! {
//!   "service": { "sessionNamePrefix": "my-host" },
//!   "sinks": [
//!     {
//!       "name": "audit",
//!       "type": "rolling-file",
//!       "parameters": { "path": "/var/log/audit" },
//!       "buffering": { "intervalMs": 1000, "count": 100, "maxBufferSize": 5000 },
//!       "sources": [
//!         { "name": "My-App", "level": "warning", "matchAnyKeyword": 6,
//!           "arguments": [["EventCounterIntervalSec", "5"]],
//!           "processFilters": ["worker.exe"] }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! The fingerprint of a sink is the digest of its definition without
//! `sources`, so subscription edits never replace the sink instance.
//!
//! A broken sink definition only drops that sink (see
//! [`LoadedConfiguration::errors`]); duplicate sink names reject the whole
//! document with [`LoadError::Invalid`].

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::registry::SinkRegistry;
use super::{ConfigurationLoader, LoadedConfiguration};
use crate::error::{ConfigError, ConfigErrors, LoadError};
use crate::publisher::BufferingConfig;
use crate::settings::{
    EventSourceSettings, Fingerprint, ServiceSettings, SinkHandle, SinkSettings, duplicate_names,
};
use crate::trace::{EventLevel, Keywords};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    #[serde(default)]
    service: Option<ServiceDoc>,
    #[serde(default)]
    sinks: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceDoc {
    session_name_prefix: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SinkDoc {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    parameters: Value,
    #[serde(default)]
    buffering: Option<BufferingConfig>,
    sources: Vec<SourceDoc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SourceDoc {
    name: Option<String>,
    id: Option<Uuid>,
    level: Option<String>,
    match_any_keyword: Option<Keywords>,
    #[serde(default)]
    arguments: Vec<(String, String)>,
    process_filters: Option<Vec<String>>,
}

impl SourceDoc {
    fn into_settings(self, sink: &str) -> Result<EventSourceSettings, ConfigErrors> {
        let mut builder = EventSourceSettings::builder();
        if let Some(name) = self.name {
            builder = builder.name(name);
        }
        if let Some(id) = self.id {
            builder = builder.id(id);
        }
        if let Some(level) = self.level {
            let level: EventLevel = level.parse().map_err(|reason: String| ConfigError::InvalidSink {
                sink: sink.to_string(),
                reason,
            })?;
            builder = builder.level(level);
        }
        if let Some(mask) = self.match_any_keyword {
            builder = builder.keywords(mask);
        }
        for (key, value) in self.arguments {
            builder = builder.argument(key, value);
        }
        for process in self.process_filters.into_iter().flatten() {
            builder = builder.process_filter(process);
        }
        builder.build()
    }
}

/// Loads JSON documents; sink types are resolved through a [`SinkRegistry`].
#[derive(Clone, Debug)]
pub struct JsonConfigurationLoader {
    registry: SinkRegistry,
}

impl JsonConfigurationLoader {
    /// Creates a loader resolving sink types through `registry`.
    pub fn new(registry: SinkRegistry) -> Self {
        Self { registry }
    }

    /// Registered sink builders.
    pub fn registry(&self) -> &SinkRegistry {
        &self.registry
    }

    /// Parses a document already read from `path`.
    pub fn parse(&self, path: &Path, text: &str) -> Result<LoadedConfiguration, LoadError> {
        let doc: Document = serde_json::from_str(text).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let service = match doc.service.and_then(|s| s.session_name_prefix) {
            Some(prefix) => ServiceSettings::new(prefix).map_err(|errors| LoadError::Invalid {
                path: path.to_path_buf(),
                errors,
            })?,
            None => ServiceSettings::default(),
        };

        let mut sinks = Vec::new();
        let mut errors = Vec::new();
        for raw in doc.sinks {
            match self.sink(raw) {
                Ok(sink) => sinks.push(sink),
                Err(errs) => errors.extend(errs),
            }
        }

        ConfigErrors::check(duplicate_names(&sinks)).map_err(|errors| LoadError::Invalid {
            path: path.to_path_buf(),
            errors,
        })?;

        tracing::debug!(path = %path.display(), failed = errors.len(), "configuration parsed");
        Ok(LoadedConfiguration {
            service,
            sinks,
            errors,
        })
    }

    fn sink(&self, mut raw: Value) -> Result<SinkSettings, Vec<ConfigError>> {
        let hint = raw
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();

        let def = SinkDoc::deserialize(&raw).map_err(|e| {
            vec![ConfigError::InvalidSink {
                sink: hint.clone(),
                reason: e.to_string(),
            }]
        })?;
        let name = def.name.trim().to_string();
        let tag = |err: ConfigError| match err.sink() {
            Some(_) => err,
            None => ConfigError::InvalidSink {
                sink: name.clone(),
                reason: err.to_string(),
            },
        };

        let Some(builder) = self.registry.get(&def.kind) else {
            return Err(vec![ConfigError::UnknownSinkType {
                sink: name.clone(),
                kind: def.kind,
            }]);
        };

        let mut sources = Vec::new();
        let mut errors = Vec::new();
        for source in def.sources {
            match source.into_settings(&name) {
                Ok(source) => sources.push(source),
                Err(errs) => errors.extend(errs.into_inner().into_iter().map(&tag)),
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        if let Value::Object(map) = &mut raw {
            map.remove("sources");
        }
        let fingerprint = Fingerprint::of_json(&raw);

        let factory_name = name.clone();
        let parameters = def.parameters;
        let handle = SinkHandle::deferred(def.kind, move || builder.build(&factory_name, &parameters));

        let mut settings = SinkSettings::builder(name.clone(), handle)
            .sources(sources)
            .fingerprint(fingerprint);
        if let Some(buffering) = def.buffering {
            settings = settings.buffering(buffering);
        }
        settings
            .build()
            .map_err(|errs| errs.into_inner().into_iter().map(&tag).collect())
    }
}

#[async_trait]
impl ConfigurationLoader for JsonConfigurationLoader {
    async fn load(&self, source: &Path) -> Result<LoadedConfiguration, LoadError> {
        let text = tokio::fs::read_to_string(source)
            .await
            .map_err(|e| LoadError::Io {
                path: source.to_path_buf(),
                source: e,
            })?;
        self.parse(source, &text)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::error::SinkError;
    use crate::publisher::PublishFn;
    use crate::settings::{SinkRef, producer_id};
    use crate::trace::TraceEvent;

    fn registry(built: &Arc<AtomicUsize>) -> SinkRegistry {
        let built = Arc::clone(built);
        SinkRegistry::new().with(
            "memory",
            move |_name: &str, _params: &Value| -> Result<SinkRef, SinkError> {
                built.fetch_add(1, Ordering::SeqCst);
                Ok(PublishFn::arc(|b: Vec<TraceEvent>| async move { Ok(b.len()) }))
            },
        )
    }

    fn parse(text: &str) -> Result<LoadedConfiguration, LoadError> {
        let built = Arc::new(AtomicUsize::new(0));
        JsonConfigurationLoader::new(registry(&built)).parse(Path::new("test.json"), text)
    }

    const DOC: &str = r#"{
        "service": { "sessionNamePrefix": "host" },
        "sinks": [
            { "name": "audit", "type": "memory", "parameters": { "table": "t1" },
              "buffering": { "intervalMs": 1000, "count": 10, "maxBufferSize": 600 },
              "sources": [
                { "name": "My-App", "level": "Warning", "matchAnyKeyword": 6,
                  "arguments": [["k", "v"]], "processFilters": ["worker.exe"] },
                { "id": "3f2504e0-4f89-11d3-9a0c-0305e82c3301" }
              ] },
            { "name": "console", "type": "Memory", "sources": [ { "name": "other" } ] }
        ]
    }"#;

    #[test]
    fn test_full_document_loads_without_constructing_sinks() {
        let built = Arc::new(AtomicUsize::new(0));
        let loader = JsonConfigurationLoader::new(registry(&built));
        let loaded = loader.parse(Path::new("test.json"), DOC).unwrap();

        assert!(loaded.is_complete());
        assert_eq!(loaded.service.session_name_prefix(), "host");
        assert_eq!(loaded.sinks.len(), 2);
        assert_eq!(built.load(Ordering::SeqCst), 0);

        let audit = &loaded.sinks[0];
        assert_eq!(audit.name(), "audit");
        assert_eq!(audit.sink().descriptor().kind(), "memory");
        assert!(!audit.sink().is_constructed());
        assert_eq!(audit.buffering().and_then(|b| b.interval), Some(Duration::from_secs(1)));

        let app = &audit.event_sources()[0];
        assert_eq!(app.id(), producer_id("my-app"));
        assert_eq!(app.level(), EventLevel::Warning);
        assert_eq!(app.match_any_keyword(), Keywords(6));
        assert_eq!(app.arguments(), &[("k".to_string(), "v".to_string())]);
        assert_eq!(app.process_filters(), Some(&["worker.exe".to_string()][..]));

        audit.sink().instance().unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fingerprint_ignores_sources_only() {
        let a = parse(r#"{"sinks":[{"name":"s","type":"memory","parameters":{"p":1},"sources":[{"name":"x"}]}]}"#)
            .unwrap();
        let b = parse(r#"{"sinks":[{"name":"s","type":"memory","parameters":{"p":1},"sources":[{"name":"y"}]}]}"#)
            .unwrap();
        let c = parse(r#"{"sinks":[{"name":"s","type":"memory","parameters":{"p":2},"sources":[{"name":"x"}]}]}"#)
            .unwrap();
        assert_eq!(a.sinks[0].fingerprint(), b.sinks[0].fingerprint());
        assert_ne!(a.sinks[0].fingerprint(), c.sinks[0].fingerprint());
    }

    #[test]
    fn test_bad_definitions_are_partial_failures() {
        let loaded = parse(
            r#"{"sinks":[
                {"name":"ok","type":"memory","sources":[{"name":"x"}]},
                {"name":"unknown","type":"carrier-pigeon","sources":[{"name":"x"}]},
                {"name":"anchorless","type":"memory","sources":[{"level":"error"}]},
                {"name":"empty","type":"memory","sources":[]},
                {"name":"typo","type":"memory","sourcez":[]},
                {"name":"loud","type":"memory","sources":[{"name":"x","level":"deafening"}]}
            ]}"#,
        )
        .unwrap();

        assert_eq!(loaded.sinks.len(), 1);
        assert_eq!(loaded.sinks[0].name(), "ok");

        let tagged: Vec<_> = loaded.errors.iter().map(|e| e.sink()).collect();
        assert_eq!(
            tagged,
            vec![
                Some("unknown"),
                Some("anchorless"),
                Some("empty"),
                Some("typo"),
                Some("loud")
            ]
        );
        assert_eq!(loaded.errors[0].as_label(), "config_unknown_sink_type");
    }

    #[test]
    fn test_duplicate_names_reject_whole_document() {
        let res = parse(
            r#"{"sinks":[
                {"name":"s","type":"memory","parameters":{"n":1},"sources":[{"name":"x"}]},
                {"name":"other","type":"memory","sources":[{"name":"x"}]},
                {"name":"s","type":"memory","parameters":{"n":2},"sources":[{"name":"x"}]}
            ]}"#,
        );
        match res {
            Err(LoadError::Invalid { errors, .. }) => {
                assert_eq!(errors.errors().len(), 1);
                assert_eq!(errors.errors()[0].as_label(), "config_duplicate_sink");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("duplicate sink names must not load"),
        }
    }

    #[test]
    fn test_wholesale_failures() {
        assert!(matches!(parse("{ nope"), Err(LoadError::Parse { .. })));
        assert!(matches!(
            parse(r#"{"service":{"sessionNamePrefix":""}}"#),
            Err(LoadError::Invalid { .. })
        ));

        let empty = parse("{}").unwrap();
        assert!(empty.sinks.is_empty());
        assert_eq!(empty.service, ServiceSettings::default());
    }

    #[tokio::test]
    async fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        tokio::fs::write(&path, DOC).await.unwrap();

        let built = Arc::new(AtomicUsize::new(0));
        let loader = JsonConfigurationLoader::new(registry(&built));
        let loaded = loader.load(&path).await.unwrap();
        assert_eq!(loaded.sinks.len(), 2);

        let missing = loader.load(&dir.path().join("missing.json")).await;
        assert!(matches!(missing, Err(LoadError::Io { .. })));
    }
}
