//! # Example: live_reload
//!
//! Drive the sink set of a [`Pipeline`] from a JSON file that is edited
//! while events flow.
//!
//! Demonstrates how to:
//! - Register a sink type (`console`) in a [`SinkRegistry`].
//! - Start a [`ConfigurationWatcher`] on a configuration file.
//! - Edit the file and watch sinks being updated in place or replaced.
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► write v1 (sink "console", source "Demo-App")
//!   ├─► ConfigurationWatcher::start(pipeline, loader, path)
//!   ├─► dispatch events ──► console sink prints batches
//!   ├─► write v2 (same sink, more sources)   → SourcesUpdated (same instance)
//!   ├─► write v3 (different parameters)      → SinkReplaced (old one flushed)
//!   └─► watcher.stop(), pipeline.shutdown()
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example live_reload
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracevisor::{
    BufferingConfig, ConfigurationWatcher, JsonConfigurationLoader, Pipeline, PipelineConfig,
    PublishFn, SinkError, SinkRef, SinkRegistry, Subscribe, TraceEvent, producer_id,
};

const V1: &str = r#"{
  "sinks": [
    { "name": "console", "type": "console", "parameters": { "prefix": "v1" },
      "sources": [ { "name": "Demo-App" } ] }
  ]
}"#;

const V2: &str = r#"{
  "sinks": [
    { "name": "console", "type": "console", "parameters": { "prefix": "v1" },
      "sources": [ { "name": "Demo-App" }, { "name": "Demo-Worker" } ] }
  ]
}"#;

const V3: &str = r#"{
  "sinks": [
    { "name": "console", "type": "console", "parameters": { "prefix": "v3" },
      "sources": [ { "name": "Demo-App" }, { "name": "Demo-Worker" } ] }
  ]
}"#;

/// Builds a sink that prints every batch with the configured prefix.
fn console(name: &str, params: &Value) -> Result<SinkRef, SinkError> {
    let prefix = params
        .get("prefix")
        .and_then(Value::as_str)
        .ok_or_else(|| SinkError::construction(name, "missing 'prefix'"))?
        .to_string();

    Ok(PublishFn::arc(move |batch: Vec<TraceEvent>| {
        let prefix = prefix.clone();
        async move {
            for ev in &batch {
                println!("[{prefix}] producer={} event={}", ev.producer_id, ev.event_id);
            }
            Ok(batch.len())
        }
    }))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // 1) Runtime: small batches and a short debounce keep the demo snappy
    let cfg = PipelineConfig {
        buffering: BufferingConfig {
            interval: Some(Duration::from_millis(500)),
            count: 2,
            max_buffer_size: 500,
            ..Default::default()
        },
        debounce: Duration::from_millis(200),
        ..PipelineConfig::default()
    };

    #[cfg(feature = "logging")]
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(tracevisor::LogWriter)];
    #[cfg(not(feature = "logging"))]
    let subs: Vec<Arc<dyn Subscribe>> = Vec::new();

    let pipeline = Pipeline::builder(cfg).with_subscribers(subs).build()?;

    // 2) Configuration file + loader with one sink type
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tracevisor.json");
    tokio::fs::write(&path, V1).await?;

    let loader = Arc::new(JsonConfigurationLoader::new(
        SinkRegistry::new().with("console", console),
    ));
    let watcher = ConfigurationWatcher::start(Arc::clone(&pipeline), loader, &path).await?;

    // 3) Edit the file between bursts of events
    let mut next_id = 0u32;
    for doc in [V2, V3] {
        for producer in ["Demo-App", "Demo-Worker"] {
            next_id += 1;
            let routed = pipeline.dispatch(&TraceEvent::new(producer_id(producer), next_id, &b""[..]));
            println!("event {next_id} from {producer} routed to {routed} sink(s)");
        }
        pipeline.flush_all().await?;

        let reloads = watcher.reloads();
        tokio::fs::write(&path, doc).await?;
        while watcher.reloads() == reloads {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        println!("reloaded; live sinks: {:?}", pipeline.sink_names());
    }

    next_id += 1;
    pipeline.dispatch(&TraceEvent::new(producer_id("Demo-Worker"), next_id, &b""[..]));

    // 4) Stop watching, then drain everything
    watcher.stop().await;
    pipeline.shutdown().await?;
    Ok(())
}
