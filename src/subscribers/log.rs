//! # Logging subscriber.
//!
//! [`LogWriter`] renders diagnostics through `tracing`, with the event's
//! metadata as structured fields:
//!
//! ```text
//! WARN tracevisor: buffer capacity reached; dropping events sink="audit" capacity=30000
//! INFO tracevisor: sink replaced sink="audit"
//! ERROR tracevisor: configuration fault; previous configuration kept reason="..."
//! ```
//!
//! Enabled by the `logging` feature (on by default). Install a
//! `tracing-subscriber` (or any collector) in the host to see the output.

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Subscriber that logs every diagnostic through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let sink = e.sink.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::CapacityOverloaded => {
                tracing::warn!(target: "tracevisor", sink, capacity = e.capacity, "buffer capacity reached; dropping events");
            }
            EventKind::CapacityRestored => {
                tracing::info!(target: "tracevisor", sink, capacity = e.capacity, "buffer capacity restored");
            }
            EventKind::EventsLost => {
                tracing::warn!(target: "tracevisor", sink, count = e.count, "events lost while disposing");
            }
            EventKind::PublishFailed => {
                tracing::warn!(target: "tracevisor", sink, count = e.count, reason, "publish failed");
            }
            EventKind::PublishRejected => {
                tracing::warn!(target: "tracevisor", sink, count = e.count, "sink accepted no events");
            }
            EventKind::BackoffScheduled => {
                tracing::info!(target: "tracevisor", sink, delay_ms = e.delay_ms, attempt = e.attempt, "retrying after backoff");
            }
            EventKind::FlushFailed => {
                tracing::error!(target: "tracevisor", sink, reason, "flush failed");
            }
            EventKind::WorkerRestarted => {
                tracing::error!(target: "tracevisor", sink, reason, "publisher worker faulted and was restarted");
            }
            EventKind::SinkAdded => {
                tracing::info!(target: "tracevisor", sink, "sink added");
            }
            EventKind::SinkRemoved => {
                tracing::info!(target: "tracevisor", sink, "sink removed");
            }
            EventKind::SinkReplaced => {
                tracing::info!(target: "tracevisor", sink, "sink replaced");
            }
            EventKind::SourcesUpdated => {
                tracing::info!(target: "tracevisor", sink, count = e.count, "event sources updated");
            }
            EventKind::SinkUnavailable => {
                tracing::error!(target: "tracevisor", sink, reason, "sink could not be created");
            }
            EventKind::ServiceSettingsChanged => {
                tracing::warn!(target: "tracevisor", "service settings changed; restarting delivery");
            }
            EventKind::PipelineRestarted => {
                tracing::info!(target: "tracevisor", count = e.count, "pipeline restarted");
            }
            EventKind::ConfigurationApplied => {
                tracing::info!(target: "tracevisor", count = e.count, "configuration applied");
            }
            EventKind::ConfigurationFault => {
                tracing::error!(target: "tracevisor", sink, reason, "configuration fault; previous configuration kept");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(target: "tracevisor", subscriber = sink, reason, "subscriber panicked");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: "tracevisor", subscriber = sink, reason, "subscriber dropped a diagnostic");
            }
            EventKind::ShutdownGraceExceeded => {
                tracing::error!(target: "tracevisor", count = e.count, "shutdown grace exceeded");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
