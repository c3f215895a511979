//! # Pipeline: live sinks, routing, and reconfiguration.
//!
//! The [`Pipeline`] owns the [`LiveConfiguration`], one
//! [`BufferedEventPublisher`] per live sink, the diagnostic [`Bus`] and the
//! [`SubscriberSet`] that diagnostics are forwarded to.
//!
//! ## Architecture
//! ```text
//! tracing provider ──► dispatch(event) ──► registry (by producer id) ──► publisher × N
//!
//! apply(candidate):
//!   reconcile(live, candidate) ──► ReconcileOutcome
//!       ├─ Removed         → unroute, flush (≤ removal_flush_timeout), dispose
//!       ├─ Replaced        → route new publisher, then retire the old one
//!       ├─ SourcesUpdated  → reroute only (publisher untouched)
//!       ├─ Added           → construct sink on first use, route new publisher
//!       └─ restart         → retire every publisher, rebuild all sinks
//!
//! diagnostics: publishers / pipeline ──► Bus ──► listener ──► SubscriberSet
//! ```
//!
//! ## Rules
//! - `apply` calls are serialized; `dispatch` and `post` never wait for them.
//! - A sink whose instance cannot be constructed stays in the configuration
//!   but receives nothing (`SinkUnavailable` is reported).
//! - Errors in a candidate never remove a running sink: failed definitions
//!   are replaced by their live counterpart (see [`Pipeline::apply_loaded`]).

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::select;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::builder::PipelineBuilder;
use super::config::PipelineConfig;
use super::registry::{PublisherRegistry, SinkPublisher, SinkRuntime};
use crate::error::{ConfigErrors, FlushError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::loader::LoadedConfiguration;
use crate::publisher::BufferedEventPublisher;
use crate::reconcile::{LiveConfiguration, ReconcileOutcome, SinkChange, reconcile};
use crate::settings::{Configuration, ServiceSettings, SinkRef, SinkSettings};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::trace::TraceEvent;

/// Host runtime for live sinks.
pub struct Pipeline {
    cfg: PipelineConfig,
    bus: Bus,
    live: Mutex<LiveConfiguration>,
    publishers: PublisherRegistry,
    apply_lock: tokio::sync::Mutex<()>,
    token: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Pipeline {
    /// Starts building a pipeline.
    pub fn builder(cfg: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(cfg)
    }

    pub(super) fn new_internal(cfg: PipelineConfig, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let token = CancellationToken::new();
        let subs = SubscriberSet::new(subscribers, bus.clone());
        let listener = spawn_listener(&bus, subs, token.clone());

        Self {
            cfg,
            bus,
            live: Mutex::new(LiveConfiguration::default()),
            publishers: PublisherRegistry::new(),
            apply_lock: tokio::sync::Mutex::new(()),
            token,
            listener: Mutex::new(Some(listener)),
        }
    }

    /// Runtime configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    /// Diagnostic bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Snapshot of the configuration in effect.
    pub fn live(&self) -> LiveConfiguration {
        self.live.lock().clone()
    }

    /// Service settings in effect.
    pub fn service(&self) -> ServiceSettings {
        self.live.lock().service().clone()
    }

    /// Sorted names of live sinks.
    pub fn sink_names(&self) -> Vec<String> {
        self.publishers.names()
    }

    /// Publisher of a live sink, if its instance is available.
    pub fn publisher(&self, sink: &str) -> Option<Arc<BufferedEventPublisher<TraceEvent>>> {
        self.publishers.publisher(sink)
    }

    /// Posts `event` to one sink. Returns false if the sink is unknown,
    /// unavailable or full.
    pub fn post(&self, sink: &str, event: TraceEvent) -> bool {
        self.publishers
            .publisher(sink)
            .is_some_and(|p| p.try_post(event))
    }

    /// Posts `event` to every sink subscribed to its producer.
    ///
    /// Returns how many sinks accepted it.
    pub fn dispatch(&self, event: &TraceEvent) -> usize {
        self.publishers.route(event)
    }

    /// Reconciles `candidate` into the live configuration and syncs publishers.
    pub async fn apply(&self, candidate: Configuration) -> ReconcileOutcome {
        let _serial = self.apply_lock.lock().await;
        let outcome = reconcile(&mut self.live.lock(), candidate);

        if outcome.restart_required {
            self.restart().await;
        } else {
            for change in &outcome.changes {
                self.sync(change).await;
            }
        }

        if !outcome.is_empty() {
            tracing::debug!(changes = outcome.changes.len(), restart = outcome.restart_required, "configuration applied");
            self.bus.publish(
                Event::new(EventKind::ConfigurationApplied).with_count(outcome.changes.len()),
            );
        }
        outcome
    }

    /// Applies a (possibly partial) load.
    ///
    /// Each load error is reported as `ConfigurationFault`. A sink whose
    /// definition failed but which is live is carried over unchanged.
    pub async fn apply_loaded(
        &self,
        loaded: LoadedConfiguration,
    ) -> Result<ReconcileOutcome, ConfigErrors> {
        let LoadedConfiguration {
            service,
            mut sinks,
            errors,
        } = loaded;

        {
            let live = self.live.lock();
            for err in &errors {
                let mut ev = Event::new(EventKind::ConfigurationFault).with_reason(err.to_string());
                if let Some(name) = err.sink() {
                    ev = ev.with_sink(name);
                    if !sinks.iter().any(|s| s.name() == name) {
                        if let Some(current) = live.sink(name) {
                            sinks.push(current.clone());
                        }
                    }
                }
                self.bus.publish(ev);
            }
        }

        let candidate = Configuration::new(service, sinks)?;
        Ok(self.apply(candidate).await)
    }

    /// Flushes every publisher concurrently; returns the first failure.
    pub async fn flush_all(&self) -> Result<(), FlushError> {
        let results = join_all(
            self.publishers
                .publishers()
                .into_iter()
                .map(|(_, p)| p.flush()),
        )
        .await;
        results.into_iter().collect()
    }

    /// Flushes every sink within `grace`, then disposes everything.
    ///
    /// Sinks that failed to drain in time are listed in the error; their
    /// buffered events are reported as lost.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let _serial = self.apply_lock.lock().await;
        let grace = self.cfg.grace;

        let drained = join_all(self.publishers.drain().into_iter().filter_map(|(name, rt)| {
            rt.publisher.map(|p| async move {
                let ok = matches!(time::timeout(grace, p.flush()).await, Ok(Ok(())));
                p.dispose();
                (name, ok)
            })
        }))
        .await;

        let mut stuck: Vec<String> = drained
            .into_iter()
            .filter_map(|(name, ok)| (!ok).then_some(name))
            .collect();
        stuck.sort_unstable();

        if !stuck.is_empty() {
            self.bus
                .publish(Event::new(EventKind::ShutdownGraceExceeded).with_count(stuck.len()));
        }

        self.token.cancel();
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            let _ = listener.await;
        }

        if stuck.is_empty() {
            Ok(())
        } else {
            Err(RuntimeError::ShutdownGraceExceeded { grace, stuck })
        }
    }

    async fn sync(&self, change: &SinkChange) {
        match change {
            SinkChange::Removed(old) => {
                let retired = self.publishers.remove(old.name());
                self.retire(retired.into_iter().collect()).await;
                self.bus
                    .publish(Event::new(EventKind::SinkRemoved).with_sink(old.name()));
            }
            SinkChange::Replaced { new, .. } => {
                let retired = self.publishers.insert(new.name(), self.activate(new));
                self.retire(retired.into_iter().collect()).await;
                self.bus
                    .publish(Event::new(EventKind::SinkReplaced).with_sink(new.name()));
            }
            SinkChange::SourcesUpdated { name, .. } => {
                let producers: HashSet<_> = self
                    .live
                    .lock()
                    .sink(name)
                    .map(|s| s.producer_ids().collect())
                    .unwrap_or_default();
                let count = producers.len();
                self.publishers.set_producers(name, producers);
                self.bus.publish(
                    Event::new(EventKind::SourcesUpdated)
                        .with_sink(name.as_str())
                        .with_count(count),
                );
            }
            SinkChange::Added(new) => {
                let runtime = self.activate(new);
                self.publishers.insert(new.name(), runtime);
                self.bus
                    .publish(Event::new(EventKind::SinkAdded).with_sink(new.name()));
            }
        }
    }

    async fn restart(&self) {
        self.bus.publish(Event::new(EventKind::ServiceSettingsChanged));

        let retired = self.publishers.drain().into_iter().map(|(_, rt)| rt).collect();
        self.retire(retired).await;

        let sinks: Vec<SinkSettings> = self.live.lock().sinks().to_vec();
        for sink in &sinks {
            self.publishers.insert(sink.name(), self.activate(sink));
        }
        self.bus
            .publish(Event::new(EventKind::PipelineRestarted).with_count(sinks.len()));
    }

    /// Constructs the sink (first use) and its publisher.
    fn activate(&self, settings: &SinkSettings) -> SinkRuntime {
        let producers = settings.producer_ids().collect();
        let publisher = match settings.sink().instance() {
            Ok(sink) => match self.build_publisher(settings, sink) {
                Ok(publisher) => Some(Arc::new(publisher)),
                Err(errs) => {
                    self.unavailable(settings.name(), errs.to_string());
                    None
                }
            },
            Err(err) => {
                self.unavailable(settings.name(), err.to_string());
                None
            }
        };
        SinkRuntime {
            publisher,
            producers,
        }
    }

    fn build_publisher(
        &self,
        settings: &SinkSettings,
        sink: SinkRef,
    ) -> Result<BufferedEventPublisher<TraceEvent>, ConfigErrors> {
        let options = settings
            .buffering()
            .unwrap_or(&self.cfg.buffering)
            .validate()?;
        BufferedEventPublisher::builder(settings.name(), sink)
            .options(options)
            .bus(self.bus.clone())
            .build()
    }

    fn unavailable(&self, sink: &str, reason: String) {
        tracing::debug!(sink, %reason, "sink unavailable");
        self.bus.publish(
            Event::new(EventKind::SinkUnavailable)
                .with_sink(sink)
                .with_reason(reason),
        );
    }

    /// Flush-then-dispose, bounded by `removal_flush_timeout`.
    async fn retire(&self, runtimes: Vec<SinkRuntime>) {
        let budget = self.cfg.removal_flush_budget();
        let publishers: Vec<SinkPublisher> = runtimes.into_iter().filter_map(|rt| rt.publisher).collect();

        join_all(publishers.into_iter().map(|p| async move {
            if let Some(budget) = budget {
                match time::timeout(budget, p.flush()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        tracing::debug!(sink = p.sink_id(), error = %err, "flush before removal failed");
                    }
                    Err(_) => {
                        tracing::debug!(sink = p.sink_id(), "flush before removal timed out");
                    }
                }
            }
            p.dispose();
        }))
        .await;
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Forwards bus diagnostics to the subscriber set until cancelled.
fn spawn_listener(bus: &Bus, set: SubscriberSet, token: CancellationToken) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            select! {
                biased;
                msg = rx.recv() => match msg {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "diagnostic listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = token.cancelled() => break,
            }
        }
        while let Ok(ev) = rx.try_recv() {
            set.emit(&ev);
        }
        set.shutdown().await;
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::broadcast;

    use super::*;
    use crate::error::{ConfigError, SinkError};
    use crate::publisher::PublishFn;
    use crate::settings::{EventSourceSettings, Fingerprint, SinkHandle, producer_id};

    type Seen = Arc<Mutex<Vec<TraceEvent>>>;

    fn collector() -> (SinkRef, Seen) {
        let seen: Seen = Arc::default();
        let s = Arc::clone(&seen);
        let sink: SinkRef = PublishFn::arc(move |batch: Vec<TraceEvent>| {
            let s = Arc::clone(&s);
            async move {
                let n = batch.len();
                s.lock().extend(batch);
                Ok(n)
            }
        });
        (sink, seen)
    }

    fn sink(name: &str, handle: SinkRef, sources: &[&str], version: &str) -> SinkSettings {
        SinkSettings::builder(name, SinkHandle::eager("mock", handle))
            .sources(
                sources
                    .iter()
                    .map(|s| EventSourceSettings::named(*s).unwrap()),
            )
            .fingerprint(Fingerprint::of(version.as_bytes()))
            .build()
            .unwrap()
    }

    fn config(sinks: Vec<SinkSettings>) -> Configuration {
        Configuration::new(ServiceSettings::default(), sinks).unwrap()
    }

    fn pipeline() -> Arc<Pipeline> {
        Pipeline::builder(PipelineConfig::default()).build().unwrap()
    }

    fn event(producer: &str, id: u32) -> TraceEvent {
        TraceEvent::new(producer_id(producer), id, &b""[..])
    }

    fn kinds(rx: &mut broadcast::Receiver<Event>) -> Vec<EventKind> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev.kind);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_added_sink_receives_routed_events() {
        let p = pipeline();
        let (handle, seen) = collector();

        let outcome = p.apply(config(vec![sink("a", handle, &["P1"], "v1")])).await;
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(p.sink_names(), vec!["a".to_string()]);

        assert_eq!(p.dispatch(&event("P1", 1)), 1);
        assert_eq!(p.dispatch(&event("P2", 2)), 0);
        p.flush_all().await.unwrap();

        let ids: Vec<u32> = seen.lock().iter().map(|e| e.event_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sources_update_keeps_publisher() {
        let p = pipeline();
        let (handle, seen) = collector();

        p.apply(config(vec![sink("a", Arc::clone(&handle), &["P1"], "v1")]))
            .await;
        let before = p.publisher("a").unwrap();

        let mut rx = p.bus().subscribe();
        let outcome = p
            .apply(config(vec![sink("a", handle, &["P2"], "v1")]))
            .await;
        assert!(matches!(
            outcome.changes.as_slice(),
            [SinkChange::SourcesUpdated { .. }]
        ));
        assert!(Arc::ptr_eq(&before, &p.publisher("a").unwrap()));
        assert!(kinds(&mut rx).contains(&EventKind::SourcesUpdated));

        assert_eq!(p.dispatch(&event("P1", 1)), 0);
        assert_eq!(p.dispatch(&event("P2", 2)), 1);
        p.flush_all().await.unwrap();
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replaced_sink_flushes_old_publisher() {
        let p = pipeline();
        let (old_handle, old_seen) = collector();
        let (new_handle, new_seen) = collector();

        p.apply(config(vec![sink("a", old_handle, &["P1"], "v1")]))
            .await;
        let before = p.publisher("a").unwrap();
        assert_eq!(p.dispatch(&event("P1", 1)), 1);

        p.apply(config(vec![sink("a", new_handle, &["P1"], "v2")]))
            .await;
        assert!(before.is_disposed());
        assert_eq!(old_seen.lock().len(), 1);

        assert_eq!(p.dispatch(&event("P1", 2)), 1);
        p.flush_all().await.unwrap();
        assert_eq!(new_seen.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_sink_is_flushed_then_disposed() {
        let p = pipeline();
        let (handle, seen) = collector();

        p.apply(config(vec![sink("a", handle, &["P1"], "v1")])).await;
        let before = p.publisher("a").unwrap();
        p.dispatch(&event("P1", 1));

        let mut rx = p.bus().subscribe();
        p.apply(config(vec![])).await;

        assert!(before.is_disposed());
        assert_eq!(seen.lock().len(), 1);
        assert!(p.sink_names().is_empty());
        assert!(kinds(&mut rx).contains(&EventKind::SinkRemoved));
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_change_rebuilds_every_publisher() {
        let p = pipeline();
        let (handle, _seen) = collector();

        p.apply(config(vec![sink("a", Arc::clone(&handle), &["P1"], "v1")]))
            .await;
        let before = p.publisher("a").unwrap();

        let mut rx = p.bus().subscribe();
        let candidate = Configuration::new(
            ServiceSettings::new("other").unwrap(),
            vec![sink("a", handle, &["P1"], "v1")],
        )
        .unwrap();
        let outcome = p.apply(candidate).await;

        assert!(outcome.restart_required);
        assert!(before.is_disposed());
        assert!(!Arc::ptr_eq(&before, &p.publisher("a").unwrap()));
        assert_eq!(p.service().session_name_prefix(), "other");

        let seen = kinds(&mut rx);
        assert!(seen.contains(&EventKind::ServiceSettingsChanged));
        assert!(seen.contains(&EventKind::PipelineRestarted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconstructible_sink_is_reported_and_skipped() {
        let p = pipeline();
        let handle = SinkHandle::deferred("broken", || {
            Err(SinkError::construction("a", "no endpoint"))
        });
        let settings = SinkSettings::builder("a", handle)
            .source(EventSourceSettings::named("P1").unwrap())
            .build()
            .unwrap();

        let mut rx = p.bus().subscribe();
        p.apply(config(vec![settings])).await;

        assert_eq!(p.sink_names(), vec!["a".to_string()]);
        assert!(p.publisher("a").is_none());
        assert_eq!(p.dispatch(&event("P1", 1)), 0);
        assert!(!p.post("a", event("P1", 2)));
        assert!(kinds(&mut rx).contains(&EventKind::SinkUnavailable));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_load_keeps_failed_sink_running() {
        let p = pipeline();
        let (handle, _seen) = collector();

        p.apply(config(vec![sink("a", handle, &["P1"], "v1")])).await;
        let before = p.publisher("a").unwrap();

        let mut rx = p.bus().subscribe();
        let loaded = LoadedConfiguration {
            service: ServiceSettings::default(),
            sinks: vec![],
            errors: vec![ConfigError::InvalidSink {
                sink: "a".into(),
                reason: "bad".into(),
            }],
        };
        let outcome = p.apply_loaded(loaded).await.unwrap();

        assert!(outcome.is_empty());
        assert!(Arc::ptr_eq(&before, &p.publisher("a").unwrap()));
        assert_eq!(kinds(&mut rx), vec![EventKind::ConfigurationFault]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_all_sinks() {
        let p = pipeline();
        let (handle, seen) = collector();

        p.apply(config(vec![sink("a", handle, &["P1"], "v1")])).await;
        p.dispatch(&event("P1", 1));
        p.dispatch(&event("P1", 2));

        p.shutdown().await.unwrap();
        assert_eq!(seen.lock().len(), 2);
        assert!(p.sink_names().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_reports_stuck_sinks() {
        let cfg = PipelineConfig {
            grace: Duration::from_secs(1),
            ..PipelineConfig::default()
        };
        let p = Pipeline::builder(cfg).build().unwrap();
        let rejecting: SinkRef = PublishFn::arc(|_batch: Vec<TraceEvent>| async { Ok(0) });

        p.apply(config(vec![sink("stuck", rejecting, &["P1"], "v1")]))
            .await;
        p.dispatch(&event("P1", 1));

        match p.shutdown().await {
            Err(RuntimeError::ShutdownGraceExceeded { stuck, .. }) => {
                assert_eq!(stuck, vec!["stuck".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
