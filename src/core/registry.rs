//! # Per-sink publisher registry and routing.
//!
//! Holds one [`SinkRuntime`] per live sink: its publisher (absent when the
//! sink instance could not be constructed) and the set of producers it is
//! subscribed to.
//!
//! ## Rules
//! - Routing is by producer id only; level and keyword filtering belong to
//!   the tracing provider.
//! - Posting never blocks: the registry lock is a short read lock and
//!   `try_post` is non-blocking.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::publisher::BufferedEventPublisher;
use crate::trace::TraceEvent;

/// Publisher handle shared between the registry and in-flight flushes.
pub(crate) type SinkPublisher = Arc<BufferedEventPublisher<TraceEvent>>;

/// Runtime state of one live sink.
pub(crate) struct SinkRuntime {
    pub(crate) publisher: Option<SinkPublisher>,
    pub(crate) producers: HashSet<Uuid>,
}

/// Live sinks by name.
#[derive(Default)]
pub(crate) struct PublisherRegistry {
    sinks: RwLock<HashMap<String, SinkRuntime>>,
}

impl PublisherRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers `runtime`, returning the one it displaced.
    pub(crate) fn insert(&self, name: &str, runtime: SinkRuntime) -> Option<SinkRuntime> {
        self.sinks.write().insert(name.to_string(), runtime)
    }

    pub(crate) fn remove(&self, name: &str) -> Option<SinkRuntime> {
        self.sinks.write().remove(name)
    }

    /// Removes every runtime.
    pub(crate) fn drain(&self) -> Vec<(String, SinkRuntime)> {
        self.sinks.write().drain().collect()
    }

    /// Replaces the subscriptions of `name`. Returns false if it is not live.
    pub(crate) fn set_producers(&self, name: &str, producers: HashSet<Uuid>) -> bool {
        match self.sinks.write().get_mut(name) {
            Some(runtime) => {
                runtime.producers = producers;
                true
            }
            None => false,
        }
    }

    pub(crate) fn publisher(&self, name: &str) -> Option<SinkPublisher> {
        self.sinks.read().get(name).and_then(|r| r.publisher.clone())
    }

    /// Every available publisher, by sink name.
    pub(crate) fn publishers(&self) -> Vec<(String, SinkPublisher)> {
        self.sinks
            .read()
            .iter()
            .filter_map(|(name, r)| r.publisher.clone().map(|p| (name.clone(), p)))
            .collect()
    }

    /// Posts `event` to every sink subscribed to its producer.
    ///
    /// Returns how many sinks accepted it.
    pub(crate) fn route(&self, event: &TraceEvent) -> usize {
        self.sinks
            .read()
            .values()
            .filter(|r| r.producers.contains(&event.producer_id))
            .filter_map(|r| r.publisher.as_ref())
            .filter(|p| p.try_post(event.clone()))
            .count()
    }

    /// Sorted names of live sinks.
    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sinks.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::publisher::{BufferingConfig, PublishFn, PublisherRef};
    use crate::settings::producer_id;

    fn runtime(producers: &[&str], sink: Option<PublisherRef<TraceEvent>>) -> SinkRuntime {
        let options = BufferingConfig {
            interval: None,
            count: 1,
            max_buffer_size: 500,
            ..Default::default()
        }
        .validate()
        .unwrap();
        SinkRuntime {
            publisher: sink.map(|s| {
                Arc::new(
                    BufferedEventPublisher::builder("s", s)
                        .options(options)
                        .build()
                        .unwrap(),
                )
            }),
            producers: producers.iter().map(|p| producer_id(p)).collect(),
        }
    }

    #[tokio::test]
    async fn test_route_by_producer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let sink: PublisherRef<TraceEvent> = PublishFn::arc(move |batch: Vec<TraceEvent>| {
            let s = Arc::clone(&s);
            async move {
                s.lock().extend(batch.iter().map(|e| e.event_id));
                Ok(batch.len())
            }
        });

        let registry = PublisherRegistry::new();
        registry.insert("a", runtime(&["app"], Some(Arc::clone(&sink))));
        registry.insert("b", runtime(&["other"], Some(sink)));
        registry.insert("dead", runtime(&["app"], None));

        assert_eq!(registry.route(&TraceEvent::new(producer_id("app"), 1, "x")), 1);
        assert_eq!(registry.route(&TraceEvent::new(producer_id("nobody"), 2, "x")), 0);

        registry.publisher("a").unwrap().flush().await.unwrap();
        assert_eq!(*seen.lock(), vec![1]);
        assert_eq!(registry.names(), vec!["a", "b", "dead"]);
        assert_eq!(registry.publishers().len(), 2);
    }

    #[tokio::test]
    async fn test_set_producers_reroutes() {
        let sink: PublisherRef<TraceEvent> =
            PublishFn::arc(|batch: Vec<TraceEvent>| async move { Ok(batch.len()) });
        let registry = PublisherRegistry::new();
        registry.insert("a", runtime(&["app"], Some(sink)));

        let other = TraceEvent::new(producer_id("other"), 1, "x");
        assert_eq!(registry.route(&other), 0);
        assert!(registry.set_producers("a", [producer_id("other")].into_iter().collect()));
        assert_eq!(registry.route(&other), 1);
        assert!(!registry.set_producers("missing", HashSet::new()));

        assert!(registry.remove("a").is_some());
        assert!(registry.drain().is_empty());
    }
}
