//! # Reconciliation: diff a candidate configuration into the live one.
//!
//! ```text
//! reconcile(live, candidate)
//!   ├─► service settings differ → adopt candidate wholesale, restart_required
//!   ├─► live sink absent from candidate                  → Removed
//!   ├─► sink in both:
//!   │     ├─ fingerprint differs → drop old, append new   → Replaced
//!   │     ├─ sources differ (full) → swap sources in place → SourcesUpdated
//!   │     └─ otherwise → untouched (same handle, same position)
//!   └─► candidate sink absent from live                  → Added (appended)
//! ```
//!
//! ## Rules
//! - Synchronous; never suspends.
//! - Minimal: unchanged sinks keep their [`SinkHandle`](crate::SinkHandle)
//!   and position, and produce no change record.
//! - A sources-only update never touches the sink instance.

use super::comparers::{SourceComparison, same_service, same_sink};
use crate::settings::{Configuration, EventSourceSettings, ServiceSettings, SinkSettings};

/// The configuration currently in effect.
#[derive(Clone, Debug, Default)]
pub struct LiveConfiguration {
    service: ServiceSettings,
    sinks: Vec<SinkSettings>,
}

impl LiveConfiguration {
    /// Adopts a validated configuration as-is.
    pub fn new(config: Configuration) -> Self {
        let (service, sinks) = config.into_parts();
        Self { service, sinks }
    }

    /// Global settings in effect.
    pub fn service(&self) -> &ServiceSettings {
        &self.service
    }

    /// Live sinks, in order.
    pub fn sinks(&self) -> &[SinkSettings] {
        &self.sinks
    }

    /// Looks a live sink up by name.
    pub fn sink(&self, name: &str) -> Option<&SinkSettings> {
        self.sinks.iter().find(|s| s.name() == name)
    }

    /// Number of live sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sink is live.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

/// One mutation applied to the live configuration.
#[derive(Clone, Debug)]
pub enum SinkChange {
    /// The sink was removed.
    Removed(SinkSettings),
    /// The sink definition changed; `old` was removed and `new` appended.
    Replaced {
        /// Settings that were live.
        old: SinkSettings,
        /// Settings now live.
        new: SinkSettings,
    },
    /// Only subscriptions changed; the instance was kept.
    SourcesUpdated {
        /// Sink name.
        name: String,
        /// Subscriptions before the update.
        previous: Vec<EventSourceSettings>,
    },
    /// The sink was added.
    Added(SinkSettings),
}

impl SinkChange {
    /// Name of the affected sink.
    pub fn sink_name(&self) -> &str {
        match self {
            SinkChange::Removed(s) | SinkChange::Added(s) => s.name(),
            SinkChange::Replaced { new, .. } => new.name(),
            SinkChange::SourcesUpdated { name, .. } => name,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SinkChange::Removed(_) => "sink_removed",
            SinkChange::Replaced { .. } => "sink_replaced",
            SinkChange::SourcesUpdated { .. } => "sources_updated",
            SinkChange::Added(_) => "sink_added",
        }
    }
}

/// What [`reconcile`] did.
#[derive(Clone, Debug, Default)]
pub struct ReconcileOutcome {
    /// Service settings changed: the candidate was adopted wholesale and
    /// delivery must be rebuilt. `changes` is empty in that case.
    pub restart_required: bool,
    /// Applied mutations, in application order.
    pub changes: Vec<SinkChange>,
}

impl ReconcileOutcome {
    /// True if nothing changed.
    pub fn is_empty(&self) -> bool {
        !self.restart_required && self.changes.is_empty()
    }
}

/// Applies the minimal set of changes turning `live` into `candidate`.
pub fn reconcile(live: &mut LiveConfiguration, candidate: Configuration) -> ReconcileOutcome {
    let (service, candidates) = candidate.into_parts();

    if !same_service(&live.service, &service) {
        live.service = service;
        live.sinks = candidates;
        return ReconcileOutcome {
            restart_required: true,
            changes: Vec::new(),
        };
    }

    let mut changes = Vec::new();

    let (kept, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut live.sinks)
        .into_iter()
        .partition(|s| candidates.iter().any(|c| same_sink(c, s)));
    changes.extend(removed.into_iter().map(SinkChange::Removed));
    live.sinks = kept;

    let mut appended = Vec::new();
    live.sinks.retain_mut(|current| {
        let Some(next) = candidates.iter().find(|c| same_sink(c, current)) else {
            return true;
        };
        if next.fingerprint() != current.fingerprint() {
            changes.push(SinkChange::Replaced {
                old: current.clone(),
                new: next.clone(),
            });
            appended.push(next.clone());
            false
        } else if !SourceComparison::Full.same_sources(current.event_sources(), next.event_sources()) {
            let previous = current.event_sources().to_vec();
            current.set_event_sources(next.event_sources().to_vec());
            changes.push(SinkChange::SourcesUpdated {
                name: current.name().to_string(),
                previous,
            });
            true
        } else {
            true
        }
    });
    live.sinks.extend(appended);

    for next in candidates {
        if !live.sinks.iter().any(|s| same_sink(s, &next)) {
            changes.push(SinkChange::Added(next.clone()));
            live.sinks.push(next);
        }
    }

    ReconcileOutcome {
        restart_required: false,
        changes,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::publisher::PublishFn;
    use crate::settings::{Fingerprint, SinkHandle};
    use crate::trace::{EventLevel, TraceEvent};

    fn handle(kind: &str) -> Arc<SinkHandle> {
        Arc::new(SinkHandle::eager(
            kind,
            PublishFn::arc(|b: Vec<TraceEvent>| async move { Ok(b.len()) }),
        ))
    }

    fn sink(name: &str, fp: &str, sources: &[&str]) -> SinkSettings {
        SinkSettings::builder(name, handle("memory"))
            .fingerprint(Fingerprint::of(fp.as_bytes()))
            .sources(
                sources
                    .iter()
                    .map(|s| EventSourceSettings::named(*s).unwrap()),
            )
            .build()
            .unwrap()
    }

    fn config(sinks: Vec<SinkSettings>) -> Configuration {
        Configuration::new(ServiceSettings::default(), sinks).unwrap()
    }

    fn names(live: &LiveConfiguration) -> Vec<&str> {
        live.sinks().iter().map(SinkSettings::name).collect()
    }

    fn labels(outcome: &ReconcileOutcome) -> Vec<(&'static str, &str)> {
        outcome
            .changes
            .iter()
            .map(|c| (c.as_label(), c.sink_name()))
            .collect()
    }

    #[test]
    fn test_identical_candidate_changes_nothing() {
        let a = sink("a", "1", &["x"]);
        let b = sink("b", "2", &["y", "z"]);
        let mut live = LiveConfiguration::new(config(vec![a.clone(), b.clone()]));

        let candidate = config(vec![
            sink("b", "2", &["z", "y"]),
            sink("a", "1", &["x"]),
        ]);
        let outcome = reconcile(&mut live, candidate);

        assert!(outcome.is_empty());
        assert_eq!(names(&live), vec!["a", "b"]);
        assert!(Arc::ptr_eq(live.sinks()[0].sink(), a.sink()));
        assert!(Arc::ptr_eq(live.sinks()[1].sink(), b.sink()));
    }

    #[test]
    fn test_fingerprint_change_replaces_sink() {
        let a = sink("a", "1", &["x"]);
        let b = sink("b", "2", &["y"]);
        let mut live = LiveConfiguration::new(config(vec![a.clone(), b]));

        let new_a = sink("a", "1-changed", &["x"]);
        let outcome = reconcile(&mut live, config(vec![new_a.clone(), sink("b", "2", &["y"])]));

        assert_eq!(labels(&outcome), vec![("sink_replaced", "a")]);
        assert_eq!(names(&live), vec!["b", "a"]);
        let SinkChange::Replaced { old, new } = &outcome.changes[0] else {
            panic!("expected replacement");
        };
        assert!(Arc::ptr_eq(old.sink(), a.sink()));
        assert!(Arc::ptr_eq(new.sink(), new_a.sink()));
        assert!(Arc::ptr_eq(live.sink("a").unwrap().sink(), new_a.sink()));
    }

    #[test]
    fn test_sources_only_change_keeps_instance() {
        let a = sink("a", "1", &["x"]);
        let mut live = LiveConfiguration::new(config(vec![a.clone()]));

        let outcome = reconcile(&mut live, config(vec![sink("a", "1", &["x", "y"])]));

        assert_eq!(labels(&outcome), vec![("sources_updated", "a")]);
        let SinkChange::SourcesUpdated { previous, .. } = &outcome.changes[0] else {
            panic!("expected sources update");
        };
        assert_eq!(previous.len(), 1);

        let current = live.sink("a").unwrap();
        assert!(Arc::ptr_eq(current.sink(), a.sink()));
        assert_eq!(current.event_sources().len(), 2);
    }

    #[test]
    fn test_level_change_is_a_sources_update() {
        let mut live = LiveConfiguration::new(config(vec![sink("a", "1", &["x"])]));
        let louder = SinkSettings::builder("a", handle("memory"))
            .fingerprint(Fingerprint::of(b"1"))
            .source(
                EventSourceSettings::builder()
                    .name("x")
                    .level(EventLevel::Error)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();

        let outcome = reconcile(&mut live, config(vec![louder]));
        assert_eq!(labels(&outcome), vec![("sources_updated", "a")]);
        assert_eq!(live.sink("a").unwrap().event_sources()[0].level(), EventLevel::Error);
    }

    #[test]
    fn test_removals_then_additions() {
        let mut live = LiveConfiguration::new(config(vec![
            sink("a", "1", &["x"]),
            sink("b", "2", &["x"]),
            sink("c", "3", &["x"]),
        ]));

        let outcome = reconcile(
            &mut live,
            config(vec![
                sink("d", "4", &["x"]),
                sink("c", "3", &["x"]),
                sink("e", "5", &["x"]),
            ]),
        );

        assert_eq!(
            labels(&outcome),
            vec![
                ("sink_removed", "a"),
                ("sink_removed", "b"),
                ("sink_added", "d"),
                ("sink_added", "e"),
            ]
        );
        assert_eq!(names(&live), vec!["c", "d", "e"]);
    }

    #[test]
    fn test_service_change_requires_restart() {
        let a = sink("a", "1", &["x"]);
        let mut live = LiveConfiguration::new(config(vec![a]));

        let candidate = Configuration::new(
            ServiceSettings::new("other").unwrap(),
            vec![sink("a", "2", &["x"]), sink("b", "3", &["y"])],
        )
        .unwrap();
        let outcome = reconcile(&mut live, candidate);

        assert!(outcome.restart_required);
        assert!(outcome.changes.is_empty());
        assert_eq!(live.service().session_name_prefix(), "other");
        assert_eq!(names(&live), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_candidate_removes_everything() {
        let mut live = LiveConfiguration::new(config(vec![sink("a", "1", &["x"])]));
        let outcome = reconcile(&mut live, config(Vec::new()));
        assert_eq!(labels(&outcome), vec![("sink_removed", "a")]);
        assert!(live.is_empty());
    }
}
