//! # Settings model: immutable description of what the pipeline runs.
//!
//! ```text
//! Configuration
//!   ├─ ServiceSettings            (global; any change = restart)
//!   └─ SinkSettings × N           (unique names, ordered)
//!        ├─ SinkHandle            (descriptor + memoized instance)
//!        ├─ Fingerprint           (definition digest → replace on change)
//!        ├─ BufferingConfig?      (per-sink override)
//!        └─ EventSourceSettings × M (subscriptions → swapped in place)
//! ```
//!
//! All constructors validate and return [`ConfigErrors`](crate::ConfigErrors)
//! with every violation, never a partially built value.

mod configuration;
mod service;
mod sink;
mod source;

pub use configuration::Configuration;
pub use service::ServiceSettings;
pub use sink::{
    Fingerprint, MAX_SINK_NAME_LEN, SinkDescriptor, SinkHandle, SinkRef, SinkSettings,
    SinkSettingsBuilder,
};
pub use source::{EventSourceBuilder, EventSourceSettings, PRODUCER_NAMESPACE, producer_id};

pub(crate) use configuration::duplicate_names;
