use std::sync::Arc;

use super::config::PipelineConfig;
use super::pipeline::Pipeline;
use crate::error::ConfigErrors;
use crate::subscribers::Subscribe;

/// Builder for constructing a [`Pipeline`].
pub struct PipelineBuilder {
    cfg: PipelineConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl PipelineBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: PipelineConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets diagnostic subscribers.
    ///
    /// Subscribers receive every diagnostic (overload, backoff, topology
    /// changes, configuration faults) through dedicated workers with bounded
    /// queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds one diagnostic subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Validates the default buffering and starts the pipeline with no sinks.
    ///
    /// Must be called within a Tokio runtime.
    pub fn build(self) -> Result<Arc<Pipeline>, ConfigErrors> {
        self.cfg.buffering.validate()?;
        Ok(Arc::new(Pipeline::new_internal(self.cfg, self.subscribers)))
    }
}
