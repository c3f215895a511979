//! # Batch publisher port.
//!
//! [`BatchPublisher`] is the only thing a sink has to implement to receive
//! batches. [`PublishFn`] adapts a closure for tests and small sinks.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PublishError;

/// Contract between a [`BufferedEventPublisher`](crate::BufferedEventPublisher)
/// and a sink.
///
/// `publish` returns how many **leading** entries of `batch` were handed off.
/// Those entries are removed from the queue; the rest stay and are offered
/// again. `Ok(0)` and `Err(_)` are transient failures and trigger backoff.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use tracevisor::{BatchPublisher, PublishError};
///
/// struct Stdout;
///
/// #[async_trait]
/// impl BatchPublisher<String> for Stdout {
///     async fn publish(&self, batch: &[String]) -> Result<usize, PublishError> {
///         for line in batch {
///             println!("{line}");
///         }
///         Ok(batch.len())
///     }
/// }
/// ```
#[async_trait]
pub trait BatchPublisher<T>: Send + Sync + 'static {
    /// Hands off an ordered batch; returns the accepted prefix length.
    async fn publish(&self, batch: &[T]) -> Result<usize, PublishError>;
}

/// Shared handle to a batch publisher.
pub type PublisherRef<T> = Arc<dyn BatchPublisher<T>>;

/// Closure-backed [`BatchPublisher`].
///
/// The closure receives an owned copy of the batch and produces a fresh
/// future per call.
pub struct PublishFn<T, F> {
    f: F,
    _entry: PhantomData<fn(Vec<T>)>,
}

impl<T, F> PublishFn<T, F> {
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _entry: PhantomData,
        }
    }

    /// Wraps `f` and returns it as a shared handle.
    ///
    /// ```
    /// use tracevisor::{PublishFn, PublisherRef};
    ///
    /// let sink: PublisherRef<u32> = PublishFn::arc(|batch: Vec<u32>| async move { Ok(batch.len()) });
    /// ```
    pub fn arc<Fut>(f: F) -> Arc<Self>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<usize, PublishError>> + Send + 'static,
    {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<T, F, Fut> BatchPublisher<T> for PublishFn<T, F>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<usize, PublishError>> + Send + 'static,
{
    async fn publish(&self, batch: &[T]) -> Result<usize, PublishError> {
        (self.f)(batch.to_vec()).await
    }
}
