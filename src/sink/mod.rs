//! Batch sinks: the downstream side of the batcher.
//!
//! Provides:
//! - [`BatchSink`], the bulk write interface the flush task calls
//! - [`SinkError`], the structured failure a sink reports
//! - [`FnSink`], an adapter for async closures
//! - [`WriterSink`], a line-protocol sink over any `AsyncWrite`

pub mod writer;

pub use writer::WriterSink;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Boxed underlying cause of a sink failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A failed delivery of one batch.
///
/// The batcher logs it and drops the batch; it is never retried.
#[derive(Debug, Error)]
#[error("failed to write {records} records to {destination}: {source}")]
pub struct SinkError {
    /// Identity of the destination (host, file, stream).
    pub destination: String,
    /// Number of records in the failed batch.
    pub records: usize,
    /// Bytes that were being written, if the sink knows.
    pub bytes: Option<usize>,
    #[source]
    pub source: BoxError,
}

impl SinkError {
    pub fn new(destination: impl Into<String>, records: usize, source: impl Into<BoxError>) -> Self {
        Self {
            destination: destination.into(),
            records,
            bytes: None,
            source: source.into(),
        }
    }

    #[must_use]
    pub fn with_bytes(mut self, bytes: usize) -> Self {
        self.bytes = Some(bytes);
        self
    }
}

/// Destination for drained batches.
///
/// `write` is called at most once at a time per batcher, with a non-empty
/// batch in receive order. It may take as long as it needs; producers keep
/// appending to the next batch in the meantime.
#[async_trait]
pub trait BatchSink<R: Send + 'static>: Send + Sync + 'static {
    /// Deliver one batch. A single attempt; no retry is made on error.
    async fn write(&self, batch: Vec<R>) -> Result<(), SinkError>;

    /// Destination identity used in diagnostics.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

#[async_trait]
impl<R, S> BatchSink<R> for Arc<S>
where
    R: Send + 'static,
    S: BatchSink<R> + ?Sized,
{
    async fn write(&self, batch: Vec<R>) -> Result<(), SinkError> {
        (**self).write(batch).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Sink backed by an async closure.
pub struct FnSink<F> {
    destination: String,
    write_fn: F,
}

impl<F> FnSink<F> {
    pub fn new(destination: impl Into<String>, write_fn: F) -> Self {
        Self {
            destination: destination.into(),
            write_fn,
        }
    }
}

impl<F> std::fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSink")
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<R, F, Fut> BatchSink<R> for FnSink<F>
where
    R: Send + 'static,
    F: Fn(Vec<R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), SinkError>> + Send + 'static,
{
    async fn write(&self, batch: Vec<R>) -> Result<(), SinkError> {
        (self.write_fn)(batch).await
    }

    fn describe(&self) -> String {
        self.destination.clone()
    }
}
