//! Size- and time-bounded batching with guaranteed flush.
//!
//! Provides:
//! - [`BatchBuffer`]: ordered holding area with sealing at `max_items`
//! - [`FlushCoordinator`]: single-flight flush task and idle timer
//! - [`Batcher`]: the two composed behind one handle

pub mod buffer;
pub mod coordinator;
pub mod stats;

pub use buffer::{BatchBuffer, BatchConfig};
pub use coordinator::{CoordinatorState, FlushCoordinator};
pub use stats::{FlushReason, FlushStats, FlushStatsSnapshot};

use std::sync::Arc;

use crate::error::BatchError;
use crate::observability::metrics;
use crate::sink::BatchSink;

/// Event batcher owned by a host service.
///
/// `receive` is synchronous and never waits on the sink, so it can be
/// called from any thread or task. Wrap the batcher in an `Arc` to share it
/// between producers.
///
/// # Example
///
/// ```
/// use headgate::batch::{BatchConfig, Batcher};
/// use headgate::sink::{FnSink, SinkError};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let sink = FnSink::new("stdout", |batch: Vec<String>| async move {
///     println!("{}", batch.join("\n"));
///     Ok::<(), SinkError>(())
/// });
/// let batcher = Batcher::new(BatchConfig::new(100, Duration::from_secs(1))?, sink);
///
/// batcher.start()?;
/// batcher.receive("cpu value=0.5".to_string())?;
/// batcher.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct Batcher<R, S> {
    buffer: Arc<BatchBuffer<R>>,
    coordinator: FlushCoordinator<R, S>,
    stats: Arc<FlushStats>,
}

impl<R, S> Batcher<R, S>
where
    R: Send + 'static,
    S: BatchSink<R>,
{
    pub fn new(config: BatchConfig, sink: S) -> Self {
        let buffer = Arc::new(BatchBuffer::new(config.max_items()));
        let stats = Arc::new(FlushStats::new());
        let coordinator = FlushCoordinator::new(config, buffer.clone(), sink, stats.clone());
        Self {
            buffer,
            coordinator,
            stats,
        }
    }

    /// Start the flush task. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), BatchError> {
        self.coordinator.start()
    }

    /// Accept one event.
    ///
    /// Filling a batch hands it to the flush task without waiting. The only
    /// error is receiving after the final shutdown drain.
    pub fn receive(&self, event: R) -> Result<(), BatchError> {
        // Counted under the buffer lock so a flush never delivers an event
        // before it shows up as received.
        let sealed = self
            .buffer
            .push_with(event, || self.stats.record_received())
            .inspect_err(|_| {
                tracing::warn!("receive() called after shutdown; event rejected");
            })?;
        metrics::record_received();

        if sealed {
            self.coordinator.request_flush(FlushReason::SizeThreshold);
        }
        Ok(())
    }

    /// Request an out-of-band flush. See [`FlushCoordinator::request_flush`].
    pub fn request_flush(&self, reason: FlushReason) {
        self.coordinator.request_flush(reason);
    }

    /// Flush everything pending and stop.
    ///
    /// Returns once the final flush attempt, and any flush it was queued
    /// behind, has completed.
    pub async fn shutdown(&self) -> Result<FlushStatsSnapshot, BatchError> {
        self.coordinator.shutdown().await?;
        let stats = self.stats();
        tracing::info!(
            received = stats.received,
            flushes = stats.flushes,
            delivered = stats.delivered_records,
            dropped = stats.dropped_records,
            "Batcher shut down"
        );
        Ok(stats)
    }
}

impl<R, S> Batcher<R, S> {
    pub fn stats(&self) -> FlushStatsSnapshot {
        self.stats.snapshot()
    }

    /// Events accepted but not yet handed to the sink.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn state(&self) -> CoordinatorState {
        self.coordinator.state()
    }

    pub fn is_flushing(&self) -> bool {
        self.coordinator.is_flushing()
    }

    pub fn config(&self) -> &BatchConfig {
        self.coordinator.config()
    }
}
