//! Flush coordinator: single-flight delivery and idle timer lifecycle.
//!
//! All flushes run on one background task:
//! - Size triggers arrive through a [`Notify`] permit, so any number of
//!   requests made while a flush is running coalesce into one more pass.
//!   That pass drains the partial batch too, not just sealed ones
//! - The idle deadline is recomputed after each completed flush attempt
//! - Shutdown cancels a [`CancellationToken`] that the task checks before
//!   every other branch, then runs one final drain

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::buffer::{BatchBuffer, BatchConfig};
use super::stats::{FlushReason, FlushStats};
use crate::error::BatchError;
use crate::observability::metrics;
use crate::sink::{BatchSink, SinkError};

/// Deadline used when `now + interval` overflows the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Observable lifecycle state of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Running,
    ShuttingDown,
    Stopped,
}

enum Lifecycle {
    Idle,
    Running(JoinHandle<()>),
    ShuttingDown,
    Stopped,
}

impl Lifecycle {
    fn state(&self) -> CoordinatorState {
        match self {
            Self::Idle => CoordinatorState::Idle,
            Self::Running(_) => CoordinatorState::Running,
            Self::ShuttingDown => CoordinatorState::ShuttingDown,
            Self::Stopped => CoordinatorState::Stopped,
        }
    }
}

/// State shared between the coordinator handle and its flush task.
struct FlushWorker<R, S> {
    buffer: Arc<BatchBuffer<R>>,
    sink: S,
    stats: Arc<FlushStats>,
    flushing: AtomicBool,
    /// A size request arrived while a flush was running.
    owed: AtomicBool,
    sealed: Notify,
    idle: Notify,
}

impl<R, S> FlushWorker<R, S>
where
    R: Send + 'static,
    S: BatchSink<R>,
{
    /// Drain according to `reason` and deliver each batch in order.
    ///
    /// Returns false if there was nothing to deliver.
    async fn flush(&self, reason: FlushReason) -> bool {
        // Set before draining so a request racing the drain is still owed.
        self.flushing.store(true, Ordering::SeqCst);
        let batches = match reason {
            FlushReason::SizeThreshold if self.owed.swap(false, Ordering::SeqCst) => {
                tracing::trace!("Coalesced flush, draining partial batch too");
                self.buffer.drain()
            }
            FlushReason::SizeThreshold => self.buffer.drain_sealed(),
            FlushReason::Timer => self.buffer.drain(),
            FlushReason::Shutdown => self.buffer.close_and_drain(),
        };

        if batches.is_empty() {
            self.flushing.store(false, Ordering::SeqCst);
            tracing::trace!(reason = %reason, "Nothing to flush");
            return false;
        }

        for batch in batches {
            self.deliver(reason, batch).await;
        }
        self.flushing.store(false, Ordering::SeqCst);
        true
    }

    fn request_size_flush(&self) {
        if self.flushing.load(Ordering::SeqCst) {
            self.owed.store(true, Ordering::SeqCst);
        }
        self.sealed.notify_one();
    }

    async fn deliver(&self, reason: FlushReason, batch: Vec<R>) {
        let records = batch.len();
        let started = Instant::now();

        let result = match AssertUnwindSafe(self.sink.write(batch)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(SinkError::new(
                self.sink.describe(),
                records,
                "sink panicked during write",
            )),
        };
        let elapsed = started.elapsed();

        match result {
            Ok(()) => {
                self.stats.record_delivered(records);
                metrics::record_flush(reason.as_str(), records, elapsed.as_secs_f64());
                tracing::debug!(
                    reason = %reason,
                    records,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Batch flushed"
                );
            }
            Err(e) => {
                self.stats.record_dropped(records);
                metrics::record_flush_failure(reason.as_str(), records, elapsed.as_secs_f64());
                tracing::error!(
                    reason = %reason,
                    destination = %e.destination,
                    records,
                    bytes = ?e.bytes,
                    error = %e.source,
                    "Flush failed, dropping batch"
                );
            }
        }
    }
}

fn next_deadline(interval: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(interval)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

/// Background flush loop. Exits only after the final shutdown drain.
async fn run_flush_loop<R, S>(
    worker: Arc<FlushWorker<R, S>>,
    max_interval: Duration,
    shutdown: CancellationToken,
) where
    R: Send + 'static,
    S: BatchSink<R>,
{
    let timer_enabled = !max_interval.is_zero();
    let mut deadline = next_deadline(max_interval);

    loop {
        let reason = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            () = worker.sealed.notified() => FlushReason::SizeThreshold,
            () = worker.idle.notified() => FlushReason::Timer,
            () = tokio::time::sleep_until(deadline), if timer_enabled => FlushReason::Timer,
        };

        let attempted = worker.flush(reason).await;
        // Timer passes always re-arm so an empty buffer does not spin.
        if attempted || reason == FlushReason::Timer {
            deadline = next_deadline(max_interval);
        }
    }

    worker.flush(FlushReason::Shutdown).await;
}

/// Single-flight executor for a [`BatchBuffer`].
///
/// Owns the flush task and the idle timer. Instances are single-use:
/// `Idle → Running → ShuttingDown → Stopped`.
pub struct FlushCoordinator<R, S> {
    config: BatchConfig,
    worker: Arc<FlushWorker<R, S>>,
    lifecycle: Mutex<Lifecycle>,
    shutdown: CancellationToken,
}

impl<R, S> FlushCoordinator<R, S>
where
    R: Send + 'static,
    S: BatchSink<R>,
{
    pub fn new(
        config: BatchConfig,
        buffer: Arc<BatchBuffer<R>>,
        sink: S,
        stats: Arc<FlushStats>,
    ) -> Self {
        Self {
            config,
            worker: Arc::new(FlushWorker {
                buffer,
                sink,
                stats,
                flushing: AtomicBool::new(false),
                owed: AtomicBool::new(false),
                sealed: Notify::new(),
                idle: Notify::new(),
            }),
            lifecycle: Mutex::new(Lifecycle::Idle),
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawn the flush task on the current tokio runtime and arm the timer.
    ///
    /// Calling it twice is an error rather than a no-op.
    pub fn start(&self) -> Result<(), BatchError> {
        let mut lifecycle = self.lock_lifecycle();
        match *lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Running(_) => {
                tracing::warn!("start() called on a running batcher");
                return Err(BatchError::AlreadyStarted);
            }
            Lifecycle::ShuttingDown | Lifecycle::Stopped => return Err(BatchError::Stopped),
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| BatchError::NoRuntime)?;
        let handle = runtime.spawn(run_flush_loop(
            self.worker.clone(),
            self.config.max_interval(),
            self.shutdown.clone(),
        ));
        *lifecycle = Lifecycle::Running(handle);

        tracing::info!(
            destination = %self.worker.sink.describe(),
            max_items = self.config.max_items(),
            max_interval_ms = self.config.max_interval().as_millis() as u64,
            "Flush coordinator started"
        );
        Ok(())
    }

    /// Ask the flush task for a flush.
    ///
    /// Requests made while a flush is running are coalesced into a single
    /// follow-up pass that takes everything accumulated since, including a
    /// partial batch. `Shutdown` only signals the task; use
    /// [`FlushCoordinator::shutdown`] to wait for the final drain.
    pub fn request_flush(&self, reason: FlushReason) {
        match reason {
            FlushReason::SizeThreshold => self.worker.request_size_flush(),
            FlushReason::Timer => self.worker.idle.notify_one(),
            FlushReason::Shutdown => self.shutdown.cancel(),
        }
    }

    /// Cancel the idle timer, run the final drain and wait for it.
    ///
    /// A coordinator that was never started drains on the caller's task.
    pub async fn shutdown(&self) -> Result<(), BatchError> {
        let handle = {
            let mut lifecycle = self.lock_lifecycle();
            match std::mem::replace(&mut *lifecycle, Lifecycle::ShuttingDown) {
                Lifecycle::Running(handle) => Some(handle),
                Lifecycle::Idle => None,
                other => {
                    *lifecycle = other;
                    return Err(BatchError::Stopped);
                }
            }
        };

        tracing::info!(pending = self.worker.buffer.len(), "Shutting down flush coordinator");
        self.shutdown.cancel();

        let result = match handle {
            Some(handle) => handle.await.map_err(|e| {
                tracing::error!(error = %e, "Flush task terminated abnormally");
                BatchError::FlushTaskPanic
            }),
            None => {
                self.worker.flush(FlushReason::Shutdown).await;
                Ok(())
            }
        };

        *self.lock_lifecycle() = Lifecycle::Stopped;
        tracing::info!("Flush coordinator stopped");
        result
    }
}

impl<R, S> FlushCoordinator<R, S> {
    pub fn state(&self) -> CoordinatorState {
        self.lock_lifecycle().state()
    }

    /// Whether a flush pass is draining or writing right now.
    pub fn is_flushing(&self) -> bool {
        self.worker.flushing.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R, S> Drop for FlushCoordinator<R, S> {
    fn drop(&mut self) {
        // A running task still performs its final drain after cancellation.
        self.shutdown.cancel();

        let lifecycle = self.lifecycle.get_mut().unwrap_or_else(PoisonError::into_inner);
        if matches!(lifecycle, Lifecycle::Idle) && !self.worker.buffer.is_empty() {
            tracing::warn!(
                pending = self.worker.buffer.len(),
                "Batcher dropped before start; pending events discarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::FnSink;
    use std::sync::atomic::AtomicUsize;

    type Recorded = Arc<Mutex<Vec<Vec<u32>>>>;

    fn recording_sink(
        out: Recorded,
    ) -> FnSink<impl Fn(Vec<u32>) -> futures::future::Ready<Result<(), SinkError>> + Send + Sync>
    {
        FnSink::new("memory", move |batch: Vec<u32>| {
            out.lock().unwrap().push(batch);
            futures::future::ready(Ok(()))
        })
    }

    fn coordinator_with(
        config: BatchConfig,
    ) -> (
        Arc<BatchBuffer<u32>>,
        FlushCoordinator<u32, impl BatchSink<u32>>,
        Recorded,
    ) {
        let out: Recorded = Arc::default();
        let buffer = Arc::new(BatchBuffer::new(config.max_items()));
        let coordinator = FlushCoordinator::new(
            config,
            buffer.clone(),
            recording_sink(out.clone()),
            Arc::new(FlushStats::new()),
        );
        (buffer, coordinator, out)
    }

    #[test]
    fn test_start_requires_runtime() {
        let (_buffer, coordinator, _out) = coordinator_with(BatchConfig::test_config());
        assert_eq!(coordinator.start(), Err(BatchError::NoRuntime));
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let (_buffer, coordinator, _out) = coordinator_with(BatchConfig::test_config());
        assert_eq!(coordinator.state(), CoordinatorState::Idle);

        coordinator.start().unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Running);
        assert_eq!(coordinator.start(), Err(BatchError::AlreadyStarted));

        coordinator.shutdown().await.unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Stopped);
        assert_eq!(coordinator.start(), Err(BatchError::Stopped));
        assert_eq!(coordinator.shutdown().await, Err(BatchError::Stopped));
    }

    #[tokio::test]
    async fn test_shutdown_without_start_drains_inline() {
        let (buffer, coordinator, out) = coordinator_with(BatchConfig::test_config());
        buffer.push(1).unwrap();
        buffer.push(2).unwrap();

        coordinator.shutdown().await.unwrap();
        assert_eq!(*out.lock().unwrap(), vec![vec![1, 2]]);
        assert!(buffer.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_timer_request_flushes_partial_batch() {
        let config = BatchConfig::new(100, Duration::ZERO).unwrap();
        let (buffer, coordinator, out) = coordinator_with(config);
        coordinator.start().unwrap();

        buffer.push(7).unwrap();
        coordinator.request_flush(FlushReason::Timer);
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(*out.lock().unwrap(), vec![vec![7]]);
        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_timer_ticks_do_not_call_sink() {
        let sink_calls = Arc::new(AtomicUsize::new(0));
        let calls = sink_calls.clone();
        let sink = FnSink::new("counter", move |_batch: Vec<u32>| {
            calls.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(()))
        });
        let config = BatchConfig::new(10, Duration::from_millis(100)).unwrap();
        let buffer = Arc::new(BatchBuffer::new(config.max_items()));
        let coordinator =
            FlushCoordinator::new(config, buffer, sink, Arc::new(FlushStats::new()));
        coordinator.start().unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        coordinator.shutdown().await.unwrap();
        assert_eq!(sink_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_sink_drops_batch_and_continues() {
        crate::observability::tracing::init_test_tracing();
        let calls = Arc::new(AtomicUsize::new(0));
        let delivered: Recorded = Arc::default();
        let (counter, out) = (calls.clone(), delivered.clone());
        let sink = FnSink::new("flaky", move |batch: Vec<u32>| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("boom");
            }
            out.lock().unwrap().push(batch);
            futures::future::ready(Ok(()))
        });

        let config = BatchConfig::new(2, Duration::ZERO).unwrap();
        let buffer = Arc::new(BatchBuffer::new(config.max_items()));
        let stats = Arc::new(FlushStats::new());
        let coordinator = FlushCoordinator::new(config, buffer.clone(), sink, stats.clone());
        coordinator.start().unwrap();

        for i in 0..4 {
            if buffer.push(i).unwrap() {
                coordinator.request_flush(FlushReason::SizeThreshold);
            }
        }
        coordinator.shutdown().await.unwrap();

        let snap = stats.snapshot();
        assert_eq!(snap.failed_flushes, 1);
        assert_eq!(snap.dropped_records, 2);
        assert_eq!(*delivered.lock().unwrap(), vec![vec![2, 3]]);
    }
}
