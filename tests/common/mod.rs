//! Test utilities for headgate integration tests.
//!
//! Provides:
//! - A recording fake sink with optional failures, delay and a write gate
//! - A polling helper for conditions reached asynchronously

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use headgate::sink::{BatchSink, SinkError};
use tokio::sync::Semaphore;

/// Fake sink that records every delivered batch.
pub struct RecordingSink<T> {
    batches: Mutex<Vec<Vec<T>>>,
    /// Number of `write` calls that have begun.
    started: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    fail_first: usize,
    delay: Option<Duration>,
    gate: Option<Semaphore>,
}

impl<T> RecordingSink<T> {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            fail_first: 0,
            delay: None,
            gate: None,
        }
    }

    /// Reject the first `n` writes.
    pub fn failing_first(n: usize) -> Self {
        Self {
            fail_first: n,
            ..Self::new()
        }
    }

    /// Sleep for `delay` inside every write.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    /// Block every write until [`RecordingSink::release`] hands out permits.
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    /// Let `n` blocked writes proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_writes(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

impl<T: Clone> RecordingSink<T> {
    pub fn batches(&self) -> Vec<Vec<T>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn records(&self) -> Vec<T> {
        self.batches().concat()
    }
}

#[async_trait]
impl<T> BatchSink<T> for RecordingSink<T>
where
    T: Send + 'static,
{
    async fn write(&self, batch: Vec<T>) -> Result<(), SinkError> {
        let call = self.started.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = if call < self.fail_first {
            Err(SinkError::new("recording", batch.len(), "injected failure"))
        } else {
            self.batches.lock().unwrap().push(batch);
            Ok(())
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn describe(&self) -> String {
        "recording".to_string()
    }
}

/// Wait for a condition to become true with timeout.
///
/// # Returns
///
/// `true` if condition was met, `false` if timeout expired
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
