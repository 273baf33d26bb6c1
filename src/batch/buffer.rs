//! Batch buffer: ordered holding area for accepted events.
//!
//! Events are appended to the current batch. When the batch reaches
//! `max_items` it is sealed under the same lock and queued for the flush
//! task, so full batches always contain exactly `max_items` events and a
//! flush in progress never blocks new appends.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{BatchError, ConfigError};

/// Upper bound on the capacity reserved for a fresh batch.
const MAX_PREALLOCATED_ITEMS: usize = 1024;

/// Configuration for size- and time-triggered flushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    max_items: usize,
    max_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_items: 100,
            max_interval: Duration::from_secs(1),
        }
    }
}

impl BatchConfig {
    /// Create a validated config.
    ///
    /// A zero `max_interval` disables the idle timer.
    pub fn new(max_items: usize, max_interval: Duration) -> Result<Self, ConfigError> {
        if max_items == 0 {
            return Err(ConfigError::InvalidMaxItems(max_items));
        }
        Ok(Self {
            max_items,
            max_interval,
        })
    }

    /// Create a BatchConfig from application config values.
    ///
    /// `idle_flush_secs` may be fractional; negative, NaN and infinite
    /// values are rejected.
    pub fn from_config(flush_size: usize, idle_flush_secs: f64) -> Result<Self, ConfigError> {
        let interval = Duration::try_from_secs_f64(idle_flush_secs)
            .map_err(|_| ConfigError::InvalidInterval(idle_flush_secs))?;
        Self::new(flush_size, interval)
    }

    /// Size threshold that seals a batch.
    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Idle duration after which pending events are flushed.
    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// Whether the idle timer runs at all.
    pub fn timer_enabled(&self) -> bool {
        !self.max_interval.is_zero()
    }

    /// Create a test config with small batch size and short delay.
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            max_items: 3,
            max_interval: Duration::from_millis(10),
        }
    }
}

#[derive(Debug)]
struct BufferState<T> {
    current: Vec<T>,
    sealed: VecDeque<Vec<T>>,
    closed: bool,
}

/// Mutex-guarded double buffer of pending events.
///
/// Safe to share between producers and the flush task. The lock is held
/// only for the append or swap itself.
#[derive(Debug)]
pub struct BatchBuffer<T> {
    max_items: usize,
    state: Mutex<BufferState<T>>,
}

impl<T> BatchBuffer<T> {
    /// Create an empty buffer sealing batches at `max_items`.
    pub fn new(max_items: usize) -> Self {
        let max_items = max_items.max(1);
        Self {
            max_items,
            state: Mutex::new(BufferState {
                current: Self::fresh_batch(max_items),
                sealed: VecDeque::new(),
                closed: false,
            }),
        }
    }

    /// Append an item to the current batch.
    ///
    /// Returns `Ok(true)` if this append filled the batch and sealed it.
    /// Fails only once the buffer has been closed by a final drain.
    pub fn push(&self, item: T) -> Result<bool, BatchError> {
        self.push_with(item, || ())
    }

    /// Like [`BatchBuffer::push`], running `on_accept` while the lock is
    /// still held, before any drain can observe the item.
    pub fn push_with(&self, item: T, on_accept: impl FnOnce()) -> Result<bool, BatchError> {
        let mut state = self.lock();
        if state.closed {
            return Err(BatchError::Stopped);
        }

        state.current.push(item);
        on_accept();
        if state.current.len() < self.max_items {
            return Ok(false);
        }

        let full = std::mem::replace(&mut state.current, Self::fresh_batch(self.max_items));
        state.sealed.push_back(full);
        Ok(true)
    }

    /// Take only the sealed (full) batches, oldest first.
    pub fn drain_sealed(&self) -> Vec<Vec<T>> {
        self.lock().sealed.drain(..).collect()
    }

    /// Take every pending batch: sealed ones first, then the partial batch.
    pub fn drain(&self) -> Vec<Vec<T>> {
        let mut state = self.lock();
        Self::take_all(&mut state, self.max_items)
    }

    /// Drain everything and refuse further pushes.
    ///
    /// Closing and draining happen under one lock, so every accepted item
    /// is part of the returned batches.
    pub fn close_and_drain(&self) -> Vec<Vec<T>> {
        let mut state = self.lock();
        state.closed = true;
        Self::take_all(&mut state, self.max_items)
    }

    /// Check if no items are pending.
    pub fn is_empty(&self) -> bool {
        let state = self.lock();
        state.current.is_empty() && state.sealed.is_empty()
    }

    /// Total number of pending items across all batches.
    pub fn len(&self) -> usize {
        let state = self.lock();
        state.current.len() + state.sealed.iter().map(Vec::len).sum::<usize>()
    }

    /// Number of full batches waiting for the flush task.
    pub fn sealed_batches(&self) -> usize {
        self.lock().sealed.len()
    }

    /// Whether a final drain has closed the buffer.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn take_all(state: &mut BufferState<T>, max_items: usize) -> Vec<Vec<T>> {
        let mut batches: Vec<Vec<T>> = state.sealed.drain(..).collect();
        if !state.current.is_empty() {
            batches.push(std::mem::replace(
                &mut state.current,
                Self::fresh_batch(max_items),
            ));
        }
        batches
    }

    fn fresh_batch(max_items: usize) -> Vec<T> {
        Vec::with_capacity(max_items.min(MAX_PREALLOCATED_ITEMS))
    }

    // A panic while holding the lock cannot leave the vectors half-updated.
    fn lock(&self) -> MutexGuard<'_, BufferState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
