//! Error types for the batching core.
//!
//! Delivery failures are reported by sinks as [`crate::sink::SinkError`] and
//! never reach producers. The errors here are the ones a caller can see:
//! misconfiguration at construction and misuse of the lifecycle.

use thiserror::Error;

/// Invalid batch configuration, rejected at construction time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("max_items must be at least 1 (got {0})")]
    InvalidMaxItems(usize),

    #[error("idle flush time must be a finite, non-negative number of seconds (got {0})")]
    InvalidInterval(f64),
}

/// Lifecycle misuse of a [`crate::batch::Batcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BatchError {
    /// `start()` was called on a batcher that is already running.
    #[error("batcher already started")]
    AlreadyStarted,

    /// The batcher is shutting down or has stopped and accepts no more work.
    #[error("batcher is shutting down or stopped")]
    Stopped,

    /// `start()` was called outside of a tokio runtime.
    #[error("no tokio runtime available to run the flush task")]
    NoRuntime,

    /// The flush task terminated abnormally.
    #[error("flush task panicked")]
    FlushTaskPanic,
}
