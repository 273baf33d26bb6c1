//! Headgate: a size- and time-bounded event batcher with guaranteed flush.
//!
//! Producers hand individual events to a [`batch::Batcher`]. Events are
//! delivered to a [`sink::BatchSink`] in bulk, either when `max_items` have
//! accumulated or when `max_interval` has passed since the last flush.
//! Shutdown forces a final flush and waits for it.
//!
//! Delivery is at-most-once: a batch the sink rejects is logged and dropped.
//!
//! # Modules
//!
//! - [`batch`]: Buffer, flush coordinator and the composed batcher
//! - [`config`]: CLI and environment configuration
//! - [`error`]: Configuration and lifecycle errors
//! - [`format`]: Event-to-record formatting
//! - [`ingest`]: Newline-delimited JSON ingestion
//! - [`observability`]: Metrics and tracing setup
//! - [`sink`]: Sink interface and reference sinks

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // batch::BatchBuffer is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::missing_panics_doc       // Panic docs can be verbose
)]

pub mod batch;
pub mod config;
pub mod error;
pub mod format;
pub mod ingest;
pub mod observability;
pub mod sink;

pub use batch::{BatchConfig, Batcher, FlushReason};
pub use error::{BatchError, ConfigError};
pub use sink::{BatchSink, SinkError};
