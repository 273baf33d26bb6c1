//! Observability infrastructure.
//!
//! Provides:
//! - Structured logging via tracing-subscriber
//! - OpenTelemetry/OTLP metrics for flush activity

pub mod metrics;
pub mod tracing;
