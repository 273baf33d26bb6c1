//! Configuration parsing for the headgate binary.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::Parser;

use crate::batch::BatchConfig;
use crate::error::ConfigError;
use crate::format::TemplateFormatter;

/// Headgate: batch newline-delimited JSON events into bulk line-protocol writes.
#[derive(Parser, Debug, Clone)]
#[command(name = "headgate")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Number of events buffered before a batch is flushed
    #[arg(long, env = "HEADGATE_FLUSH_SIZE", default_value_t = 100)]
    pub flush_size: usize,

    /// Seconds since the last flush before pending events are flushed (0 disables)
    #[arg(long, env = "HEADGATE_IDLE_FLUSH_TIME", default_value_t = 1.0)]
    pub idle_flush_time: f64,

    /// Series name template; supports %{field} references
    #[arg(long, env = "HEADGATE_NAME", default_value = "stats")]
    pub name: String,

    /// Data point template; repeat for several points per event
    #[arg(
        long = "data-point",
        env = "HEADGATE_DATA_POINTS",
        value_delimiter = ';'
    )]
    pub data_points: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// OpenTelemetry collector endpoint for metrics export (optional)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validated batching parameters.
    pub fn batch_config(&self) -> Result<BatchConfig, ConfigError> {
        BatchConfig::from_config(self.flush_size, self.idle_flush_time)
    }

    /// Formatter built from the name and data point templates.
    pub fn formatter(&self) -> TemplateFormatter {
        TemplateFormatter::new(self.name.clone(), self.data_points.clone())
    }

    /// Create a default configuration for testing.
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            flush_size: 3,
            idle_flush_time: 0.01,
            name: "test".into(),
            data_points: vec!["m value=%{value}".into()],
            log_level: "debug".into(),
            otel_endpoint: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flush_size: 100,
            idle_flush_time: 1.0,
            name: "stats".into(),
            data_points: Vec::new(),
            log_level: "info".into(),
            otel_endpoint: None,
        }
    }
}
