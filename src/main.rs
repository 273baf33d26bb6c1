//! Headgate: batch newline-delimited JSON events into bulk writes.
//!
//! # Usage
//!
//! ```bash
//! tail -f events.json | headgate --flush-size 100 --idle-flush-time 1 \
//!     --data-point 'cpu,host=%{host} value=%{cpu}'
//! ```
//!
//! Environment variables can also be used:
//! - `HEADGATE_FLUSH_SIZE`: Events per batch
//! - `HEADGATE_IDLE_FLUSH_TIME`: Idle seconds before a partial flush
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use anyhow::Context;
use headgate::batch::Batcher;
use headgate::config::Config;
use headgate::ingest::ingest_lines;
use headgate::observability::metrics::init_metrics_with_endpoint;
use headgate::observability::tracing::init_tracing;
use headgate::sink::WriterSink;
use tokio::io::BufReader;
use tokio::sync::watch;

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                    }
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating shutdown...");
                    }
                }
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, initiating shutdown...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    // Initialize tracing/logging
    init_tracing(&config.log_level);

    // Initialize metrics (with optional OTLP export)
    init_metrics_with_endpoint(config.otel_endpoint.as_deref());

    let batch_config = config
        .batch_config()
        .context("invalid batch configuration")?;
    let formatter = config.formatter();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        flush_size = batch_config.max_items(),
        idle_flush_ms = batch_config.max_interval().as_millis() as u64,
        data_points = config.data_points.len(),
        "Starting headgate"
    );

    let batcher = Batcher::new(batch_config, WriterSink::new("stdout", tokio::io::stdout()));
    batcher.start().context("failed to start batcher")?;

    // Create shutdown signal channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let ingested = ingest_lines(
        BufReader::new(tokio::io::stdin()),
        &formatter,
        &batcher,
        shutdown_rx,
    )
    .await;

    // Drain whatever was accepted, even if ingestion failed.
    let stats = batcher.shutdown().await.context("failed to flush pending events")?;
    let summary = ingested.context("ingestion failed")?;

    tracing::info!(
        lines = summary.lines,
        skipped = summary.skipped,
        delivered = stats.delivered_records,
        dropped = stats.dropped_records,
        "Headgate shutdown complete"
    );

    // A blocking stdin read cannot be cancelled and would hold the runtime open.
    if summary.interrupted {
        std::process::exit(0);
    }
    Ok(())
}
