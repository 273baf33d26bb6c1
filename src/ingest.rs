//! Line-oriented event ingestion.
//!
//! Reads newline-delimited JSON events, formats each one and hands the
//! record to a [`Batcher`]. Invalid lines are logged and skipped.

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;

use crate::batch::Batcher;
use crate::error::BatchError;
use crate::format::RecordFormatter;
use crate::sink::BatchSink;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Batch(#[from] BatchError),
}

/// Counts from one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Lines read, including blank and invalid ones.
    pub lines: u64,
    /// Events handed to the batcher.
    pub accepted: u64,
    /// Lines that were not valid JSON.
    pub skipped: u64,
    /// Ingestion stopped on a shutdown signal rather than EOF.
    pub interrupted: bool,
}

/// Pump events from `reader` into `batcher` until EOF or shutdown.
///
/// The batcher is not shut down here; the caller owns its lifecycle.
pub async fn ingest_lines<Rd, F, S>(
    reader: Rd,
    formatter: &F,
    batcher: &Batcher<F::Record, S>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<IngestSummary, IngestError>
where
    Rd: AsyncBufRead + Unpin,
    F: RecordFormatter<Value>,
    F::Record: Send + 'static,
    S: BatchSink<F::Record>,
{
    let mut lines = reader.lines();
    let mut summary = IngestSummary::default();

    loop {
        let line = tokio::select! {
            Ok(()) = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("Shutdown requested, stopping ingestion");
                    summary.interrupted = true;
                    break;
                }
                continue;
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            tracing::debug!(lines = summary.lines, "End of input");
            break;
        };
        summary.lines += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(event) => {
                batcher.receive(formatter.format(&event))?;
                summary.accepted += 1;
            }
            Err(e) => {
                tracing::warn!(line = summary.lines, error = %e, "Skipping invalid JSON event");
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}
