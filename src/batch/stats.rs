//! Per-batcher flush counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Why a flush was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushReason {
    /// A batch reached `max_items`.
    SizeThreshold,
    /// The idle timer expired, or a caller asked for an idle-style flush.
    Timer,
    /// Final forced flush issued by shutdown.
    Shutdown,
}

impl FlushReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SizeThreshold => "size",
            Self::Timer => "timer",
            Self::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for FlushReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic counters updated by producers and the flush task.
///
/// `received` is bumped under the buffer lock and the outcome counters are
/// published with `Release`, so a snapshot never shows more records
/// delivered or dropped than received.
#[derive(Debug, Default)]
pub struct FlushStats {
    received: AtomicU64,
    flushes: AtomicU64,
    delivered_records: AtomicU64,
    failed_flushes: AtomicU64,
    dropped_records: AtomicU64,
}

/// Point-in-time copy of [`FlushStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStatsSnapshot {
    /// Events accepted by `receive`.
    pub received: u64,
    /// Sink calls made, successful or not.
    pub flushes: u64,
    /// Records in batches the sink accepted.
    pub delivered_records: u64,
    /// Sink calls that reported an error.
    pub failed_flushes: u64,
    /// Records in failed batches, which are not retried.
    pub dropped_records: u64,
}

impl FlushStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, records: usize) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.delivered_records
            .fetch_add(records as u64, Ordering::Release);
    }

    pub(crate) fn record_dropped(&self, records: usize) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.failed_flushes.fetch_add(1, Ordering::Relaxed);
        self.dropped_records
            .fetch_add(records as u64, Ordering::Release);
    }

    pub fn snapshot(&self) -> FlushStatsSnapshot {
        // Outcomes first, then `received`.
        let delivered_records = self.delivered_records.load(Ordering::Acquire);
        let dropped_records = self.dropped_records.load(Ordering::Acquire);
        let failed_flushes = self.failed_flushes.load(Ordering::Relaxed);
        let flushes = self.flushes.load(Ordering::Relaxed);
        FlushStatsSnapshot {
            received: self.received.load(Ordering::Acquire),
            flushes,
            delivered_records,
            failed_flushes,
            dropped_records,
        }
    }
}

impl FlushStatsSnapshot {
    /// Accepted events that have not yet been delivered or dropped.
    pub fn in_flight(&self) -> u64 {
        self.received
            .saturating_sub(self.delivered_records + self.dropped_records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = FlushStats::new();
        for _ in 0..5 {
            stats.record_received();
        }
        stats.record_delivered(3);
        stats.record_dropped(1);

        let snap = stats.snapshot();
        assert_eq!(snap.received, 5);
        assert_eq!(snap.flushes, 2);
        assert_eq!(snap.delivered_records, 3);
        assert_eq!(snap.failed_flushes, 1);
        assert_eq!(snap.dropped_records, 1);
        assert_eq!(snap.in_flight(), 1);
    }

    #[test]
    fn test_reason_labels() {
        assert_eq!(FlushReason::SizeThreshold.to_string(), "size");
        assert_eq!(FlushReason::Timer.as_str(), "timer");
        assert_eq!(FlushReason::Shutdown.as_str(), "shutdown");
    }
}
