//! OTLP metrics implementation.
//!
//! Key metrics:
//! - headgate_events_received_total: Counter for accepted events
//! - headgate_flushes_total: Counter for sink calls, by reason
//! - headgate_flush_failures_total: Counter for failed sink calls
//! - headgate_records_dropped_total: Counter for records in failed batches
//! - headgate_flush_latency_seconds: Histogram for sink call latency
//! - headgate_batch_size: Histogram for records per sink call

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use std::sync::OnceLock;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Headgate metrics registry.
#[derive(Debug)]
pub struct Metrics {
    /// Total number of events accepted by `receive`.
    pub events_received: Counter<u64>,
    /// Total number of sink calls.
    pub flushes_total: Counter<u64>,
    /// Total number of sink calls that failed.
    pub flush_failures: Counter<u64>,
    /// Total number of records dropped by failed flushes.
    pub records_dropped: Counter<u64>,
    /// Histogram of sink call latency in seconds.
    pub flush_latency: Histogram<f64>,
    /// Histogram of records per sink call.
    pub batch_size: Histogram<u64>,
}

impl Metrics {
    /// Create a new metrics registry from a meter.
    fn new(meter: &Meter) -> Self {
        Self {
            events_received: meter
                .u64_counter("headgate_events_received_total")
                .with_description("Total number of events accepted for batching")
                .with_unit("1")
                .init(),
            flushes_total: meter
                .u64_counter("headgate_flushes_total")
                .with_description("Total number of batches handed to the sink")
                .with_unit("1")
                .init(),
            flush_failures: meter
                .u64_counter("headgate_flush_failures_total")
                .with_description("Total number of batches the sink rejected")
                .with_unit("1")
                .init(),
            records_dropped: meter
                .u64_counter("headgate_records_dropped_total")
                .with_description("Records discarded after a failed flush")
                .with_unit("1")
                .init(),
            flush_latency: meter
                .f64_histogram("headgate_flush_latency_seconds")
                .with_description("Time spent in a single sink write")
                .with_unit("s")
                .init(),
            batch_size: meter
                .u64_histogram("headgate_batch_size")
                .with_description("Records per sink write")
                .with_unit("1")
                .init(),
        }
    }
}

impl Metrics {
    fn flush(&self, reason: &'static str, records: usize, latency_seconds: f64) {
        let attrs = [KeyValue::new("reason", reason)];
        self.record_sink_call(&attrs, records, latency_seconds);
    }

    fn flush_failure(&self, reason: &'static str, records: usize, latency_seconds: f64) {
        let attrs = [KeyValue::new("reason", reason)];
        self.record_sink_call(&attrs, records, latency_seconds);
        self.flush_failures.add(1, &attrs);
        self.records_dropped.add(records as u64, &attrs);
    }

    /// Instruments shared by every sink call, whatever its outcome.
    fn record_sink_call(&self, attrs: &[KeyValue], records: usize, latency_seconds: f64) {
        self.flushes_total.add(1, attrs);
        self.batch_size.record(records as u64, attrs);
        self.flush_latency.record(latency_seconds, attrs);
    }
}

fn install_manual_reader() {
    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    global::set_meter_provider(provider);
}

/// Initialize the metrics system.
///
/// This should be called once at startup. Subsequent calls are ignored.
///
/// # Arguments
///
/// * `otel_endpoint` - Optional OTLP endpoint for metrics export
pub fn init_metrics_with_endpoint(otel_endpoint: Option<&str>) {
    METRICS.get_or_init(|| {
        if let Some(endpoint) = otel_endpoint {
            use opentelemetry_otlp::{Protocol, WithExportConfig};

            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_protocol(Protocol::Grpc);

            match opentelemetry_otlp::new_pipeline()
                .metrics(opentelemetry_sdk::runtime::Tokio)
                .with_exporter(exporter)
                .with_period(std::time::Duration::from_secs(10))
                .build()
            {
                Ok(provider) => {
                    global::set_meter_provider(provider);
                    tracing::info!(endpoint, "OTLP metrics exporter configured");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create OTLP exporter, using no-op metrics");
                    install_manual_reader();
                }
            }
        } else {
            // Metrics are recorded but not exported.
            install_manual_reader();
        }

        let meter = global::meter("headgate");
        Metrics::new(&meter)
    });
}

/// Initialize the metrics system without OTLP export.
pub fn init_metrics() {
    init_metrics_with_endpoint(None);
}

/// Get the global metrics instance, if initialized.
pub fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

/// Record one accepted event.
pub fn record_received() {
    if let Some(m) = METRICS.get() {
        m.events_received.add(1, &[]);
    }
}

/// Record a successful sink call.
pub fn record_flush(reason: &'static str, records: usize, latency_seconds: f64) {
    if let Some(m) = METRICS.get() {
        m.flush(reason, records, latency_seconds);
    }
}

/// Record a failed sink call and the records it dropped.
pub fn record_flush_failure(reason: &'static str, records: usize, latency_seconds: f64) {
    if let Some(m) = METRICS.get() {
        m.flush_failure(reason, records, latency_seconds);
    }
}
