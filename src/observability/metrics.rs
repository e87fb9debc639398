//! OpenTelemetry metrics for cursors and pages.
//!
//! Key metrics:
//! - tablestream_cursors_opened_total: Counter for cursors opened
//! - tablestream_cursors_open: Up/down counter for cursors currently holding a connection
//! - tablestream_rows_streamed_total: Counter for rows handed out by cursors
//! - tablestream_pages_fetched_total: Counter for page queries
//! - tablestream_page_latency_seconds: Histogram for page query latency

use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use std::sync::OnceLock;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Tablestream metrics registry.
#[derive(Debug)]
pub struct Metrics {
    pub cursors_opened: Counter<u64>,
    pub cursors_open: UpDownCounter<i64>,
    pub rows_streamed: Counter<u64>,
    pub pages_fetched: Counter<u64>,
    pub page_latency: Histogram<f64>,
}

impl Metrics {
    fn new(meter: &Meter) -> Self {
        Self {
            cursors_opened: meter
                .u64_counter("tablestream_cursors_opened_total")
                .with_description("Total number of cursors opened")
                .with_unit("1")
                .init(),
            cursors_open: meter
                .i64_up_down_counter("tablestream_cursors_open")
                .with_description("Cursors currently holding a connection")
                .with_unit("1")
                .init(),
            rows_streamed: meter
                .u64_counter("tablestream_rows_streamed_total")
                .with_description("Rows handed out by cursors")
                .with_unit("1")
                .init(),
            pages_fetched: meter
                .u64_counter("tablestream_pages_fetched_total")
                .with_description("Total number of page queries")
                .with_unit("1")
                .init(),
            page_latency: meter
                .f64_histogram("tablestream_page_latency_seconds")
                .with_description("Page query latency including connect and close")
                .with_unit("s")
                .init(),
        }
    }
}

/// Initialize the metrics system.
///
/// Metrics are recorded against a manual reader and not exported.
/// Subsequent calls are ignored.
pub fn init_metrics() {
    METRICS.get_or_init(|| {
        let reader = ManualReader::builder().build();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();
        global::set_meter_provider(provider);

        let meter = global::meter("tablestream");
        Metrics::new(&meter)
    });
}

/// Get the global metrics instance, if initialized.
pub fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

pub fn record_cursor_opened(table: &str) {
    if let Some(m) = METRICS.get() {
        let attrs = [KeyValue::new("table", table.to_string())];
        m.cursors_opened.add(1, &attrs);
        m.cursors_open.add(1, &attrs);
    }
}

pub fn record_cursor_closed(table: &str, rows: u64) {
    if let Some(m) = METRICS.get() {
        let attrs = [KeyValue::new("table", table.to_string())];
        m.cursors_open.add(-1, &attrs);
        m.rows_streamed.add(rows, &attrs);
    }
}

pub fn record_page(table: &str, rows: usize, latency_seconds: f64) {
    if let Some(m) = METRICS.get() {
        let attrs = [
            KeyValue::new("table", table.to_string()),
            KeyValue::new("empty", rows == 0),
        ];
        m.pages_fetched.add(1, &attrs);
        m.page_latency.record(latency_seconds, &attrs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_is_idempotent() {
        init_metrics();
        init_metrics();
        assert!(metrics().is_some());
    }

    #[test]
    fn test_record_cursor_lifecycle() {
        init_metrics();
        // Should not panic
        record_cursor_opened("user_data");
        record_cursor_closed("user_data", 42);
    }

    #[test]
    fn test_record_page() {
        init_metrics();
        // Should not panic
        record_page("user_data", 10, 0.002);
        record_page("user_data", 0, 0.001);
    }
}
