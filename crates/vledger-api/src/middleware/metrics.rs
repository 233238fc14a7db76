//! # Prometheus Metrics
//!
//! HTTP-level metrics (request counts, latency, errors) are recorded in
//! middleware. Ledger gauges (vendors by status, requests by kind and
//! status, entry total, journal head) are refreshed from
//! [`EngineStats`] on each `/metrics` scrape.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use prometheus::core::Collector;
use prometheus::{
    Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder,
};

use vledger_ledger::{EngineStats, StatusCounts};

/// Shared metrics state backed by a Prometheus registry.
#[derive(Clone)]
pub struct ApiMetrics {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,

    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_errors_total: IntCounterVec,

    vendors_total: GaugeVec,
    payout_requests_total: GaugeVec,
    ledger_entries_total: Gauge,
    journal_seq: Gauge,
}

impl std::fmt::Debug for ApiMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiMetrics")
            .field("requests", &self.requests())
            .field("errors", &self.errors())
            .finish()
    }
}

impl ApiMetrics {
    /// Create a metrics instance with a fresh registry.
    pub fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("vledger_http_requests_total", "Total HTTP requests"),
            &["method", "path", "status"],
        )
        .expect("metric can be created");

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "vledger_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["method", "path"],
        )
        .expect("metric can be created");

        let http_errors_total = IntCounterVec::new(
            Opts::new("vledger_http_errors_total", "Total HTTP errors (4xx and 5xx)"),
            &["method", "path", "status"],
        )
        .expect("metric can be created");

        let vendors_total = GaugeVec::new(
            Opts::new("vledger_vendors_total", "Registered vendors by status"),
            &["status"],
        )
        .expect("metric can be created");

        let payout_requests_total = GaugeVec::new(
            Opts::new(
                "vledger_payout_requests_total",
                "Settlement and withdrawal requests by kind and status",
            ),
            &["kind", "status"],
        )
        .expect("metric can be created");

        let ledger_entries_total = Gauge::new(
            "vledger_ledger_entries_total",
            "Ledger entries across all vendors",
        )
        .expect("metric can be created");

        let journal_seq = Gauge::new(
            "vledger_journal_seq",
            "Sequence number of the last journal record",
        )
        .expect("metric can be created");

        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(http_requests_total.clone()),
            Box::new(http_request_duration_seconds.clone()),
            Box::new(http_errors_total.clone()),
            Box::new(vendors_total.clone()),
            Box::new(payout_requests_total.clone()),
            Box::new(ledger_entries_total.clone()),
            Box::new(journal_seq.clone()),
        ];
        for collector in collectors {
            registry
                .register(collector)
                .expect("metric can be registered");
        }

        Self {
            inner: Arc::new(Inner {
                registry,
                http_requests_total,
                http_request_duration_seconds,
                http_errors_total,
                vendors_total,
                payout_requests_total,
                ledger_entries_total,
                journal_seq,
            }),
        }
    }

    /// Total request count across all labels.
    pub fn requests(&self) -> u64 {
        counter_sum(&self.inner.http_requests_total)
    }

    /// Total 4xx/5xx count across all labels.
    pub fn errors(&self) -> u64 {
        counter_sum(&self.inner.http_errors_total)
    }

    fn record_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.inner
            .http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();

        self.inner
            .http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);

        if status >= 400 {
            self.inner
                .http_errors_total
                .with_label_values(&[method, path, &status_str])
                .inc();
        }
    }

    /// Refresh the ledger gauges from a stats snapshot.
    pub fn observe_engine(&self, stats: &EngineStats) {
        let inner = &self.inner;
        inner.vendors_total.reset();
        inner
            .vendors_total
            .with_label_values(&["active"])
            .set(stats.vendors_active as f64);
        inner
            .vendors_total
            .with_label_values(&["blocked"])
            .set(stats.vendors_blocked as f64);

        inner.payout_requests_total.reset();
        self.set_request_counts("settlement", &stats.settlements);
        self.set_request_counts("withdrawal", &stats.withdrawals);

        inner.ledger_entries_total.set(stats.ledger_entries as f64);
        inner.journal_seq.set(stats.journal_seq as f64);
    }

    fn set_request_counts(&self, kind: &str, counts: &StatusCounts) {
        for (status, value) in [
            ("pending", counts.pending),
            ("approved", counts.approved),
            ("rejected", counts.rejected),
        ] {
            self.inner
                .payout_requests_total
                .with_label_values(&[kind, status])
                .set(value as f64);
        }
    }

    /// Gather all metrics and encode to Prometheus text format.
    pub fn gather_and_encode(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| format!("failed to encode metrics: {e}"))?;
        String::from_utf8(buffer).map_err(|e| format!("metrics encoding produced invalid UTF-8: {e}"))
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn counter_sum(counter: &IntCounterVec) -> u64 {
    counter
        .collect()
        .iter()
        .flat_map(|mf| mf.get_metric())
        .map(|m| m.get_counter().get_value() as u64)
        .sum()
}

/// Replace id segments with placeholders so label cardinality stays
/// bounded: the segment after `vendors` becomes `{vendor_id}` and numeric
/// segments become `{id}`.
fn normalize_path(path: &str) -> String {
    let mut previous = "";
    path.split('/')
        .map(|segment| {
            let normalized = if previous == "vendors" && !segment.is_empty() {
                "{vendor_id}"
            } else if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                "{id}"
            } else {
                segment
            };
            previous = segment;
            normalized
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Middleware that records HTTP request metrics.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let metrics = request.extensions().get::<ApiMetrics>().cloned();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());
    let start = Instant::now();

    let response = next.run(request).await;

    if let Some(m) = metrics {
        let duration = start.elapsed().as_secs_f64();
        m.record_request(&method, &path, response.status().as_u16(), duration);
    }

    response
}
