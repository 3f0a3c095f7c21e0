//! Prometheus-compatible metrics endpoint for the Latitude server.
//!
//! HTTP-path counters live here as atomics; engine lifetime totals
//! (promotions, demotions, stored signals) are read from the store at
//! scrape time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Global metrics registry.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// Total HTTP requests served.
    http_requests_total: AtomicU64,
    /// Total HTTP errors (4xx + 5xx).
    http_errors_total: AtomicU64,
    /// Total signals accepted at ingestion.
    signals_ingested_total: AtomicU64,
    /// Total duplicate signal deliveries ignored.
    signals_duplicate_total: AtomicU64,
    /// Total nudges delivered through the pull endpoint.
    nudges_delivered_total: AtomicU64,
    /// Server start time for uptime calculation.
    started_at: Instant,
}

/// Lifetime totals read from the store at scrape time.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineTotals {
    pub signals_stored: u64,
    pub promotions_total: u64,
    pub demotions_total: u64,
    pub nudges_pending: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                http_requests_total: AtomicU64::new(0),
                http_errors_total: AtomicU64::new(0),
                signals_ingested_total: AtomicU64::new(0),
                signals_duplicate_total: AtomicU64::new(0),
                nudges_delivered_total: AtomicU64::new(0),
                started_at: Instant::now(),
            }),
        }
    }

    pub fn inc_http_requests(&self) {
        self.inner
            .http_requests_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_http_errors(&self) {
        self.inner.http_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_signals_ingested(&self) {
        self.inner
            .signals_ingested_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_signals_duplicate(&self) {
        self.inner
            .signals_duplicate_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_nudges_delivered(&self) {
        self.inner
            .nudges_delivered_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }

    pub fn render_prometheus(&self, totals: &EngineTotals) -> String {
        let m = &self.inner;
        format!(
            r#"# HELP latitude_uptime_seconds Time since the server started.
# TYPE latitude_uptime_seconds gauge
latitude_uptime_seconds {}

# HELP latitude_http_requests_total Total HTTP requests served.
# TYPE latitude_http_requests_total counter
latitude_http_requests_total {}

# HELP latitude_http_errors_total Total HTTP errors (4xx/5xx).
# TYPE latitude_http_errors_total counter
latitude_http_errors_total {}

# HELP latitude_signals_ingested_total Signals accepted at ingestion.
# TYPE latitude_signals_ingested_total counter
latitude_signals_ingested_total {}

# HELP latitude_signals_duplicate_total Duplicate signal deliveries ignored.
# TYPE latitude_signals_duplicate_total counter
latitude_signals_duplicate_total {}

# HELP latitude_nudges_delivered_total Nudges delivered through the pull endpoint.
# TYPE latitude_nudges_delivered_total counter
latitude_nudges_delivered_total {}

# HELP latitude_signals_stored Lifetime signals in the store.
# TYPE latitude_signals_stored gauge
latitude_signals_stored {}

# HELP latitude_promotions_total Lifetime accepted promotions.
# TYPE latitude_promotions_total counter
latitude_promotions_total {}

# HELP latitude_demotions_total Lifetime demotions.
# TYPE latitude_demotions_total counter
latitude_demotions_total {}

# HELP latitude_nudges_pending Nudges waiting to be pulled.
# TYPE latitude_nudges_pending gauge
latitude_nudges_pending {}
"#,
            self.uptime_secs(),
            m.http_requests_total.load(Ordering::Relaxed),
            m.http_errors_total.load(Ordering::Relaxed),
            m.signals_ingested_total.load(Ordering::Relaxed),
            m.signals_duplicate_total.load(Ordering::Relaxed),
            m.nudges_delivered_total.load(Ordering::Relaxed),
            totals.signals_stored,
            totals.promotions_total,
            totals.demotions_total,
            totals.nudges_pending,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
