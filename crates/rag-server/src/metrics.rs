//! Prometheus metrics exposed at `/metrics`, registered once to a process-wide
//! registry so every handler can record against the same collectors.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

struct ServerMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    request_duration_seconds: Histogram,
    active_jobs: IntGauge,
}

static METRICS: OnceLock<ServerMetrics> = OnceLock::new();

#[allow(clippy::expect_used)]
fn metrics() -> &'static ServerMetrics {
    METRICS.get_or_init(|| {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("ragp_requests_total", "Total HTTP requests by route and status"),
            &["route", "status"],
        )
        .expect("valid requests_total opts");

        let request_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("ragp_request_duration_seconds", "HTTP request duration in seconds")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )
        .expect("valid request_duration_seconds opts");

        let active_jobs = IntGauge::new("ragp_active_jobs", "Schema discovery jobs currently in flight")
            .expect("valid active_jobs opts");

        registry.register(Box::new(requests_total.clone())).expect("register requests_total");
        registry
            .register(Box::new(request_duration_seconds.clone()))
            .expect("register request_duration_seconds");
        registry.register(Box::new(active_jobs.clone())).expect("register active_jobs");

        ServerMetrics {
            registry,
            requests_total,
            request_duration_seconds,
            active_jobs,
        }
    })
}

pub fn record_request(route: &str, status: u16) {
    metrics().requests_total.with_label_values(&[route, &status.to_string()]).inc();
}

pub fn observe_duration(seconds: f64) {
    metrics().request_duration_seconds.observe(seconds);
}

pub fn set_active_jobs(count: i64) {
    metrics().active_jobs.set(count);
}

/// Render every registered collector as Prometheus text exposition.
pub fn gather() -> Result<String, prometheus::Error> {
    let families = metrics().registry.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
