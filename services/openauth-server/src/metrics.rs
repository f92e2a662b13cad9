//! Prometheus metrics exposition
//!
//! The engine emits token lifecycle counters through the `metrics` facade;
//! this module installs the recorder they land in and adds HTTP metrics:
//!
//! - `openauth_http_requests_total` (counter): labels `endpoint`, `status`
//! - `openauth_http_request_duration_seconds` (histogram): label `endpoint`

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "openauth_http_request_duration_seconds";

/// 1ms to 30s, covering the configurable request timeout.
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

fn builder() -> Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
        .context("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> Result<PrometheusHandle> {
    builder()?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Record a completed OAuth endpoint request.
pub fn record_request(endpoint: &'static str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "openauth_http_requests_total",
        "endpoint" => endpoint,
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(DURATION_METRIC, "endpoint" => endpoint).record(duration_secs);
}
