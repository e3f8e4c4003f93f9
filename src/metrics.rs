//! Metrics collection (spec §1: out of scope for the core, sketched per
//! §4.J's FULL note). Counts calls/errors/durations per upstream server
//! and per skill, using the teacher's `metrics` +
//! `metrics-exporter-prometheus` stack (`mcp/src/core/metrics.rs`).

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Installs the process-wide Prometheus recorder and serves `/metrics`
/// on `bind_addr`. Logged, not fatal, if a recorder is already installed
/// or the listener can't bind.
pub fn install(bind_addr: SocketAddr) {
    if let Err(e) = PrometheusBuilder::new().with_http_listener(bind_addr).install() {
        tracing::warn!(error = %e, %bind_addr, "failed to install prometheus metrics exporter");
    }
}

pub fn record_tool_call(server_id: &str, tool: &str, duration: Duration, success: bool) {
    metrics::histogram!(
        "skillflow_upstream_call_duration_ms",
        "server_id" => server_id.to_string(),
        "tool" => tool.to_string(),
    )
    .record(duration.as_millis() as f64);

    let counter_name = if success {
        "skillflow_upstream_call_success_total"
    } else {
        "skillflow_upstream_call_error_total"
    };
    metrics::counter!(
        counter_name,
        "server_id" => server_id.to_string(),
        "tool" => tool.to_string(),
    )
    .increment(1);
}

pub fn record_skill_run(skill_id: &str, status: &str) {
    metrics::counter!(
        "skillflow_skill_run_total",
        "skill_id" => skill_id.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
}
