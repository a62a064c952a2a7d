//! Prometheus metrics exposition
//!
//! Gateway-level series recorded here:
//!
//! - `gateway_requests_total` (counter): labels `status`, `stream`
//! - `gateway_request_duration_seconds` (histogram): label `status`
//! - `gateway_upstream_errors_total` (counter): label `error_type`
//!
//! The pool crate records `pool_accounts_disabled_total{reason}` and the
//! `pool_accounts_available` gauge through the same global recorder.

use anyhow::Context;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "gateway_request_duration_seconds";

/// 5ms up to the 60s default upstream timeout
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> anyhow::Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
        .context("setting histogram buckets")
}

/// Install the Prometheus recorder globally and return a handle for rendering.
///
/// Explicit buckets make the duration render as a histogram (`_bucket` lines)
/// rather than the default summary.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    builder()?
        .install_recorder()
        .context("installing Prometheus recorder")
}

/// Build a recorder without installing it (tests use it with a local guard).
#[cfg(test)]
pub fn build_recorder() -> metrics_exporter_prometheus::PrometheusRecorder {
    builder()
        .expect("histogram buckets are valid")
        .build_recorder()
}

/// Record a completed chat request.
pub fn record_request(status: u16, stream: bool, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "gateway_requests_total",
        "status" => status_str.clone(),
        "stream" => stream.to_string()
    )
    .increment(1);
    metrics::histogram!(DURATION_METRIC, "status" => status_str).record(duration_secs);
}

/// Record a failed upstream attempt (`transport`, `disabling`, `transient`).
pub fn record_upstream_error(error_type: &str) {
    metrics::counter!("gateway_upstream_errors_total", "error_type" => error_type.to_string())
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_request(200, false, 0.05);
        record_upstream_error("transport");
    }

    #[test]
    fn record_request_increments_counter_and_histogram() {
        let recorder = build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request(200, true, 0.042);
        record_request(400, false, 0.001);

        let output = handle.render();
        assert!(output.contains("gateway_requests_total"));
        assert!(output.contains("status=\"200\""));
        assert!(output.contains("stream=\"true\""));
        assert!(output.contains("status=\"400\""));
        assert!(output.contains("stream=\"false\""));
        assert!(
            output.contains("gateway_request_duration_seconds_bucket"),
            "histogram must render _bucket lines"
        );
    }

    #[test]
    fn record_upstream_error_labels_classification() {
        let recorder = build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_upstream_error("disabling");
        record_upstream_error("transient");

        let output = handle.render();
        assert!(output.contains("gateway_upstream_errors_total"));
        assert!(output.contains("error_type=\"disabling\""));
        assert!(output.contains("error_type=\"transient\""));
    }

    #[test]
    fn histogram_buckets_span_timeout_range() {
        let recorder = build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request(200, false, 0.003);

        let output = handle.render();
        assert!(output.contains("le=\"0.005\""));
        assert!(output.contains("le=\"60\""));
        assert!(output.contains("le=\"+Inf\""));
    }
}
