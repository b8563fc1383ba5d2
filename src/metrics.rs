use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics exporter
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();

    let handle = builder
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    init_metric_descriptions();

    handle
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "chaintrace_records_ingested_total",
        "Records accepted and stored, by stream and status"
    );
    describe_counter!(
        "chaintrace_records_duplicate_total",
        "Idempotent re-submissions, by stream"
    );
    describe_counter!(
        "chaintrace_records_rejected_total",
        "Records rejected by validation, by stream"
    );
    describe_histogram!(
        "chaintrace_ingest_duration_seconds",
        "Ingest handling time, by stream"
    );
    describe_counter!(
        "chaintrace_queries_total",
        "Query surface requests, by endpoint"
    );
    describe_counter!(
        "chaintrace_trace_lookups_total",
        "Trace correlations, by outcome"
    );
}

/// Record an accepted record
pub fn record_ingested(stream: &str, status: &str) {
    counter!(
        "chaintrace_records_ingested_total",
        "stream" => stream.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
}

/// Record an idempotent duplicate submission
pub fn record_duplicate(stream: &str) {
    counter!(
        "chaintrace_records_duplicate_total",
        "stream" => stream.to_string(),
    )
    .increment(1);
}

/// Record a validation rejection
pub fn record_rejected(stream: &str) {
    counter!(
        "chaintrace_records_rejected_total",
        "stream" => stream.to_string(),
    )
    .increment(1);
}

/// Record ingest handling time
pub fn record_ingest_duration(stream: &str, duration: Duration) {
    histogram!(
        "chaintrace_ingest_duration_seconds",
        "stream" => stream.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record a query surface hit
pub fn record_query(endpoint: &str) {
    counter!(
        "chaintrace_queries_total",
        "endpoint" => endpoint.to_string(),
    )
    .increment(1);
}

/// Record a trace lookup outcome ("hit", "not_found", "error")
pub fn record_trace_lookup(outcome: &str) {
    counter!(
        "chaintrace_trace_lookups_total",
        "outcome" => outcome.to_string(),
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_metrics() {
        init_metric_descriptions();

        // Without an installed recorder these are no-ops; verify they don't panic.
        record_ingested("commands", "success");
        record_duplicate("rpc_calls");
        record_rejected("events");
        record_ingest_duration("commands", Duration::from_millis(2));
        record_query("cli-logs");
        record_trace_lookup("hit");
    }
}
