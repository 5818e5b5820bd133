use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize Prometheus metrics exporter
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    init_metric_descriptions();

    Ok(handle)
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "sherlock_lines_total",
        "Access log lines read, by outcome (parsed, unparseable, duplicate)"
    );
    describe_gauge!("sherlock_records", "Records currently held in memory");
    describe_counter!(
        "sherlock_evictions_total",
        "Records evicted because the store was at capacity"
    );
    describe_counter!(
        "sherlock_tailer_reconnects_total",
        "Log stream reconnects, by reason"
    );
    describe_counter!(
        "sherlock_publish_total",
        "Status publish attempts, by result"
    );
    describe_gauge!("sherlock_info", "Build information");

    gauge!("sherlock_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record the outcome of one log line
pub fn record_line(outcome: &'static str) {
    counter!("sherlock_lines_total", "outcome" => outcome).increment(1);
}

pub fn record_eviction() {
    counter!("sherlock_evictions_total").increment(1);
}

pub fn set_store_size(len: usize) {
    gauge!("sherlock_records").set(len as f64);
}

pub fn record_reconnect(reason: &'static str) {
    counter!("sherlock_tailer_reconnects_total", "reason" => reason).increment(1);
}

pub fn record_publish(result: &'static str) {
    counter!("sherlock_publish_total", "result" => result).increment(1);
}
