//! Metrics collection and exposition.
//!
//! # Metrics
//! - `kubedb_health_active_loops` (gauge): running health check loops
//! - `kubedb_health_probes_total` (counter): completed probes by key
//! - `kubedb_health_failures_total` (counter): probes ending in failure by key, kind
//! - `kubedb_health_failed` (gauge): 1 when the key's threshold is reached
//! - `kubedb_health_open_clients` (gauge): probe clients not yet closed
//! - `kubedb_health_probe_duration_seconds` (histogram): probe latency
//!
//! Per-key gauges drop back to zero once the key's loop stops.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::health::card::FailureKind;

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_active_loops(count: usize) {
    metrics::gauge!("kubedb_health_active_loops").set(count as f64);
}

/// Record the outcome of one probe.
pub fn record_probe(
    key: &str,
    elapsed: Duration,
    failure: Option<FailureKind>,
    has_failed: bool,
    open_clients: i32,
) {
    let key = key.to_string();
    metrics::counter!("kubedb_health_probes_total", "key" => key.clone()).increment(1);
    metrics::histogram!("kubedb_health_probe_duration_seconds", "key" => key.clone())
        .record(elapsed.as_secs_f64());
    if let Some(kind) = failure {
        metrics::counter!(
            "kubedb_health_failures_total",
            "key" => key.clone(),
            "kind" => kind.as_str()
        )
        .increment(1);
    }
    metrics::gauge!("kubedb_health_failed", "key" => key.clone())
        .set(if has_failed { 1.0 } else { 0.0 });
    metrics::gauge!("kubedb_health_open_clients", "key" => key).set(f64::from(open_clients));
}

/// Reset the per-key gauges of a loop that stopped.
pub fn clear_key(key: &str) {
    let key = key.to_string();
    metrics::gauge!("kubedb_health_failed", "key" => key.clone()).set(0.0);
    metrics::gauge!("kubedb_health_open_clients", "key" => key).set(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    fn gauge_value(rendered: &str, name: &str, key: &str) -> Option<f64> {
        let prefix = format!("{}{{key=\"{}\"}} ", name, key);
        rendered
            .lines()
            .find_map(|line| line.strip_prefix(prefix.as_str()))
            .and_then(|value| value.trim().parse().ok())
    }

    #[test]
    fn test_clear_key_resets_gauges() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_probe(
                "ns/db",
                Duration::from_millis(20),
                Some(FailureKind::PingFailure),
                true,
                1,
            );
        });
        let rendered = handle.render();
        assert_eq!(gauge_value(&rendered, "kubedb_health_failed", "ns/db"), Some(1.0));
        assert_eq!(gauge_value(&rendered, "kubedb_health_open_clients", "ns/db"), Some(1.0));

        metrics::with_local_recorder(&recorder, || clear_key("ns/db"));
        let rendered = handle.render();
        assert_eq!(gauge_value(&rendered, "kubedb_health_failed", "ns/db"), Some(0.0));
        assert_eq!(gauge_value(&rendered, "kubedb_health_open_clients", "ns/db"), Some(0.0));
    }
}
