// Metrics for the lock service
// Lease counters are recorded by the manager and sweeper through the `metrics`
// facade; this module describes them and installs the Prometheus exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{describe_counter, describe_gauge, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Describe every metric the service emits. Call once at startup.
pub fn init_metrics() {
    describe_counter!(
        "leasehold_acquire_total",
        "Acquire attempts by result (granted, denied)"
    );
    describe_counter!(
        "leasehold_renew_total",
        "Renew requests by result (renewed, denied)"
    );
    describe_counter!(
        "leasehold_release_total",
        "Release requests by result (released, denied)"
    );
    describe_counter!(
        "leasehold_reclaimed_total",
        "Expired leases removed by the sweeper"
    );
    describe_gauge!(
        "leasehold_leases_alive",
        "Live leases observed by the last sweep"
    );
    describe_histogram!(
        "leasehold_acquire_duration_seconds",
        "Time from acquire request to result, including waiting"
    );
}

/// Serve `/metrics` on `address`. Must be called inside a tokio runtime.
pub fn install_prometheus_exporter(address: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
}

pub fn record_acquire_duration(status: &'static str, seconds: f64) {
    histogram!("leasehold_acquire_duration_seconds", "status" => status).record(seconds);
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
