//! Metrics collection and exposition.
//!
//! # Metrics
//! - `pg_ssl_connections_total` (counter): accepted connections by `outcome`
//!   (`denied`, `not_allowed`, `ssl_request`, `other`, `inconclusive`)
//! - `pg_ssl_accept_errors_total` (counter): inner listener accept failures
//! - `pg_ssl_active_connections` (gauge): connections being served
//!
//! Recording is a no-op until [`init_metrics`] installs a recorder.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_classification(outcome: &'static str) {
    ::metrics::counter!("pg_ssl_connections_total", "outcome" => outcome).increment(1);
}

pub fn record_accept_error() {
    ::metrics::counter!("pg_ssl_accept_errors_total").increment(1);
}

pub fn set_active_connections(count: u64) {
    ::metrics::gauge!("pg_ssl_active_connections").set(count as f64);
}
