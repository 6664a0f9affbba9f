//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define balancer metrics (admissions, pairs, dial failures, bytes)
//! - Expose a Prometheus-compatible scrape endpoint
//! - Track per-target and aggregate series
//!
//! # Metrics
//! - `lb_connections_accepted_total` (counter): node connections admitted
//! - `lb_admitted_connections` (gauge): node connections holding an admission slot
//! - `lb_active_pairs` (gauge): registered pairs
//! - `lb_pairs_opened_total` (counter): pairs registered, by `target_id`
//! - `lb_pairs_closed_total` (counter): pair teardowns, by `reason`
//! - `lb_dial_failures_total` (counter): failed target dials, by `endpoint`
//! - `lb_no_target_available_total` (counter): node connections closed unpaired
//! - `lb_relay_bytes_total` (counter): relayed bytes, by `direction`
//! - `lb_tasks_active` (gauge): supervised tasks running, by `task`
//!
//! Without [`init_metrics`] every recording call is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::load_balancer::TargetId;

/// Install the global recorder and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_connection_accepted() {
    ::metrics::counter!("lb_connections_accepted_total").increment(1);
}

pub fn set_admitted_connections(count: usize) {
    ::metrics::gauge!("lb_admitted_connections").set(count as f64);
}

pub fn set_active_pairs(count: usize) {
    ::metrics::gauge!("lb_active_pairs").set(count as f64);
}

pub fn record_pair_opened(target_id: &TargetId) {
    ::metrics::counter!("lb_pairs_opened_total", "target_id" => target_id.to_string()).increment(1);
}

pub fn record_pair_closed(reason: &'static str) {
    ::metrics::counter!("lb_pairs_closed_total", "reason" => reason).increment(1);
}

pub fn record_dial_failure(endpoint: &str) {
    ::metrics::counter!("lb_dial_failures_total", "endpoint" => endpoint.to_string()).increment(1);
}

pub fn record_no_target() {
    ::metrics::counter!("lb_no_target_available_total").increment(1);
}

pub fn record_relay_bytes(direction: &'static str, bytes: u64) {
    ::metrics::counter!("lb_relay_bytes_total", "direction" => direction).increment(bytes);
}

pub fn task_started(task: &'static str) {
    ::metrics::gauge!("lb_tasks_active", "task" => task).increment(1.0);
}

pub fn task_finished(task: &'static str) {
    ::metrics::gauge!("lb_tasks_active", "task" => task).decrement(1.0);
}
