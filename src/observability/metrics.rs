//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): dispatched requests by outcome
//!   (`matched`, `not_found`, `error`)
//! - `gateway_dispatch_duration_seconds` (histogram): matching plus plugin chain
//! - `gateway_routes` (gauge): size of the cached route table
//! - `gateway_refresh_total` (counter): refreshes by stage and result
//! - `gateway_plugin_instances` (gauge): memoized plugin instances
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// How a dispatched request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Matched,
    NotFound,
    Error,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Matched => "matched",
            DispatchOutcome::NotFound => "not_found",
            DispatchOutcome::Error => "error",
        }
    }
}

/// Refresh pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStage {
    Definitions,
    Routes,
}

impl RefreshStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshStage::Definitions => "definitions",
            RefreshStage::Routes => "routes",
        }
    }
}

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_dispatch(outcome: DispatchOutcome, route: Option<&str>, start: Instant) {
    let route = route.unwrap_or("none").to_string();
    counter!(
        "gateway_requests_total",
        "outcome" => outcome.as_str(),
        "route" => route.clone()
    )
    .increment(1);
    histogram!("gateway_dispatch_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_route_count(count: usize) {
    gauge!("gateway_routes").set(count as f64);
}

pub fn record_refresh(stage: RefreshStage, success: bool) {
    let result = if success { "success" } else { "failure" };
    counter!("gateway_refresh_total", "stage" => stage.as_str(), "result" => result).increment(1);
}

pub fn record_plugin_instances(count: usize) {
    gauge!("gateway_plugin_instances").set(count as f64);
}
