//! Metrics counters for the connection layer.
//!
//! Thin wrappers over the `metrics` crate; an exporter is wired by the host
//! application, so these are no-ops until a recorder is installed.

use metrics::{counter, describe_counter};

/// Registers metric descriptions. Call once at startup.
pub fn register_metrics() {
    describe_counter!(
        "sh_connections_attempted_total",
        "Connection attempts per service"
    );
    describe_counter!(
        "sh_connections_succeeded_total",
        "Successful connections per service"
    );
    describe_counter!(
        "sh_connections_failed_total",
        "Failed connection attempts per service"
    );
    describe_counter!("sh_audit_events_total", "Audit events appended");
    describe_counter!("sh_audit_flushes_total", "Audit flush outcomes");
}

pub fn record_connection_attempt(service: &'static str) {
    counter!("sh_connections_attempted_total", "service" => service).increment(1);
}

pub fn record_connection_success(service: &'static str) {
    counter!("sh_connections_succeeded_total", "service" => service).increment(1);
}

pub fn record_connection_failure(service: &'static str) {
    counter!("sh_connections_failed_total", "service" => service).increment(1);
}

pub fn record_audit_event(category: &'static str) {
    counter!("sh_audit_events_total", "category" => category).increment(1);
}

pub fn record_flush(outcome: &'static str) {
    counter!("sh_audit_flushes_total", "outcome" => outcome).increment(1);
}
