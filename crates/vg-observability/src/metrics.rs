//! Metrics instrumentation.
//!
//! Counter registration and recording helpers built on the `metrics`
//! crate. The hosting process decides on the exporter (Prometheus or
//! otherwise); without an installed recorder these calls are no-ops.

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Registers descriptions for all engine metrics. Call once at startup.
pub fn register_metrics() {
    describe_counter!(
        "vigil_events_recorded_total",
        "Security events recorded, labeled by category"
    );
    describe_counter!(
        "vigil_rules_triggered_total",
        "Rule triggers, labeled by rule id"
    );
    describe_counter!(
        "vigil_actions_executed_total",
        "Response actions executed, labeled by kind and outcome"
    );
    describe_counter!(
        "vigil_incidents_created_total",
        "Incidents created, labeled by severity"
    );
    describe_counter!(
        "vigil_incidents_resolved_total",
        "Incidents closed, labeled by mode (manual/auto)"
    );
    describe_counter!(
        "vigil_geo_lookup_failures_total",
        "Geo resolution failures and timeouts"
    );
    describe_gauge!(
        "vigil_blocked_sources",
        "Source addresses currently blocked"
    );
    describe_gauge!(
        "vigil_suspended_subjects",
        "Subjects currently suspended"
    );
}

/// Records one recorded event.
pub fn record_event(category: &str) {
    counter!("vigil_events_recorded_total", "category" => category.to_string()).increment(1);
}

/// Records one rule trigger.
pub fn record_rule_trigger(rule_id: &str) {
    counter!("vigil_rules_triggered_total", "rule" => rule_id.to_string()).increment(1);
}

/// Records one executed action outcome.
pub fn record_action(kind: &str, outcome: &str) {
    counter!(
        "vigil_actions_executed_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Records one created incident.
pub fn record_incident_created(severity: &str) {
    counter!("vigil_incidents_created_total", "severity" => severity.to_string()).increment(1);
}

/// Records one closed incident.
pub fn record_incident_resolved(auto: bool) {
    let mode = if auto { "auto" } else { "manual" };
    counter!("vigil_incidents_resolved_total", "mode" => mode).increment(1);
}

/// Records one geo lookup failure.
pub fn record_geo_failure() {
    counter!("vigil_geo_lookup_failures_total").increment(1);
}

/// Updates the enforcement gauges.
pub fn set_enforcement_gauges(blocked: usize, suspended: usize) {
    gauge!("vigil_blocked_sources").set(blocked as f64);
    gauge!("vigil_suspended_subjects").set(suspended as f64);
}
