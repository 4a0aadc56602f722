//! Event risk scoring.
//!
//! A bounded heuristic indicator of how suspicious a single event is,
//! computed exactly once when the event is recorded and never
//! recomputed. The score is the category base plus situational
//! modifiers, clamped to 0-100.

use vg_core::event::{actions, EventCategory};
use vg_core::geo::GeoLocation;

/// Start of the normal activity window (hour of day, inclusive).
const NORMAL_HOURS_START: u32 = 6;
/// End of the normal activity window (hour of day, exclusive).
const NORMAL_HOURS_END: u32 = 22;

/// Modifier for an anonymizing proxy.
const MOD_ANONYMOUS_PROXY: u32 = 15;
/// Modifier for an anonymity network (e.g. Tor).
const MOD_ANONYMITY_NETWORK: u32 = 25;
/// Modifier for an already-blocked source address.
const MOD_SOURCE_BLOCKED: u32 = 40;
/// Modifier for an already-suspended subject.
const MOD_SUBJECT_SUSPENDED: u32 = 35;
/// Modifier for activity outside normal hours.
const MOD_OFF_HOURS: u32 = 10;

/// Inputs to the risk computation.
#[derive(Debug, Clone, Copy)]
pub struct RiskInputs<'a> {
    /// Event category.
    pub category: EventCategory,
    /// Sub-category string.
    pub action: &'a str,
    /// Resolved location, if any.
    pub location: Option<&'a GeoLocation>,
    /// Hour of day the event is being processed.
    pub hour_of_day: u32,
    /// Whether the source address is currently blocked.
    pub source_blocked: bool,
    /// Whether the subject is currently suspended.
    pub subject_suspended: bool,
}

/// Base score for a category/action pair.
fn base_score(category: EventCategory, action: &str) -> u32 {
    match category {
        EventCategory::Authentication if action == actions::LOGIN_FAILED => 30,
        EventCategory::Authentication if action == actions::LOGIN_SUCCESS => 10,
        EventCategory::Authentication => 10,
        EventCategory::CredentialAccess => 25,
        EventCategory::ApiUsage => 5,
        EventCategory::SystemAccess => 20,
        EventCategory::DataAccess => 15,
    }
}

/// Computes the risk score for an event.
pub fn score(inputs: &RiskInputs<'_>) -> u8 {
    let mut score = base_score(inputs.category, inputs.action);

    if let Some(location) = inputs.location {
        if location.is_anonymous_proxy {
            score += MOD_ANONYMOUS_PROXY;
        }
        if location.is_anonymity_network {
            score += MOD_ANONYMITY_NETWORK;
        }
    }
    if inputs.source_blocked {
        score += MOD_SOURCE_BLOCKED;
    }
    if inputs.subject_suspended {
        score += MOD_SUBJECT_SUSPENDED;
    }
    if inputs.hour_of_day < NORMAL_HOURS_START || inputs.hour_of_day >= NORMAL_HOURS_END {
        score += MOD_OFF_HOURS;
    }

    score.min(100) as u8
}
