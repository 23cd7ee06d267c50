//! Counters and gauges for registry and bus activity.
//!
//! Emitted through the `metrics` facade; without an installed recorder every
//! call is a no-op.

use crate::capability::{Capability, Modality};
use crate::events::EventCategory;

pub const SERVICES_CREATED: &str = "capcore_services_created_total";
pub const SERVICES_DESTROYED: &str = "capcore_services_destroyed_total";
pub const RESOLUTION_FAILURES: &str = "capcore_service_resolution_failures_total";
pub const LIVE_SERVICES: &str = "capcore_live_services";
pub const EVENTS_PUBLISHED: &str = "capcore_events_published_total";
pub const MODEL_TRANSITIONS: &str = "capcore_model_transitions_total";

pub fn record_service_created(capability: Capability, live: usize) {
    ::metrics::counter!(SERVICES_CREATED, "capability" => capability.as_str()).increment(1);
    set_live_services(live);
}

pub fn record_service_destroyed(capability: Capability, live: usize) {
    ::metrics::counter!(SERVICES_DESTROYED, "capability" => capability.as_str()).increment(1);
    set_live_services(live);
}

pub fn record_resolution_failure(capability: Capability) {
    ::metrics::counter!(RESOLUTION_FAILURES, "capability" => capability.as_str()).increment(1);
}

pub fn set_live_services(live: usize) {
    ::metrics::gauge!(LIVE_SERVICES).set(live as f64);
}

pub fn record_event_published(category: EventCategory) {
    ::metrics::counter!(EVENTS_PUBLISHED, "category" => category.as_str()).increment(1);
}

pub fn record_model_transition(modality: Modality, transition: &'static str) {
    ::metrics::counter!(
        MODEL_TRANSITIONS,
        "modality" => modality.as_str(),
        "transition" => transition
    )
    .increment(1);
}
