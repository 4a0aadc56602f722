//! # vg-core
//!
//! Core data models and shared infrastructure for Vigil: security
//! events, geolocation, incidents, behavior profiles, enforcement
//! markers, the durable store abstraction, and the internal
//! notification bus.

pub mod alert;
pub mod bus;
pub mod clock;
pub mod enforcement;
pub mod event;
pub mod geo;
pub mod incident;
pub mod profile;
pub mod recent;
pub mod store;

pub use alert::{AlertLog, SecurityAlert};
pub use bus::{NotificationBus, SecurityNotification};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use enforcement::{EnforcementState, SweepStats};
pub use event::{EventCategory, NewEvent, SecurityEvent, Severity};
pub use geo::{GeoError, GeoLocation, GeoResolver, StaticGeoResolver};
pub use incident::{
    ActionOutcome, Actor, ExecutedAction, Incident, IncidentError, IncidentStatus, TimelineEntry,
    TimelineKind,
};
pub use profile::{BehaviorProfile, ProfileStore};
pub use recent::RecentEvents;
pub use store::{MemoryStore, Store, StoreError, StoreResult};

#[cfg(feature = "redis-store")]
pub use store::{RedisStore, RedisStoreConfig};
