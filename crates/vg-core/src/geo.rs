//! Geolocation types and the geo resolver collaborator boundary.
//!
//! Locations are value types compared by great-circle distance. The
//! actual IP-to-location lookup is an external service behind the
//! [`GeoResolver`] trait; the engine never depends on a concrete
//! provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use thiserror::Error;

/// Mean Earth radius in kilometers, used for great-circle distance.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Errors that can occur during geolocation lookup.
#[derive(Error, Debug, Clone)]
pub enum GeoError {
    /// The resolver backend failed.
    #[error("Geo lookup failed: {0}")]
    Lookup(String),

    /// The resolver has no record for the address.
    #[error("No location record for address: {0}")]
    Unresolvable(IpAddr),
}

/// A resolved geographic location for a source address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// ISO country name or code.
    pub country: String,
    /// Region or state.
    pub region: String,
    /// City name.
    pub city: String,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Network operator / ISP name.
    pub isp: String,
    /// Whether the address is behind an anonymizing proxy.
    pub is_anonymous_proxy: bool,
    /// Whether the address belongs to an anonymity network (e.g. Tor).
    pub is_anonymity_network: bool,
}

impl GeoLocation {
    /// Creates a location from coordinates with empty metadata.
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            country: String::new(),
            region: String::new(),
            city: String::new(),
            latitude,
            longitude,
            isp: String::new(),
            is_anonymous_proxy: false,
            is_anonymity_network: false,
        }
    }

    /// Synthetic location for private/loopback source addresses.
    ///
    /// Events originating inside the local network short-circuit here and
    /// never reach the external resolver.
    pub fn local() -> Self {
        Self {
            country: "Local".to_string(),
            region: "Local".to_string(),
            city: "Local Network".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            isp: "Internal".to_string(),
            is_anonymous_proxy: false,
            is_anonymity_network: false,
        }
    }

    /// Great-circle distance to another location in kilometers.
    pub fn distance_km(&self, other: &GeoLocation) -> f64 {
        haversine_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// Whether the location hides the caller's origin.
    pub fn is_anonymized(&self) -> bool {
        self.is_anonymous_proxy || self.is_anonymity_network
    }
}

/// Haversine great-circle distance between two coordinate pairs, in km.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Returns true for addresses that should never be sent to the resolver:
/// loopback, RFC 1918 private ranges, link-local, and IPv6 unique-local.
pub fn is_non_global(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique-local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 link-local
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

/// External collaborator that resolves a source address to a location.
///
/// Implementations must be cheap to share across tasks; the engine bounds
/// every call with its own timeout.
#[async_trait]
pub trait GeoResolver: Send + Sync + 'static {
    /// Resolves an address to a location record.
    async fn resolve(&self, addr: IpAddr) -> Result<GeoLocation, GeoError>;
}

/// A resolver backed by an explicit address table.
///
/// Used in tests and in deployments where the upstream geo service is
/// replaced by a fixed mapping. Unknown addresses either fall back to a
/// configured default or fail with [`GeoError::Unresolvable`].
#[derive(Debug, Default)]
pub struct StaticGeoResolver {
    entries: HashMap<IpAddr, GeoLocation>,
    fallback: Option<GeoLocation>,
}

impl StaticGeoResolver {
    /// Creates an empty resolver with no fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fixed mapping for an address.
    pub fn with_entry(mut self, addr: IpAddr, location: GeoLocation) -> Self {
        self.entries.insert(addr, location);
        self
    }

    /// Sets the location returned for unknown addresses.
    pub fn with_fallback(mut self, location: GeoLocation) -> Self {
        self.fallback = Some(location);
        self
    }
}

#[async_trait]
impl GeoResolver for StaticGeoResolver {
    async fn resolve(&self, addr: IpAddr) -> Result<GeoLocation, GeoError> {
        if let Some(location) = self.entries.get(&addr) {
            return Ok(location.clone());
        }
        self.fallback
            .clone()
            .ok_or(GeoError::Unresolvable(addr))
    }
}
