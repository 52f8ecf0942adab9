//! Geographic value objects.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mean Earth radius used for great-circle distances, in metres.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A point on the Earth's surface in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle (haversine) distance to another point.
    pub fn distance_to(&self, other: &Coordinates) -> Distance {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        Distance::from_m(EARTH_RADIUS_M * c)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// A location together with its human-readable address.
///
/// The address is a free-form label; it is never used for matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub coordinates: Coordinates,
    pub address: String,
}

impl Place {
    pub fn new(coordinates: Coordinates, address: impl Into<String>) -> Self {
        Self {
            coordinates,
            address: address.into(),
        }
    }
}

/// A unit-agnostic distance, stored in metres.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Distance(f64);

impl Distance {
    pub fn from_km(km: f64) -> Self {
        Self(km * 1000.0)
    }

    pub fn from_m(m: f64) -> Self {
        Self(m)
    }

    pub fn from_cm(cm: f64) -> Self {
        Self(cm / 100.0)
    }

    pub fn as_km(&self) -> f64 {
        self.0 / 1000.0
    }

    pub fn as_m(&self) -> f64 {
        self.0
    }

    pub fn as_cm(&self) -> f64 {
        self.0 * 100.0
    }
}

/// A circle on the Earth's surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircularRegion {
    pub center: Coordinates,
    pub radius: Distance,
}

impl CircularRegion {
    pub fn new(center: Coordinates, radius: Distance) -> Self {
        Self { center, radius }
    }

    /// Whether `point` lies inside or on the boundary of the region.
    pub fn contains(&self, point: &Coordinates) -> bool {
        self.center.distance_to(point) <= self.radius
    }
}
