//! Geographic building blocks for Waymark.
//!
//! This crate provides:
//! - Coordinate, place and circular region value objects
//! - The collaborator traits location lookups depend on (geocoding,
//!   device positioning, permission checks)
//! - An asynchronous, single-worker [`LocationFinder`]

mod error;
mod finder;
mod provider;
mod types;

pub use error::GeoError;
pub use finder::{FailureCallback, LocationFinder, SuccessCallback};
pub use provider::{
    CallbackExecutor, GeocodingProvider, LocationPermission, PositionSource, StaticPermission,
};
pub use types::{CircularRegion, Coordinates, Distance, Place};
