//! Error types for location lookups.

use thiserror::Error;

/// Errors reported by location lookups.
///
/// These are never returned from [`crate::LocationFinder::find`]; they are
/// handed to the registered failure callback instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeoError {
    /// Location access has not been granted by the environment.
    #[error("location permission denied: {0}")]
    PermissionDenied(String),

    /// Positioning or geocoding produced no result.
    #[error("location lookup failed: {0}")]
    Lookup(String),

    /// The lookup queue is full.
    #[error("location lookup queue is full")]
    QueueFull,

    /// The lookup worker has stopped.
    #[error("location lookup worker has stopped")]
    WorkerStopped,
}
