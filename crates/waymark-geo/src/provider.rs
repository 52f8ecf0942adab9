//! Collaborators that location lookups are built on.
//!
//! All of these are injected by the caller; nothing here is a process-wide
//! singleton.

use async_trait::async_trait;

use crate::{Coordinates, GeoError, Place};

/// Forward and reverse geocoding.
///
/// Implementations are synchronous. They are always invoked off the thread
/// that requested the lookup.
pub trait GeocodingProvider: Send + Sync {
    /// Human-readable address for a location.
    fn reverse_geocode(&self, location: Coordinates) -> Option<String>;

    /// Coarse context for a location, usable as a reference for
    /// [`GeocodingProvider::geocode`].
    ///
    /// This should carry just enough to disambiguate a search (e.g. city and
    /// state) without street-level detail.
    fn reverse_geocode_for_reference(&self, location: Coordinates) -> Option<String>;

    /// Resolve a free-text address near the given reference context.
    fn geocode(&self, address: &str, reference: &str) -> Option<Place>;
}

/// Source of the device's current position.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, GeoError>;
}

/// Synchronous check for location access.
pub trait LocationPermission: Send + Sync {
    fn is_granted(&self) -> bool;
}

/// A permission answer fixed at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticPermission(pub bool);

impl LocationPermission for StaticPermission {
    fn is_granted(&self) -> bool {
        self.0
    }
}

/// Execution context that lookup callbacks are delivered on.
pub trait CallbackExecutor: Send + Sync {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>);
}

impl CallbackExecutor for tokio::runtime::Handle {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        self.spawn(async move { job() });
    }
}
