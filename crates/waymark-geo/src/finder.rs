//! Asynchronous location and address lookups.
//!
//! Lookups are queued to a single worker task and run one at a time. Results
//! never come back from [`LocationFinder::find`]; they are delivered to the
//! registered success or failure callback on the caller's
//! [`CallbackExecutor`].

use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::{
    CallbackExecutor, Coordinates, GeoError, GeocodingProvider, LocationPermission, Place,
    PositionSource,
};

/// Maximum number of lookups waiting behind the one in progress.
const LOOKUP_QUEUE_SIZE: usize = 8;

/// Callback invoked with the result of a successful lookup.
pub type SuccessCallback = Arc<dyn Fn(Place) + Send + Sync>;

/// Callback invoked with the reason a lookup failed.
pub type FailureCallback = Arc<dyn Fn(GeoError) + Send + Sync>;

struct LookupRequest {
    query: Option<String>,
}

/// Registered callbacks plus the context they run on.
struct Delivery {
    on_success: RwLock<Option<SuccessCallback>>,
    on_failure: RwLock<Option<FailureCallback>>,
    executor: Arc<dyn CallbackExecutor>,
}

impl Delivery {
    fn deliver(&self, outcome: Result<Place, GeoError>) {
        match outcome {
            Ok(place) => {
                let callback = self.on_success.read().ok().and_then(|cb| cb.clone());
                match callback {
                    Some(cb) => self.executor.execute(Box::new(move || cb(place))),
                    None => trace!("no success callback registered, dropping result"),
                }
            }
            Err(error) => {
                let callback = self.on_failure.read().ok().and_then(|cb| cb.clone());
                match callback {
                    Some(cb) => self.executor.execute(Box::new(move || cb(error))),
                    None => trace!(error = %error, "no failure callback registered, dropping failure"),
                }
            }
        }
    }
}

/// Finds the device's current place, or a place matching a free-text address.
///
/// Must be created inside a tokio runtime; the worker task is spawned on
/// construction and stops once the finder is dropped.
pub struct LocationFinder {
    queue: mpsc::Sender<LookupRequest>,
    delivery: Arc<Delivery>,
}

impl LocationFinder {
    /// Create a finder and spawn its worker.
    pub fn new(
        geocoder: Arc<dyn GeocodingProvider>,
        positions: Arc<dyn PositionSource>,
        permission: Arc<dyn LocationPermission>,
        executor: Arc<dyn CallbackExecutor>,
    ) -> Self {
        let (queue, requests) = mpsc::channel(LOOKUP_QUEUE_SIZE);
        let delivery = Arc::new(Delivery {
            on_success: RwLock::new(None),
            on_failure: RwLock::new(None),
            executor,
        });

        let worker = LookupWorker {
            geocoder,
            positions,
            permission,
            delivery: Arc::clone(&delivery),
            requests,
        };
        tokio::spawn(worker.run());

        Self { queue, delivery }
    }

    /// Replace the success callback.
    pub fn set_on_success(&self, callback: impl Fn(Place) + Send + Sync + 'static) {
        if let Ok(mut slot) = self.delivery.on_success.write() {
            *slot = Some(Arc::new(callback));
        }
    }

    /// Replace the failure callback.
    pub fn set_on_failure(&self, callback: impl Fn(GeoError) + Send + Sync + 'static) {
        if let Ok(mut slot) = self.delivery.on_failure.write() {
            *slot = Some(Arc::new(callback));
        }
    }

    /// Queue a lookup.
    ///
    /// `None` looks up the address of the device's current position.
    /// `Some(address)` resolves that address using the current position as
    /// context. A lookup cannot be cancelled once queued.
    pub fn find(&self, query: Option<String>) {
        match self.queue.try_send(LookupRequest { query }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("location lookup queue full, rejecting request");
                self.delivery.deliver(Err(GeoError::QueueFull));
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.delivery.deliver(Err(GeoError::WorkerStopped));
            }
        }
    }
}

struct LookupWorker {
    geocoder: Arc<dyn GeocodingProvider>,
    positions: Arc<dyn PositionSource>,
    permission: Arc<dyn LocationPermission>,
    delivery: Arc<Delivery>,
    requests: mpsc::Receiver<LookupRequest>,
}

impl LookupWorker {
    async fn run(mut self) {
        debug!("location lookup worker started");

        while let Some(request) = self.requests.recv().await {
            let outcome = self.lookup(request.query).await;
            if let Err(ref e) = outcome {
                debug!(error = %e, "location lookup failed");
            }
            self.delivery.deliver(outcome);
        }

        debug!("location lookup worker stopped");
    }

    async fn lookup(&self, query: Option<String>) -> Result<Place, GeoError> {
        if !self.permission.is_granted() {
            return Err(GeoError::PermissionDenied(
                "location access has not been granted".to_string(),
            ));
        }

        let position = self.positions.current_position().await?;
        let geocoder = Arc::clone(&self.geocoder);

        tokio::task::spawn_blocking(move || resolve(geocoder.as_ref(), position, query.as_deref()))
            .await
            .map_err(|e| GeoError::Lookup(format!("geocoding task failed: {e}")))?
    }
}

fn resolve(
    geocoder: &dyn GeocodingProvider,
    position: Coordinates,
    query: Option<&str>,
) -> Result<Place, GeoError> {
    match query {
        None => geocoder
            .reverse_geocode(position)
            .map(|address| Place::new(position, address))
            .ok_or_else(|| GeoError::Lookup(format!("no address found for {position}"))),
        Some(address) => {
            let reference = geocoder
                .reverse_geocode_for_reference(position)
                .ok_or_else(|| GeoError::Lookup(format!("no reference context for {position}")))?;
            geocoder
                .geocode(address, &reference)
                .ok_or_else(|| GeoError::Lookup(format!("address not found: {address}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticPermission;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::{Notify, mpsc::UnboundedReceiver};

    struct FakeGeocoder;

    impl GeocodingProvider for FakeGeocoder {
        fn reverse_geocode(&self, location: Coordinates) -> Option<String> {
            (location.latitude >= 0.0).then(|| "1 Main St, Springfield".to_string())
        }

        fn reverse_geocode_for_reference(&self, location: Coordinates) -> Option<String> {
            (location.latitude >= 0.0).then(|| "Springfield".to_string())
        }

        fn geocode(&self, address: &str, reference: &str) -> Option<Place> {
            (address == "Library").then(|| {
                Place::new(Coordinates::new(10.0, 20.0), format!("{address}, {reference}"))
            })
        }
    }

    struct FixedPosition(Coordinates);

    #[async_trait]
    impl PositionSource for FixedPosition {
        async fn current_position(&self) -> Result<Coordinates, GeoError> {
            Ok(self.0)
        }
    }

    /// Blocks every lookup until released.
    struct GatedPosition {
        started: mpsc::UnboundedSender<()>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl PositionSource for GatedPosition {
        async fn current_position(&self) -> Result<Coordinates, GeoError> {
            let _ = self.started.send(());
            self.release.notified().await;
            Ok(Coordinates::new(1.0, 1.0))
        }
    }

    fn finder_with(
        positions: Arc<dyn PositionSource>,
        granted: bool,
    ) -> (
        LocationFinder,
        UnboundedReceiver<Result<Place, GeoError>>,
    ) {
        let finder = LocationFinder::new(
            Arc::new(FakeGeocoder),
            positions,
            Arc::new(StaticPermission(granted)),
            Arc::new(tokio::runtime::Handle::current()),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let ok_tx = tx.clone();
        finder.set_on_success(move |place| {
            let _ = ok_tx.send(Ok(place));
        });
        finder.set_on_failure(move |error| {
            let _ = tx.send(Err(error));
        });
        (finder, rx)
    }

    async fn next(rx: &mut UnboundedReceiver<Result<Place, GeoError>>) -> Result<Place, GeoError> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for callback")
            .expect("callback channel closed")
    }

    #[tokio::test]
    async fn test_current_place() {
        let (finder, mut rx) =
            finder_with(Arc::new(FixedPosition(Coordinates::new(5.0, 6.0))), true);

        finder.find(None);

        let place = next(&mut rx).await.unwrap();
        assert_eq!(place.coordinates, Coordinates::new(5.0, 6.0));
        assert_eq!(place.address, "1 Main St, Springfield");
    }

    #[tokio::test]
    async fn test_address_lookup_uses_reference() {
        let (finder, mut rx) =
            finder_with(Arc::new(FixedPosition(Coordinates::new(5.0, 6.0))), true);

        finder.find(Some("Library".to_string()));

        let place = next(&mut rx).await.unwrap();
        assert_eq!(place.coordinates, Coordinates::new(10.0, 20.0));
        assert_eq!(place.address, "Library, Springfield");
    }

    #[tokio::test]
    async fn test_unknown_address_fails() {
        let (finder, mut rx) =
            finder_with(Arc::new(FixedPosition(Coordinates::new(5.0, 6.0))), true);

        finder.find(Some("Nowhere".to_string()));

        assert!(matches!(next(&mut rx).await, Err(GeoError::Lookup(_))));
    }

    #[tokio::test]
    async fn test_missing_reverse_geocode_fails() {
        let (finder, mut rx) =
            finder_with(Arc::new(FixedPosition(Coordinates::new(-5.0, 6.0))), true);

        finder.find(None);
        finder.find(Some("Library".to_string()));

        assert!(matches!(next(&mut rx).await, Err(GeoError::Lookup(_))));
        assert!(matches!(next(&mut rx).await, Err(GeoError::Lookup(_))));
    }

    #[tokio::test]
    async fn test_permission_denied_short_circuits() {
        let (finder, mut rx) =
            finder_with(Arc::new(FixedPosition(Coordinates::new(5.0, 6.0))), false);

        finder.find(None);

        assert!(matches!(
            next(&mut rx).await,
            Err(GeoError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_replacing_callback() {
        let (finder, mut first) =
            finder_with(Arc::new(FixedPosition(Coordinates::new(5.0, 6.0))), true);

        let (tx, mut second) = mpsc::unbounded_channel();
        finder.set_on_success(move |place| {
            let _ = tx.send(place);
        });

        finder.find(None);

        let place = tokio::time::timeout(Duration::from_secs(5), second.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(place.address, "1 Main St, Springfield");
        assert!(first.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_callbacks_drops_silently() {
        let finder = LocationFinder::new(
            Arc::new(FakeGeocoder),
            Arc::new(FixedPosition(Coordinates::new(-1.0, 0.0))),
            Arc::new(StaticPermission(true)),
            Arc::new(tokio::runtime::Handle::current()),
        );

        finder.find(None);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_full_queue_reports_failure() {
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let release = Arc::new(Notify::new());
        let positions = Arc::new(GatedPosition {
            started: started_tx,
            release: Arc::clone(&release),
        });
        let (finder, mut rx) = finder_with(positions, true);

        // First lookup occupies the worker.
        finder.find(None);
        started_rx.recv().await.unwrap();

        for _ in 0..LOOKUP_QUEUE_SIZE {
            finder.find(None);
        }
        finder.find(None);

        assert_eq!(next(&mut rx).await, Err(GeoError::QueueFull));

        release.notify_one();
    }
}
