//! Reminder registration.

use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};
use waymark_geo::{CircularRegion, Distance, LocationPermission, Place};

use crate::schedule::next_occurrence;
use crate::{
    Alarm, AlarmPayload, AlarmService, Clock, DayOfWeek, ListenerRef, MonitoredRegion,
    REMINDER_RADIUS_M, RegionMonitor, RegionTarget, ReminderKind, ReminderRecord, ReminderStore,
    SchedulerError, SystemClock, TimeOfDay, Transition,
};

/// Registers and unregisters reminders.
///
/// Every registration is written to the store before the external service is
/// asked to arm it. Failures are returned as-is; steps already completed in
/// the same call are not rolled back.
pub struct ReminderManager {
    store: Arc<ReminderStore>,
    alarms: Arc<dyn AlarmService>,
    regions: Arc<dyn RegionMonitor>,
    permission: Arc<dyn LocationPermission>,
    clock: Arc<dyn Clock>,
}

impl ReminderManager {
    /// Create a manager that reads the system clock.
    pub fn new(
        store: Arc<ReminderStore>,
        alarms: Arc<dyn AlarmService>,
        regions: Arc<dyn RegionMonitor>,
        permission: Arc<dyn LocationPermission>,
    ) -> Self {
        Self {
            store,
            alarms,
            regions,
            permission,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a different clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a weekly time reminder.
    ///
    /// Returns when the first alarm will fire.
    #[tracing::instrument(skip(self, listener), fields(listener = %listener.key))]
    pub async fn register_time_reminder(
        &self,
        id: &str,
        day: DayOfWeek,
        time: TimeOfDay,
        listener: ListenerRef,
    ) -> Result<NaiveDateTime, SchedulerError> {
        validate_id(id)?;
        self.retract(id).await?;

        let at = next_occurrence(day, time, self.clock.now());
        let record = ReminderRecord::new(id, ReminderKind::Time { day, time }, listener.clone());
        self.store.put(id, record).await?;

        let payload = AlarmPayload::TimeReminder {
            id: id.to_string(),
            day,
            time,
            listener,
        };
        self.alarms.arm(Alarm::new(at, payload)).await?;

        info!(id, %day, %time, next = %at, "registered time reminder");
        Ok(at)
    }

    /// Register a reminder that fires on entering `place`, on `day` only.
    #[tracing::instrument(skip(self, place, listener), fields(listener = %listener.key))]
    pub async fn register_location_reminder(
        &self,
        id: &str,
        day: DayOfWeek,
        place: Place,
        listener: ListenerRef,
    ) -> Result<(), SchedulerError> {
        if !self.permission.is_granted() {
            return Err(SchedulerError::PermissionDenied(
                "location reminders need location access".to_string(),
            ));
        }
        validate_id(id)?;
        self.retract(id).await?;

        let region = MonitoredRegion {
            id: id.to_string(),
            region: reminder_region(&place),
            expires_after: None,
            transition: Transition::Enter,
            target: RegionTarget::LocationReminder,
        };
        let record = ReminderRecord::new(id, ReminderKind::Location { day, place }, listener);
        self.store.put(id, record).await?;
        self.regions.add_region(region).await?;

        info!(id, %day, "registered location reminder");
        Ok(())
    }

    /// Register a reminder that fires on entering `place` shortly after `time`
    /// on `day`.
    ///
    /// Only the weekly alarm is armed here. The region is monitored for a
    /// short window each time the alarm fires.
    #[tracing::instrument(skip(self, place, listener), fields(listener = %listener.key))]
    pub async fn register_time_location_reminder(
        &self,
        id: &str,
        day: DayOfWeek,
        time: TimeOfDay,
        place: Place,
        listener: ListenerRef,
    ) -> Result<NaiveDateTime, SchedulerError> {
        validate_id(id)?;
        self.retract(id).await?;

        let at = next_occurrence(day, time, self.clock.now());
        let record = ReminderRecord::new(
            id,
            ReminderKind::TimeLocation { day, time, place },
            listener,
        );
        self.store.put(id, record).await?;

        let payload = AlarmPayload::TimeLocationDispatch { id: id.to_string() };
        self.alarms.arm(Alarm::new(at, payload)).await?;

        info!(id, %day, %time, next = %at, "registered time-location reminder");
        Ok(at)
    }

    /// Cancel a time reminder's alarm and drop its record.
    ///
    /// No-op for unknown ids. An id held by another kind of reminder is left
    /// untouched.
    #[tracing::instrument(skip(self))]
    pub async fn unregister_time_reminder(&self, id: &str) -> Result<(), SchedulerError> {
        if !self.may_tear_down(id, is_time).await? {
            return Ok(());
        }

        let cancelled = self
            .alarms
            .cancel(&AlarmPayload::time_trigger_id(id))
            .await?;
        let purged = self.store.remove_if(id, |r| is_time(&r.kind)).await?;

        info!(id, cancelled, purged, "unregistered time reminder");
        Ok(())
    }

    /// Stop monitoring a location reminder's region and drop its record.
    #[tracing::instrument(skip(self))]
    pub async fn unregister_location_reminder(&self, id: &str) -> Result<(), SchedulerError> {
        if !self.may_tear_down(id, is_location).await? {
            return Ok(());
        }

        self.regions.remove_regions(&[id.to_string()]).await?;
        let purged = self.store.remove_if(id, |r| is_location(&r.kind)).await?;

        info!(id, purged, "unregistered location reminder");
        Ok(())
    }

    /// Cancel a time+location reminder's alarm, close any open trigger window
    /// and drop its record.
    #[tracing::instrument(skip(self))]
    pub async fn unregister_time_location_reminder(&self, id: &str) -> Result<(), SchedulerError> {
        if !self.may_tear_down(id, is_time_location).await? {
            return Ok(());
        }

        let cancelled = self
            .alarms
            .cancel(&AlarmPayload::time_location_trigger_id(id))
            .await?;
        self.regions.remove_regions(&[id.to_string()]).await?;
        let purged = self
            .store
            .remove_if(id, |r| is_time_location(&r.kind))
            .await?;

        info!(id, cancelled, purged, "unregistered time-location reminder");
        Ok(())
    }

    /// Get a reminder by id.
    pub async fn get(&self, id: &str) -> Result<Option<ReminderRecord>, SchedulerError> {
        self.store.get(id).await
    }

    /// List all reminders, ordered by id.
    pub async fn list(&self) -> Result<Vec<ReminderRecord>, SchedulerError> {
        let mut records: Vec<ReminderRecord> = self.store.load_all().await?.into_values().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    /// Tear down whatever is live under `id` so it can be registered afresh.
    async fn retract(&self, id: &str) -> Result<(), SchedulerError> {
        let Some(existing) = self.store.get(id).await? else {
            return Ok(());
        };

        debug!(id, kind = existing.kind.label(), "replacing existing reminder");
        match existing.kind {
            ReminderKind::Time { .. } => {
                self.alarms
                    .cancel(&AlarmPayload::time_trigger_id(id))
                    .await?;
            }
            ReminderKind::Location { .. } => {
                self.regions.remove_regions(&[id.to_string()]).await?;
            }
            ReminderKind::TimeLocation { .. } => {
                self.alarms
                    .cancel(&AlarmPayload::time_location_trigger_id(id))
                    .await?;
                self.regions.remove_regions(&[id.to_string()]).await?;
            }
        }
        Ok(())
    }

    /// Whether an unregister of the kind accepted by `matches_kind` may tear
    /// down `id`: either no record exists, or the stored record is that kind.
    async fn may_tear_down(
        &self,
        id: &str,
        matches_kind: fn(&ReminderKind) -> bool,
    ) -> Result<bool, SchedulerError> {
        match self.store.get(id).await? {
            Some(record) if !matches_kind(&record.kind) => {
                warn!(id, kind = record.kind.label(), "id belongs to another kind, leaving it");
                Ok(false)
            }
            _ => Ok(true),
        }
    }
}

fn is_time(kind: &ReminderKind) -> bool {
    matches!(kind, ReminderKind::Time { .. })
}

fn is_location(kind: &ReminderKind) -> bool {
    matches!(kind, ReminderKind::Location { .. })
}

fn is_time_location(kind: &ReminderKind) -> bool {
    matches!(kind, ReminderKind::TimeLocation { .. })
}

fn validate_id(id: &str) -> Result<(), SchedulerError> {
    if id.trim().is_empty() {
        return Err(SchedulerError::InvalidId(id.to_string()));
    }
    Ok(())
}

fn reminder_region(place: &Place) -> CircularRegion {
    CircularRegion::new(place.coordinates, Distance::from_m(REMINDER_RADIUS_M))
}
