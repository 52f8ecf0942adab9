//! Dispatch of fired alarms and region entries.
//!
//! The host's alarm and region services call into [`TriggerDispatcher`] when
//! something fires. Each entry point resolves the trigger back to its
//! reminder, invokes the listener where the reminder's rules allow it, and
//! re-arms the next weekly occurrence.

use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};
use waymark_geo::{CircularRegion, Distance};

use crate::listener::ReminderTrigger;
use crate::schedule::{day_of_week, next_occurrence};
use crate::{
    Alarm, AlarmPayload, AlarmService, Clock, DayOfWeek, ListenerRef, ListenerRegistry,
    MonitoredRegion, REMINDER_RADIUS_M, RegionMonitor, RegionTarget, ReminderKind, ReminderStore,
    SchedulerError, SystemClock, TRIGGER_WINDOW, TimeOfDay, Transition,
};

/// What a dispatch did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Reminders whose listener was invoked.
    pub invoked: Vec<String>,
    /// Reminders that were resolved but not invoked.
    pub skipped: Vec<String>,
    /// Reminders a trigger window was opened for.
    pub windows_opened: Vec<String>,
    /// When the next alarm was armed, if one was.
    pub next_alarm: Option<NaiveDateTime>,
}

impl DispatchReport {
    /// Fold another report into this one. The later `next_alarm` wins.
    pub fn merge(&mut self, other: DispatchReport) {
        self.invoked.extend(other.invoked);
        self.skipped.extend(other.skipped);
        self.windows_opened.extend(other.windows_opened);
        if other.next_alarm.is_some() {
            self.next_alarm = other.next_alarm;
        }
    }
}

/// Handles alarms and region entries delivered by the host.
pub struct TriggerDispatcher {
    store: Arc<ReminderStore>,
    alarms: Arc<dyn AlarmService>,
    regions: Arc<dyn RegionMonitor>,
    listeners: ListenerRegistry,
    clock: Arc<dyn Clock>,
}

impl TriggerDispatcher {
    pub fn new(
        store: Arc<ReminderStore>,
        alarms: Arc<dyn AlarmService>,
        regions: Arc<dyn RegionMonitor>,
        listeners: ListenerRegistry,
    ) -> Self {
        Self {
            store,
            alarms,
            regions,
            listeners,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a different clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Route a fired alarm to its handler.
    pub async fn on_alarm(&self, payload: AlarmPayload) -> Result<DispatchReport, SchedulerError> {
        match payload {
            AlarmPayload::TimeReminder {
                id,
                day,
                time,
                listener,
            } => self.handle_time_reminder(&id, day, time, listener).await,
            AlarmPayload::TimeLocationDispatch { id } => {
                self.handle_time_location_alarm(&id).await
            }
        }
    }

    /// A time reminder's alarm fired: invoke the listener, then arm next week.
    #[tracing::instrument(skip(self, listener), fields(listener = %listener.key))]
    pub async fn handle_time_reminder(
        &self,
        id: &str,
        day: DayOfWeek,
        time: TimeOfDay,
        listener: ListenerRef,
    ) -> Result<DispatchReport, SchedulerError> {
        let mut report = DispatchReport::default();

        let trigger = ReminderTrigger::Time { day, time };
        if self.listeners.invoke(id, &listener, trigger).await {
            report.invoked.push(id.to_string());
        } else {
            warn!(id, key = %listener.key, "no listener registered, skipping");
            report.skipped.push(id.to_string());
        }

        let at = next_occurrence(day, time, self.clock.now());
        let payload = AlarmPayload::TimeReminder {
            id: id.to_string(),
            day,
            time,
            listener,
        };
        self.alarms.arm(Alarm::new(at, payload)).await?;
        report.next_alarm = Some(at);

        info!(id, next = %at, "time reminder fired");
        Ok(report)
    }

    /// A time+location reminder's alarm fired: open the trigger window and
    /// arm next week's alarm, whether or not the window is ever entered.
    #[tracing::instrument(skip(self))]
    pub async fn handle_time_location_alarm(
        &self,
        id: &str,
    ) -> Result<DispatchReport, SchedulerError> {
        let mut report = DispatchReport::default();

        let Some(record) = self.store.get(id).await? else {
            warn!(id, "alarm for unknown reminder, ignoring");
            return Ok(report);
        };
        let kind = record.kind.label();
        let ReminderKind::TimeLocation { day, time, place } = record.kind else {
            warn!(id, kind, "alarm for reminder of another kind, ignoring");
            return Ok(report);
        };

        self.regions
            .add_region(MonitoredRegion {
                id: id.to_string(),
                region: CircularRegion::new(place.coordinates, Distance::from_m(REMINDER_RADIUS_M)),
                expires_after: Some(TRIGGER_WINDOW),
                transition: Transition::Enter,
                target: RegionTarget::TriggerWindow,
            })
            .await?;
        report.windows_opened.push(id.to_string());

        let at = next_occurrence(day, time, self.clock.now());
        let payload = AlarmPayload::TimeLocationDispatch { id: id.to_string() };
        self.alarms.arm(Alarm::new(at, payload)).await?;
        report.next_alarm = Some(at);

        info!(id, window_secs = TRIGGER_WINDOW.as_secs(), next = %at, "opened trigger window");
        Ok(report)
    }

    /// Persistent location regions were entered.
    ///
    /// Listeners fire only for location reminders whose day is today.
    #[tracing::instrument(skip(self))]
    pub async fn on_location_entered(
        &self,
        ids: &[String],
    ) -> Result<DispatchReport, SchedulerError> {
        let mut report = DispatchReport::default();
        let today = day_of_week(self.clock.now());

        for id in ids {
            let Some(record) = self.store.get(id).await? else {
                debug!(id = %id, "entry for unknown reminder");
                continue;
            };
            let kind = record.kind.label();
            let ReminderKind::Location { day, place } = record.kind else {
                debug!(id = %id, kind, "entry for reminder of another kind");
                report.skipped.push(id.clone());
                continue;
            };
            if day != today {
                debug!(id = %id, %day, %today, "entered on another day");
                report.skipped.push(id.clone());
                continue;
            }

            let trigger = ReminderTrigger::Location { day, place };
            if self.listeners.invoke(id, &record.listener, trigger).await {
                info!(id = %id, "location reminder fired");
                report.invoked.push(id.clone());
            } else {
                warn!(id = %id, key = %record.listener.key, "no listener registered, skipping");
                report.skipped.push(id.clone());
            }
        }

        Ok(report)
    }

    /// Trigger windows were entered.
    ///
    /// The alarm that opened the window already matched the day, so listeners
    /// fire unconditionally. Each window closes once entered.
    #[tracing::instrument(skip(self))]
    pub async fn on_trigger_window_entered(
        &self,
        ids: &[String],
    ) -> Result<DispatchReport, SchedulerError> {
        let mut report = DispatchReport::default();

        for id in ids {
            let Some(record) = self.store.get(id).await? else {
                debug!(id = %id, "window entry for unknown reminder");
                continue;
            };
            let kind = record.kind.label();
            let ReminderKind::TimeLocation { day, time, place } = record.kind else {
                debug!(id = %id, kind, "window entry for reminder of another kind");
                report.skipped.push(id.clone());
                continue;
            };

            self.regions.remove_regions(std::slice::from_ref(id)).await?;

            let trigger = ReminderTrigger::TimeLocation { day, time, place };
            if self.listeners.invoke(id, &record.listener, trigger).await {
                info!(id = %id, "time-location reminder fired");
                report.invoked.push(id.clone());
            } else {
                warn!(id = %id, key = %record.listener.key, "no listener registered, skipping");
                report.skipped.push(id.clone());
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ManualClock, MemoryAlarms, MemoryRegions};
    use crate::{ReminderEvent, ReminderListener, ReminderRecord};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use tempfile::TempDir;
    use test_case::test_case;
    use tokio::sync::Mutex;
    use waymark_geo::{Coordinates, Place};

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<ReminderEvent>>,
    }

    #[async_trait]
    impl ReminderListener for Recorder {
        async fn on_reminder(&self, event: &ReminderEvent) {
            self.events.lock().await.push(event.clone());
        }
    }

    struct Harness {
        _dir: TempDir,
        store: Arc<ReminderStore>,
        alarms: Arc<MemoryAlarms>,
        regions: Arc<MemoryRegions>,
        clock: Arc<ManualClock>,
        recorder: Arc<Recorder>,
        dispatcher: TriggerDispatcher,
    }

    // June 2024: the 9th is a Sunday.
    fn june(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn harness(now: NaiveDateTime) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ReminderStore::open(dir.path().join("reminders.json")));
        let alarms = Arc::new(MemoryAlarms::new());
        let regions = Arc::new(MemoryRegions::new());
        let clock = Arc::new(ManualClock::new(now));
        let recorder = Arc::new(Recorder::default());
        let listeners = ListenerRegistry::new().with("rec", recorder.clone());
        let dispatcher =
            TriggerDispatcher::new(Arc::clone(&store), alarms.clone(), regions.clone(), listeners)
                .with_clock(clock.clone());

        Harness {
            _dir: dir,
            store,
            alarms,
            regions,
            clock,
            recorder,
            dispatcher,
        }
    }

    fn gym() -> Place {
        Place::new(Coordinates::new(10.0, 20.0), "Gym")
    }

    async fn put(h: &Harness, id: &str, kind: ReminderKind, key: &str) {
        h.store
            .put(id, ReminderRecord::new(id, kind, ListenerRef::new(key)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_time_reminder_invokes_once_and_rearms() {
        // Wednesday 09:00, the reminder's own slot.
        let h = harness(june(12, 9));
        let nine = TimeOfDay::new(9, 0, 0).unwrap();

        let report = h
            .dispatcher
            .on_alarm(AlarmPayload::TimeReminder {
                id: "W".to_string(),
                day: DayOfWeek::Wednesday,
                time: nine,
                listener: ListenerRef::new("rec"),
            })
            .await
            .unwrap();

        assert_eq!(report.invoked, vec!["W"]);
        assert_eq!(report.next_alarm, Some(june(19, 9)));
        assert_eq!(h.recorder.events.lock().await.len(), 1);

        let armed = h.alarms.armed().await;
        assert_eq!(armed.len(), 1);
        assert_eq!(armed[0].at, june(19, 9));
        assert_eq!(armed[0].trigger_id, "time/W");
    }

    #[tokio::test]
    async fn test_time_reminder_unknown_listener_still_rearms() {
        let h = harness(june(12, 9));

        let report = h
            .dispatcher
            .handle_time_reminder(
                "W",
                DayOfWeek::Wednesday,
                TimeOfDay::new(9, 0, 0).unwrap(),
                ListenerRef::new("gone"),
            )
            .await
            .unwrap();

        assert!(report.invoked.is_empty());
        assert_eq!(report.skipped, vec!["W"]);
        assert_eq!(h.alarms.armed().await.len(), 1);
    }

    #[tokio::test]
    async fn test_time_location_alarm_opens_window_and_rearms() {
        let h = harness(june(14, 8));
        put(
            &h,
            "R1",
            ReminderKind::TimeLocation {
                day: DayOfWeek::Friday,
                time: TimeOfDay::new(8, 0, 0).unwrap(),
                place: gym(),
            },
            "rec",
        )
        .await;

        let report = h
            .dispatcher
            .on_alarm(AlarmPayload::TimeLocationDispatch {
                id: "R1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(report.windows_opened, vec!["R1"]);
        assert_eq!(report.next_alarm, Some(june(21, 8)));
        assert!(report.invoked.is_empty());

        let window = h.regions.get("R1").await.unwrap();
        assert_eq!(window.target, RegionTarget::TriggerWindow);
        assert_eq!(window.expires_after, Some(TRIGGER_WINDOW));
        assert_eq!(window.region.center, Coordinates::new(10.0, 20.0));
        assert!(h.recorder.events.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_time_location_alarm_for_missing_record_is_noop() {
        let h = harness(june(14, 8));

        let report = h.dispatcher.handle_time_location_alarm("ghost").await.unwrap();

        assert_eq!(report, DispatchReport::default());
        assert!(h.regions.regions().await.is_empty());
        assert!(h.alarms.armed().await.is_empty());
    }

    #[tokio::test]
    async fn test_trigger_window_entry_fires_and_closes() {
        let h = harness(june(14, 8));
        put(
            &h,
            "R1",
            ReminderKind::TimeLocation {
                day: DayOfWeek::Friday,
                time: TimeOfDay::new(8, 0, 0).unwrap(),
                place: gym(),
            },
            "rec",
        )
        .await;
        h.dispatcher.handle_time_location_alarm("R1").await.unwrap();

        let ids = vec!["R1".to_string()];
        let first = h.dispatcher.on_trigger_window_entered(&ids).await.unwrap();

        assert_eq!(first.invoked, vec!["R1"]);
        assert!(h.regions.get("R1").await.is_none());

        let events = h.recorder.events.lock().await;
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].trigger,
            ReminderTrigger::TimeLocation {
                day: DayOfWeek::Friday,
                time: TimeOfDay::new(8, 0, 0).unwrap(),
                place: gym(),
            }
        );
    }

    #[test_case(9 ; "sunday")]
    #[test_case(10 ; "monday")]
    #[test_case(12 ; "wednesday")]
    #[test_case(13 ; "thursday")]
    #[test_case(14 ; "friday")]
    #[test_case(15 ; "saturday")]
    #[tokio::test]
    async fn test_location_entry_on_other_day_is_ignored(day_of_june: u32) {
        let h = harness(june(day_of_june, 18));
        put(
            &h,
            "T",
            ReminderKind::Location {
                day: DayOfWeek::Tuesday,
                place: gym(),
            },
            "rec",
        )
        .await;

        let report = h
            .dispatcher
            .on_location_entered(&["T".to_string()])
            .await
            .unwrap();

        assert!(report.invoked.is_empty());
        assert_eq!(report.skipped, vec!["T"]);
        assert!(h.recorder.events.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_location_entry_on_matching_day_fires() {
        // Tuesday.
        let h = harness(june(11, 18));
        put(
            &h,
            "T",
            ReminderKind::Location {
                day: DayOfWeek::Tuesday,
                place: gym(),
            },
            "rec",
        )
        .await;

        let ids = vec!["T".to_string(), "unknown".to_string()];
        let report = h.dispatcher.on_location_entered(&ids).await.unwrap();
        assert_eq!(report.invoked, vec!["T"]);
        assert!(report.skipped.is_empty());

        // Still live for next week.
        h.clock.advance(chrono::Duration::days(7));
        let report = h.dispatcher.on_location_entered(&ids).await.unwrap();
        assert_eq!(report.invoked, vec!["T"]);
        assert_eq!(h.recorder.events.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_location_entry_ignores_time_location_records() {
        let h = harness(june(14, 8));
        put(
            &h,
            "R1",
            ReminderKind::TimeLocation {
                day: DayOfWeek::Friday,
                time: TimeOfDay::new(8, 0, 0).unwrap(),
                place: gym(),
            },
            "rec",
        )
        .await;

        let report = h
            .dispatcher
            .on_location_entered(&["R1".to_string()])
            .await
            .unwrap();

        assert!(report.invoked.is_empty());
        assert!(h.recorder.events.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let h = harness(june(14, 8));
        std::fs::write(h.store.path(), "not json").unwrap();

        let err = h
            .dispatcher
            .on_location_entered(&["R1".to_string()])
            .await
            .unwrap_err();
        assert!(err.is_storage_failure());
    }

    #[test]
    fn test_report_merge() {
        let mut report = DispatchReport {
            invoked: vec!["a".to_string()],
            next_alarm: Some(june(10, 8)),
            ..Default::default()
        };
        report.merge(DispatchReport {
            skipped: vec!["b".to_string()],
            ..Default::default()
        });

        assert_eq!(report.invoked, vec!["a"]);
        assert_eq!(report.skipped, vec!["b"]);
        assert_eq!(report.next_alarm, Some(june(10, 8)));
    }
}
