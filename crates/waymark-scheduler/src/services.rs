//! Interfaces to the external services reminders are scheduled against.
//!
//! The host supplies the implementations: a wake-up alarm service that can
//! fire while the process is dormant, a region-monitoring service that
//! reports entry into circular areas, and a wall clock.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use waymark_geo::CircularRegion;

use crate::{DayOfWeek, ListenerRef, ServiceError, TimeOfDay};

/// Radius of every monitored region, in metres.
pub const REMINDER_RADIUS_M: f64 = 1000.0;

/// How long a time+location trigger window stays open.
pub const TRIGGER_WINDOW: Duration = Duration::from_secs(30);

/// What an alarm carries back to the dispatcher when it fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlarmPayload {
    /// A weekly time reminder. Self-contained; no store lookup is needed.
    TimeReminder {
        id: String,
        day: DayOfWeek,
        time: TimeOfDay,
        listener: ListenerRef,
    },
    /// Opens the trigger window for a time+location reminder.
    TimeLocationDispatch { id: String },
}

impl AlarmPayload {
    pub fn reminder_id(&self) -> &str {
        match self {
            AlarmPayload::TimeReminder { id, .. } | AlarmPayload::TimeLocationDispatch { id } => id,
        }
    }

    /// Trigger id the alarm is armed under.
    pub fn trigger_id(&self) -> String {
        match self {
            AlarmPayload::TimeReminder { id, .. } => Self::time_trigger_id(id),
            AlarmPayload::TimeLocationDispatch { id } => Self::time_location_trigger_id(id),
        }
    }

    pub fn time_trigger_id(id: &str) -> String {
        format!("time/{id}")
    }

    pub fn time_location_trigger_id(id: &str) -> String {
        format!("time-location/{id}")
    }
}

/// A one-shot wake-up alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub trigger_id: String,
    pub at: NaiveDateTime,
    pub payload: AlarmPayload,
}

impl Alarm {
    pub fn new(at: NaiveDateTime, payload: AlarmPayload) -> Self {
        Self {
            trigger_id: payload.trigger_id(),
            at,
            payload,
        }
    }
}

/// Exact, wake-from-idle alarm service.
#[async_trait]
pub trait AlarmService: Send + Sync {
    /// Arm an alarm, replacing any alarm already armed under its trigger id.
    async fn arm(&self, alarm: Alarm) -> Result<(), ServiceError>;

    /// Cancel the alarm armed under `trigger_id`.
    ///
    /// Returns whether an alarm was armed.
    async fn cancel(&self, trigger_id: &str) -> Result<bool, ServiceError>;
}

/// Region transitions that can be monitored. Only entry is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Enter,
}

/// Which dispatch entry point receives entries into a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionTarget {
    /// A persistent region for a location reminder.
    LocationReminder,
    /// A short-lived window opened by a time+location alarm.
    TriggerWindow,
}

/// A circular area registered with the region-monitoring service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredRegion {
    pub id: String,
    pub region: CircularRegion,
    /// `None` means the region never expires.
    pub expires_after: Option<Duration>,
    pub transition: Transition,
    pub target: RegionTarget,
}

/// Region-monitoring service.
#[async_trait]
pub trait RegionMonitor: Send + Sync {
    /// Start monitoring a region, replacing any region with the same id.
    async fn add_region(&self, region: MonitoredRegion) -> Result<(), ServiceError>;

    /// Stop monitoring the given regions. Unknown ids are ignored.
    async fn remove_regions(&self, ids: &[String]) -> Result<(), ServiceError>;
}

/// Source of the local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Reads the system clock in the local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}
