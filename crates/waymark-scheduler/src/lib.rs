//! Durable weekly reminders for Waymark.
//!
//! This crate provides:
//! - A persistent record store so reminders survive restarts
//! - Weekly next-occurrence resolution for (day, time) schedules
//! - Registration of time, location and time+location reminders against
//!   external alarm and region-monitoring services
//! - Dispatch handlers that resolve fired triggers back to reminders,
//!   invoke listeners and re-arm the next occurrence

mod dispatch;
mod error;
mod listener;
mod manager;
pub mod memory;
mod schedule;
mod services;
mod store;
mod types;

pub use dispatch::{DispatchReport, TriggerDispatcher};
pub use error::{SchedulerError, ServiceError};
pub use listener::{ListenerRegistry, ReminderEvent, ReminderListener, ReminderTrigger};
pub use manager::ReminderManager;
pub use schedule::{day_of_week, next_occurrence};
pub use services::{
    Alarm, AlarmPayload, AlarmService, Clock, MonitoredRegion, REMINDER_RADIUS_M, RegionMonitor,
    RegionTarget, SystemClock, TRIGGER_WINDOW, Transition,
};
pub use store::ReminderStore;
pub use types::{DayOfWeek, ListenerRef, ReminderKind, ReminderRecord, TimeOfDay};
