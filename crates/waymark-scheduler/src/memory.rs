//! In-memory service implementations.
//!
//! Useful for hosts that deliver alarms and region entries from inside the
//! process, and for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};
use tokio::sync::Mutex;
use waymark_geo::Coordinates;

use crate::{Alarm, AlarmService, Clock, MonitoredRegion, RegionMonitor, ServiceError};

/// Alarms held in a map keyed by trigger id.
#[derive(Debug, Default)]
pub struct MemoryAlarms {
    alarms: Mutex<HashMap<String, Alarm>>,
    failing: AtomicBool,
}

impl MemoryAlarms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent request fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All armed alarms, earliest first.
    pub async fn armed(&self) -> Vec<Alarm> {
        let mut alarms: Vec<Alarm> = self.alarms.lock().await.values().cloned().collect();
        alarms.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.trigger_id.cmp(&b.trigger_id)));
        alarms
    }

    pub async fn get(&self, trigger_id: &str) -> Option<Alarm> {
        self.alarms.lock().await.get(trigger_id).cloned()
    }

    /// Remove and return every alarm due at or before `now`, earliest first.
    pub async fn take_due(&self, now: NaiveDateTime) -> Vec<Alarm> {
        let mut alarms = self.alarms.lock().await;
        let due_ids: Vec<String> = alarms
            .values()
            .filter(|a| a.at <= now)
            .map(|a| a.trigger_id.clone())
            .collect();

        let mut due: Vec<Alarm> = due_ids.iter().filter_map(|id| alarms.remove(id)).collect();
        due.sort_by(|a, b| a.at.cmp(&b.at));
        due
    }

    fn check(&self) -> Result<(), ServiceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServiceError::new("alarms", "service unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl AlarmService for MemoryAlarms {
    async fn arm(&self, alarm: Alarm) -> Result<(), ServiceError> {
        self.check()?;
        self.alarms
            .lock()
            .await
            .insert(alarm.trigger_id.clone(), alarm);
        Ok(())
    }

    async fn cancel(&self, trigger_id: &str) -> Result<bool, ServiceError> {
        self.check()?;
        Ok(self.alarms.lock().await.remove(trigger_id).is_some())
    }
}

/// Monitored regions held in a map keyed by region id.
#[derive(Debug, Default)]
pub struct MemoryRegions {
    regions: Mutex<HashMap<String, MonitoredRegion>>,
    failing: AtomicBool,
}

impl MemoryRegions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent request fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All monitored regions, ordered by id.
    pub async fn regions(&self) -> Vec<MonitoredRegion> {
        let mut regions: Vec<MonitoredRegion> =
            self.regions.lock().await.values().cloned().collect();
        regions.sort_by(|a, b| a.id.cmp(&b.id));
        regions
    }

    pub async fn get(&self, id: &str) -> Option<MonitoredRegion> {
        self.regions.lock().await.get(id).cloned()
    }

    /// Regions that contain `point`, ordered by id.
    pub async fn containing(&self, point: &Coordinates) -> Vec<MonitoredRegion> {
        let mut hits: Vec<MonitoredRegion> = self
            .regions
            .lock()
            .await
            .values()
            .filter(|r| r.region.contains(point))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        hits
    }

    fn check(&self) -> Result<(), ServiceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServiceError::new("regions", "service unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl RegionMonitor for MemoryRegions {
    async fn add_region(&self, region: MonitoredRegion) -> Result<(), ServiceError> {
        self.check()?;
        self.regions.lock().await.insert(region.id.clone(), region);
        Ok(())
    }

    async fn remove_regions(&self, ids: &[String]) -> Result<(), ServiceError> {
        self.check()?;
        let mut regions = self.regions.lock().await;
        for id in ids {
            regions.remove(id);
        }
        Ok(())
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.write().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.read().unwrap_or_else(PoisonError::into_inner)
    }
}
