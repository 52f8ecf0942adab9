//! File-backed alarm and region services.
//!
//! The CLI has no operating system scheduler behind it, so armed alarms and
//! monitored regions are journaled to JSON files in the data directory. A
//! later `tick` or `visit` reads them back and delivers whatever is due.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeDelta};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use waymark_geo::Coordinates;
use waymark_scheduler::{Alarm, AlarmService, Clock, MonitoredRegion, RegionMonitor, ServiceError};

use crate::error::HostError;

/// A JSON document rewritten whole on every change.
#[derive(Debug)]
struct JsonFile<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
            _doc: PhantomData,
        }
    }

    async fn load(&self) -> Result<T, HostError> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    /// Apply `f` to the document and write it back.
    async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, HostError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read().await?;
        let out = f(&mut doc);
        self.write(&doc).await?;
        Ok(out)
    }

    async fn read(&self) -> Result<T, HostError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(T::default()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, doc: &T) -> Result<(), HostError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self.path.with_extension("tmp");
        let mut out = fs::File::create(&temp_path).await?;
        out.write_all(serde_json::to_string_pretty(doc)?.as_bytes())
            .await?;
        out.sync_all().await?;

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AlarmDoc {
    alarms: HashMap<String, Alarm>,
}

/// Alarms journaled to a JSON file, keyed by trigger id.
#[derive(Debug)]
pub struct AlarmJournal {
    file: JsonFile<AlarmDoc>,
}

impl AlarmJournal {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path.into()),
        }
    }

    /// All armed alarms, earliest first.
    pub async fn armed(&self) -> Result<Vec<Alarm>, HostError> {
        let mut alarms: Vec<Alarm> = self.file.load().await?.alarms.into_values().collect();
        alarms.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.trigger_id.cmp(&b.trigger_id)));
        Ok(alarms)
    }

    /// Remove and return the earliest alarm due at or before `now`.
    pub async fn take_next_due(&self, now: NaiveDateTime) -> Result<Option<Alarm>, HostError> {
        self.file
            .update(|doc| {
                let id = doc
                    .alarms
                    .values()
                    .filter(|a| a.at <= now)
                    .min_by(|a, b| a.at.cmp(&b.at).then_with(|| a.trigger_id.cmp(&b.trigger_id)))
                    .map(|a| a.trigger_id.clone())?;
                doc.alarms.remove(&id)
            })
            .await
    }
}

#[async_trait]
impl AlarmService for AlarmJournal {
    async fn arm(&self, alarm: Alarm) -> Result<(), ServiceError> {
        let trigger_id = alarm.trigger_id.clone();
        let at = alarm.at;
        self.file
            .update(|doc| doc.alarms.insert(alarm.trigger_id.clone(), alarm))
            .await
            .map_err(|e| e.into_service_error("alarms"))?;
        debug!(%trigger_id, %at, "armed alarm");
        Ok(())
    }

    async fn cancel(&self, trigger_id: &str) -> Result<bool, ServiceError> {
        self.file
            .update(|doc| doc.alarms.remove(trigger_id).is_some())
            .await
            .map_err(|e| e.into_service_error("alarms"))
    }
}

/// A monitored region and when it started being monitored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournaledRegion {
    #[serde(flatten)]
    pub region: MonitoredRegion,
    pub added_at: NaiveDateTime,
}

impl JournaledRegion {
    /// Whether the region's expiration has passed at `now`.
    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        match self.region.expires_after {
            None => false,
            Some(ttl) => TimeDelta::from_std(ttl)
                .map(|ttl| self.added_at + ttl <= now)
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegionDoc {
    regions: HashMap<String, JournaledRegion>,
}

/// Monitored regions journaled to a JSON file, keyed by region id.
pub struct RegionJournal {
    file: JsonFile<RegionDoc>,
    clock: Arc<dyn Clock>,
}

impl RegionJournal {
    pub fn open(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            file: JsonFile::new(path.into()),
            clock,
        }
    }

    /// All monitored regions, ordered by id.
    pub async fn regions(&self) -> Result<Vec<JournaledRegion>, HostError> {
        let mut regions: Vec<JournaledRegion> =
            self.file.load().await?.regions.into_values().collect();
        regions.sort_by(|a, b| a.region.id.cmp(&b.region.id));
        Ok(regions)
    }

    /// Drop regions whose expiration has passed. Returns the dropped ids.
    pub async fn expire(&self, now: NaiveDateTime) -> Result<Vec<String>, HostError> {
        let mut expired = self
            .file
            .update(|doc| {
                let ids: Vec<String> = doc
                    .regions
                    .values()
                    .filter(|r| r.is_expired(now))
                    .map(|r| r.region.id.clone())
                    .collect();
                for id in &ids {
                    doc.regions.remove(id);
                }
                ids
            })
            .await?;
        expired.sort();
        Ok(expired)
    }

    /// Live regions containing `point`, ordered by id.
    pub async fn containing(
        &self,
        point: &Coordinates,
        now: NaiveDateTime,
    ) -> Result<Vec<MonitoredRegion>, HostError> {
        Ok(self
            .regions()
            .await?
            .into_iter()
            .filter(|r| !r.is_expired(now) && r.region.region.contains(point))
            .map(|r| r.region)
            .collect())
    }
}

#[async_trait]
impl RegionMonitor for RegionJournal {
    async fn add_region(&self, region: MonitoredRegion) -> Result<(), ServiceError> {
        let entry = JournaledRegion {
            region,
            added_at: self.clock.now(),
        };
        self.file
            .update(|doc| doc.regions.insert(entry.region.id.clone(), entry))
            .await
            .map_err(|e| e.into_service_error("regions"))?;
        Ok(())
    }

    async fn remove_regions(&self, ids: &[String]) -> Result<(), ServiceError> {
        self.file
            .update(|doc| {
                for id in ids {
                    doc.regions.remove(id);
                }
            })
            .await
            .map_err(|e| e.into_service_error("regions"))
    }
}
