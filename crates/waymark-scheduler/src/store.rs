//! Durable reminder record store.
//!
//! The whole id -> record mapping lives in a single JSON file. Every
//! operation reads the entire file, and every mutation writes the entire
//! mapping back. A zero-length or missing file is an empty mapping.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::{ReminderRecord, SchedulerError};

/// Current on-disk format version.
const STORE_VERSION: u32 = 1;

/// Store file format.
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    reminders: HashMap<String, ReminderRecord>,
}

impl Default for StoreFile {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            reminders: HashMap::new(),
        }
    }
}

/// File-backed store of reminder records keyed by reminder id.
///
/// Each read/modify/write cycle runs under one lock, so tasks sharing a store
/// cannot interleave mutations. Separate processes writing the same file are
/// not coordinated.
#[derive(Debug)]
pub struct ReminderStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ReminderStore {
    /// Open a store backed by `path`. The file is created on first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a record. `Ok(None)` when no record has this id.
    pub async fn get(&self, id: &str) -> Result<Option<ReminderRecord>, SchedulerError> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        Ok(file.reminders.remove(id))
    }

    /// Insert or replace the record stored under `id`.
    pub async fn put(&self, id: &str, record: ReminderRecord) -> Result<(), SchedulerError> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        let replaced = file.reminders.insert(id.to_string(), record).is_some();
        self.write(&file).await?;
        debug!(id, replaced, "stored reminder");
        Ok(())
    }

    /// Remove the record stored under `id`, if any.
    pub async fn remove(&self, id: &str) -> Result<(), SchedulerError> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        if file.reminders.remove(id).is_some() {
            self.write(&file).await?;
            debug!(id, "removed reminder");
        } else {
            trace!(id, "remove of absent reminder");
        }
        Ok(())
    }

    /// Remove the record stored under `id` if `pred` holds for it.
    ///
    /// The check and the removal run under one lock. Returns whether a
    /// record was removed.
    pub async fn remove_if(
        &self,
        id: &str,
        pred: impl FnOnce(&ReminderRecord) -> bool,
    ) -> Result<bool, SchedulerError> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        match file.reminders.get(id) {
            Some(record) if pred(record) => {}
            Some(_) => {
                trace!(id, "conditional remove skipped");
                return Ok(false);
            }
            None => return Ok(false),
        }
        file.reminders.remove(id);
        self.write(&file).await?;
        debug!(id, "removed reminder");
        Ok(true)
    }

    /// Load the full mapping.
    pub async fn load_all(&self) -> Result<HashMap<String, ReminderRecord>, SchedulerError> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.reminders)
    }

    async fn read(&self) -> Result<StoreFile, SchedulerError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreFile::default()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(StoreFile::default());
        }

        let file: StoreFile = serde_json::from_str(&content)?;
        if file.version != STORE_VERSION {
            return Err(SchedulerError::UnsupportedVersion(file.version));
        }
        Ok(file)
    }

    async fn write(&self, file: &StoreFile) -> Result<(), SchedulerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(file)?;

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        let mut out = fs::File::create(&temp_path).await?;
        out.write_all(content.as_bytes()).await?;
        out.sync_all().await?;

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
