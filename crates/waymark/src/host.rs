//! Wiring of the store, journals, manager and dispatcher over a data directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info};
use waymark_geo::{Coordinates, StaticPermission};
use waymark_scheduler::{
    Clock, DispatchReport, ListenerRegistry, RegionTarget, ReminderManager, ReminderStore,
    SchedulerError, TriggerDispatcher,
};

use crate::error::HostError;
use crate::journal::{AlarmJournal, RegionJournal};

const STORE_FILE: &str = "reminders.json";
const ALARMS_FILE: &str = "alarms.json";
const REGIONS_FILE: &str = "regions.json";

/// Errors from delivering due alarms or region entries.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Journal(#[from] HostError),

    #[error(transparent)]
    Dispatch(#[from] SchedulerError),
}

/// Everything a command needs, opened over one data directory.
pub struct Host {
    data_dir: PathBuf,
    clock: Arc<dyn Clock>,
    pub alarms: Arc<AlarmJournal>,
    pub regions: Arc<RegionJournal>,
    pub manager: ReminderManager,
    pub dispatcher: TriggerDispatcher,
}

impl Host {
    pub fn open(
        data_dir: impl Into<PathBuf>,
        location_granted: bool,
        listeners: ListenerRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let data_dir = data_dir.into();
        let store = Arc::new(ReminderStore::open(data_dir.join(STORE_FILE)));
        let alarms = Arc::new(AlarmJournal::open(data_dir.join(ALARMS_FILE)));
        let regions = Arc::new(RegionJournal::open(
            data_dir.join(REGIONS_FILE),
            Arc::clone(&clock),
        ));

        let manager = ReminderManager::new(
            Arc::clone(&store),
            alarms.clone(),
            regions.clone(),
            Arc::new(StaticPermission(location_granted)),
        )
        .with_clock(Arc::clone(&clock));
        let dispatcher =
            TriggerDispatcher::new(Arc::clone(&store), alarms.clone(), regions.clone(), listeners)
                .with_clock(Arc::clone(&clock));

        Self {
            data_dir,
            clock,
            alarms,
            regions,
            manager,
            dispatcher,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Expire lapsed trigger windows and deliver every alarm that is due.
    ///
    /// Alarms are taken from the journal one at a time, earliest first. A
    /// failed dispatch is logged and not retried, and the remaining alarms
    /// are still delivered. The first dispatch error is returned afterwards.
    pub async fn tick(&self) -> Result<DispatchReport, DeliveryError> {
        let now = self.clock.now();

        let expired = self.regions.expire(now).await?;
        if !expired.is_empty() {
            debug!(?expired, "trigger windows expired");
        }

        let mut report = DispatchReport::default();
        let mut delivered = 0usize;
        let mut first_error = None;
        while let Some(alarm) = self.alarms.take_next_due(now).await? {
            delivered += 1;
            debug!(trigger_id = %alarm.trigger_id, at = %alarm.at, "delivering alarm");
            match self.dispatcher.on_alarm(alarm.payload).await {
                Ok(r) => report.merge(r),
                Err(e) => {
                    error!(trigger_id = %alarm.trigger_id, error = %e, "alarm dispatch failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if delivered > 0 {
            info!(alarms = delivered, invoked = report.invoked.len(), "tick delivered alarms");
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(report),
        }
    }

    /// Deliver entry events for every live region containing `point`.
    pub async fn visit(&self, point: Coordinates) -> Result<DispatchReport, DeliveryError> {
        let hits = self.regions.containing(&point, self.clock.now()).await?;

        let (windows, persistent): (Vec<_>, Vec<_>) = hits
            .into_iter()
            .partition(|r| r.target == RegionTarget::TriggerWindow);
        let persistent: Vec<String> = persistent.into_iter().map(|r| r.id).collect();
        let windows: Vec<String> = windows.into_iter().map(|r| r.id).collect();
        debug!(%point, ?persistent, ?windows, "regions entered");

        let mut report = DispatchReport::default();
        if !persistent.is_empty() {
            report.merge(self.dispatcher.on_location_entered(&persistent).await?);
        }
        if !windows.is_empty() {
            report.merge(self.dispatcher.on_trigger_window_entered(&windows).await?);
        }
        Ok(report)
    }
}
