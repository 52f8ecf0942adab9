//! Foreground loop delivering alarms until interrupted.

use std::time::Duration;

use miette::Result;
use tokio::sync::watch;
use tracing::{error, info};

use crate::host::Host;

/// Tick every `interval` until Ctrl-C.
pub async fn run(host: Host, interval: Duration) -> Result<()> {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    info!(
        data_dir = %host.data_dir().display(),
        interval_secs = interval.as_secs(),
        "waymark running"
    );

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }

            _ = ticker.tick() => {
                // A failed tick is logged; the next one runs on schedule.
                if let Err(e) = host.tick().await {
                    error!(error = %e, "tick failed");
                }
            }
        }
    }

    info!("waymark stopped");
    Ok(())
}
