//! Recovery sweep: re-queues jobs whose lease expired.
//!
//! A crashed worker holds a lease it can never release. The sweep runs on its
//! own ticker and resets those rows so another worker can pick them up.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::store::JobStore;

pub struct RecoverySweeper {
    store: JobStore,
    interval: Duration,
}

impl RecoverySweeper {
    pub fn new(store: JobStore, interval: Duration) -> Self {
        Self { store, interval }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(self, shutdown: CancellationToken) {
        info!(interval_sec = self.interval.as_secs(), "recovery sweeper starting");
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    match self.store.recover_stalled(Utc::now()).await {
                        Ok(0) => {}
                        Ok(count) => info!(count, "recovered jobs with expired leases"),
                        Err(e) => error!(error = %e, "recovery sweep failed"),
                    }
                }
            }
        }

        info!("recovery sweeper stopped");
    }
}
