use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::StoreResult;
use crate::metrics::CRISIS_SWEEPER_TICKS_TOTAL;
use crate::store::LocalStore;
use crate::utils::clock::Clock;

use super::crisis::CrisisService;

/// What one tick cleaned up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub purged: usize,
}

/// Background loop that expires crises nobody came back to answer and drops
/// failure cooldowns that have run out.
pub struct CrisisSweeper {
    crisis: CrisisService,
    store: LocalStore,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl CrisisSweeper {
    pub fn new(
        crisis: CrisisService,
        store: LocalStore,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            crisis,
            store,
            clock,
            interval,
        }
    }

    pub async fn run(&self) {
        info!(
            "Starting crisis sweeper loop (interval {}s)",
            self.interval.as_secs()
        );

        loop {
            match self.run_once().await {
                Ok(report) => {
                    CRISIS_SWEEPER_TICKS_TOTAL
                        .with_label_values(&["success"])
                        .inc();
                    if report.expired > 0 || report.purged > 0 {
                        info!(
                            expired = report.expired,
                            purged = report.purged,
                            "Sweep cleaned up overdue state"
                        );
                    } else {
                        debug!("Sweep found nothing overdue");
                    }
                }
                Err(err) => {
                    CRISIS_SWEEPER_TICKS_TOTAL
                        .with_label_values(&["error"])
                        .inc();
                    warn!(error = %err, "Crisis sweep failed");
                }
            }

            sleep(self.interval).await;
        }
    }

    pub async fn run_once(&self) -> StoreResult<SweepReport> {
        let expired = self.crisis.sweep().await?;
        let purged = self.store.purge_expired_failures(self.clock.now()).await?;
        Ok(SweepReport { expired, purged })
    }
}
