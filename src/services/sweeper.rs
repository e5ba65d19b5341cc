use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

use crate::services::orchestrator::{OrderError, OrderOrchestrator, Resolution};

#[derive(Debug, Clone, Copy)]
pub struct SweeperSettings {
    pub interval: Duration,
    pub batch_size: i64,
    pub concurrency: usize,
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            batch_size: 100,
            concurrency: 8,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SweepReport {
    fn made_progress(&self) -> bool {
        self.expired + self.skipped > 0
    }
}

/// Periodically releases holds whose `expired_at` has passed.
pub struct ExpirySweeper {
    orchestrator: Arc<OrderOrchestrator>,
    settings: SweeperSettings,
}

impl ExpirySweeper {
    pub fn new(orchestrator: Arc<OrderOrchestrator>, settings: SweeperSettings) -> Self {
        Self {
            orchestrator,
            settings,
        }
    }

    /// Runs until `shutdown` flips to `true`. A full batch that made progress
    /// is followed immediately by another pass.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            batch_size = self.settings.batch_size,
            "Expiry sweeper started"
        );

        loop {
            let mut drain = false;
            match self.sweep_once().await {
                Ok(report) => {
                    if report.scanned > 0 {
                        info!(
                            scanned = report.scanned,
                            expired = report.expired,
                            skipped = report.skipped,
                            failed = report.failed,
                            "Expiry sweep finished"
                        );
                    }
                    drain = report.scanned as i64 >= self.settings.batch_size
                        && report.made_progress();
                }
                Err(e) => error!("Expiry sweep error: {}", e),
            }

            if *shutdown.borrow() {
                break;
            }
            if drain {
                continue;
            }

            tokio::select! {
                _ = sleep(self.settings.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Expiry sweeper stopped");
    }

    /// One pass over the currently expired holds. A failure on one order is
    /// counted and logged; the rest of the batch still runs.
    pub async fn sweep_once(&self) -> Result<SweepReport, OrderError> {
        let candidates = self
            .orchestrator
            .expired_order_ids(self.settings.batch_size)
            .await?;

        let mut report = SweepReport {
            scanned: candidates.len(),
            ..SweepReport::default()
        };
        if candidates.is_empty() {
            return Ok(report);
        }
        debug!("Sweeping {} expired order(s)", candidates.len());

        let orchestrator = &self.orchestrator;
        let results: Vec<_> = stream::iter(candidates)
            .map(|order_id| async move { (order_id, orchestrator.expire_order(order_id).await) })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        for (order_id, result) in results {
            match result {
                Ok(Resolution::Applied(_)) => report.expired += 1,
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    error!(order_id = %order_id, error = %e, "Failed to expire order");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
