//! Expiry Sweeper
//!
//! Periodically reclaims expired leases so a crashed holder's lease is gone
//! no later than one interval after it expires.

use std::sync::Arc;
use std::time::Duration;

use leasehold_common::LockError;
use leasehold_consistency::{LeaseManager, ReclaimOutcome};
use metrics::gauge;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use super::cancel::CancelSignal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperConfig {
    pub interval: Duration,
    pub enabled: bool,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            enabled: true,
        }
    }
}

impl SweeperConfig {
    /// The interval must be at most half of the smallest TTL clients may use
    pub fn validate(&self, min_ttl: Duration) -> Result<(), LockError> {
        if !self.enabled {
            return Ok(());
        }
        if self.interval.is_zero() {
            return Err(LockError::invalid_argument(
                "sweeper interval must be positive",
            ));
        }
        if self.interval.saturating_mul(2) > min_ttl {
            return Err(LockError::invalid_argument(format!(
                "sweeper interval {}ms is too long for min_ttl {}ms (must be at most half)",
                self.interval.as_millis(),
                min_ttl.as_millis()
            )));
        }
        Ok(())
    }
}

/// What one sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Leases enumerated
    pub scanned: usize,
    /// Expired leases removed
    pub reclaimed: usize,
    /// Live leases, and expired ones that changed before they could be removed
    pub skipped: usize,
    /// Leases still live once the sweep finished
    pub alive: usize,
    /// Failed store operations
    pub errors: usize,
}

#[derive(Debug)]
pub struct ExpirySweeper {
    manager: Arc<LeaseManager>,
    config: SweeperConfig,
}

impl ExpirySweeper {
    pub fn new(manager: Arc<LeaseManager>, config: SweeperConfig) -> Result<Self, LockError> {
        config.validate(manager.config().min_ttl)?;
        Ok(Self { manager, config })
    }

    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Reclaim every lease that is expired now. Never fails; store errors are
    /// counted and left for the next sweep.
    pub async fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let leases = match self.manager.scan().await {
            Ok(leases) => leases,
            Err(e) => {
                warn!(error = %e, "Sweep could not enumerate leases");
                report.errors += 1;
                return report;
            }
        };
        report.scanned = leases.len();

        let now = self.manager.now();
        for lease in leases {
            if !lease.is_expired(now) {
                report.alive += 1;
                report.skipped += 1;
                continue;
            }

            match self.manager.force_expire_if_stale(&lease.lock_name).await {
                Ok(ReclaimOutcome::Reclaimed(_)) => report.reclaimed += 1,
                Ok(ReclaimOutcome::NoOp) => {
                    report.skipped += 1;
                    // Renewed or re-granted in the meantime, or gone entirely
                    if let Ok(Some(current)) = self.manager.inspect(&lease.lock_name).await
                        && !current.is_expired(now)
                    {
                        report.alive += 1;
                    }
                }
                Err(e) => {
                    warn!(lock = %lease.lock_name, error = %e, "Failed to reclaim expired lease");
                    report.errors += 1;
                }
            }
        }

        gauge!("leasehold_leases_alive").set(report.alive as f64);
        if report.reclaimed > 0 || report.errors > 0 {
            debug!(
                scanned = report.scanned,
                reclaimed = report.reclaimed,
                errors = report.errors,
                "Sweep finished"
            );
        }
        report
    }

    /// Sweep every interval until `shutdown` fires
    pub async fn run(&self, shutdown: CancelSignal) {
        if !self.config.enabled {
            info!("Expiry sweeper disabled");
            return;
        }

        info!(interval_ms = self.config.interval.as_millis() as u64, "Expiry sweeper started");
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                _ = shutdown.cancelled() => break,
            }
        }
        info!("Expiry sweeper stopped");
    }

    pub fn spawn(self: Arc<Self>, shutdown: CancelSignal) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
