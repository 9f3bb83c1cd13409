//! Assembles the lock service from configuration and runs it until shutdown

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use leasehold_common::{Clock, LockError, SystemClock};
use leasehold_consistency::{LeaseConfig, LeaseManager, MemoryLeaseStore, TokenReservation};
use leasehold_core::{BackoffConfig, ExpirySweeper, LockCoordinator, SweeperConfig};
use tracing::{info, warn};

use super::shutdown::ShutdownSignal;
use crate::model::{Configuration, ConfigurationError};
use crate::service::LockOperationHandler;

/// Files that carry store state across restarts
#[derive(Debug, Clone)]
pub struct StorePersistence {
    /// Leases and counters, written on shutdown
    pub snapshot_path: PathBuf,
    /// Durable token bound, written ahead of issuance
    pub reservation: TokenReservation,
}

impl StorePersistence {
    /// Snapshot at `snapshot_path` with the reservation beside it in
    /// `<snapshot_path>.tokens`
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        let snapshot_path = snapshot_path.into();
        let mut reservation_path = OsString::from(snapshot_path.as_os_str());
        reservation_path.push(".tokens");

        Self {
            reservation: TokenReservation::new(PathBuf::from(reservation_path)),
            snapshot_path,
        }
    }

    pub fn with_token_block_size(mut self, block_size: u64) -> Self {
        self.reservation = self.reservation.with_block_size(block_size);
        self
    }
}

pub struct LockServer {
    store: Arc<MemoryLeaseStore>,
    manager: Arc<LeaseManager>,
    handler: LockOperationHandler,
    sweeper: Arc<ExpirySweeper>,
    persistence: Option<StorePersistence>,
}

impl LockServer {
    pub fn from_configuration(configuration: &Configuration) -> Result<Self, ConfigurationError> {
        configuration.validate()?;
        let server = Self::new(
            configuration.lease_config()?,
            configuration.sweeper_config(),
            configuration.backoff_config(),
            configuration.store_persistence(),
            Arc::new(SystemClock::new()),
        )?;
        Ok(server)
    }

    pub fn new(
        lease: LeaseConfig,
        sweeper: SweeperConfig,
        backoff: BackoffConfig,
        persistence: Option<StorePersistence>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LockError> {
        let mut store = MemoryLeaseStore::with_fencing_scope(lease.fencing_scope);
        if let Some(persistence) = &persistence {
            store = store.with_token_reservation(persistence.reservation.clone());
        }
        let store = Arc::new(store);
        let manager = Arc::new(LeaseManager::with_memory_store(store.clone(), clock, lease)?);
        let coordinator = Arc::new(LockCoordinator::new(manager.clone(), backoff)?);
        let sweeper = Arc::new(ExpirySweeper::new(manager.clone(), sweeper)?);

        Ok(Self {
            store,
            manager,
            handler: LockOperationHandler::new(coordinator),
            sweeper,
            persistence,
        })
    }

    pub fn handler(&self) -> &LockOperationHandler {
        &self.handler
    }

    pub fn manager(&self) -> &Arc<LeaseManager> {
        &self.manager
    }

    pub fn sweeper(&self) -> &Arc<ExpirySweeper> {
        &self.sweeper
    }

    /// Restore leases from the snapshot and resume fencing tokens above the
    /// durable reservation
    pub async fn load_snapshot(&self) -> anyhow::Result<usize> {
        let Some(persistence) = &self.persistence else {
            return Ok(0);
        };
        let path = &persistence.snapshot_path;
        let restored = self
            .store
            .load_snapshot(path)
            .await
            .with_context(|| format!("failed to load lease snapshot {}", path.display()))?;
        let reserved = self
            .store
            .recover_token_reservation()
            .await
            .with_context(|| {
                format!(
                    "failed to read token reservation {}",
                    persistence.reservation.path().display()
                )
            })?;
        info!(
            path = %path.display(),
            leases = restored,
            reserved_through = reserved,
            "Lease store state restored"
        );
        Ok(restored)
    }

    /// Write the snapshot, then shrink the token reservation to what was
    /// actually issued
    pub async fn save_snapshot(&self) -> anyhow::Result<usize> {
        let Some(persistence) = &self.persistence else {
            return Ok(0);
        };
        let path = &persistence.snapshot_path;
        let saved = self
            .store
            .save_snapshot(path, self.manager.now())
            .await
            .with_context(|| format!("failed to save lease snapshot {}", path.display()))?;
        self.store
            .trim_token_reservation()
            .await
            .with_context(|| {
                format!(
                    "failed to write token reservation {}",
                    persistence.reservation.path().display()
                )
            })?;
        Ok(saved)
    }

    /// Load the snapshot, sweep until `shutdown` fires, then write the
    /// snapshot back
    pub async fn run(&self, shutdown: ShutdownSignal) -> anyhow::Result<()> {
        self.load_snapshot().await?;

        let sweeper_handle = self.sweeper.clone().spawn(shutdown.cancel_signal());
        info!(
            fencing_scope = %self.manager.config().fencing_scope,
            min_ttl_ms = self.manager.config().min_ttl.as_millis() as u64,
            max_ttl_ms = self.manager.config().max_ttl.as_millis() as u64,
            "Leasehold lock service started"
        );

        shutdown.wait().await;

        if let Err(e) = sweeper_handle.await {
            warn!(error = %e, "Expiry sweeper task ended abnormally");
        }
        self.save_snapshot().await?;

        match self.manager.stats().await {
            Ok(stats) => info!(
                active = stats.active_leases,
                acquisitions = stats.total_acquisitions,
                denied = stats.denied_acquisitions,
                reclaimed = stats.reclaimed_leases,
                "Leasehold lock service stopped"
            ),
            Err(e) => warn!(error = %e, "Leasehold lock service stopped without final stats"),
        }
        Ok(())
    }
}
