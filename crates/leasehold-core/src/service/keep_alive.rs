//! Background renewal of a held lease
//!
//! Renews at a fraction of the TTL (one third by default) until stopped, the
//! renewal is denied, or the lease runs out while the store is unreachable.

use std::sync::Arc;
use std::time::Duration;

use leasehold_common::{LockError, Timestamp};
use leasehold_consistency::{Denial, Lease, LeaseManager, ReleaseOutcome, RenewOutcome};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval_at};
use tracing::{debug, error, warn};

use super::cancel::CancelSignal;
use crate::model::AttemptState;

/// Why a keep-alive task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepAliveExit {
    /// Stopped on request; the lease is still held
    Stopped,
    /// A renewal was denied; the lease is gone
    Denied(Denial),
    /// The store stayed unreachable until the lease expired
    Expired(LockError),
}

/// Handle to a running keep-alive task
pub struct KeepAlive {
    manager: Arc<LeaseManager>,
    stop: CancelSignal,
    state: watch::Receiver<AttemptState>,
    lease: watch::Receiver<Lease>,
    handle: JoinHandle<KeepAliveExit>,
}

impl std::fmt::Debug for KeepAlive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeepAlive")
            .field("state", &*self.state.borrow())
            .field("lock", &self.lease.borrow().lock_name)
            .finish_non_exhaustive()
    }
}

struct RenewLoop {
    manager: Arc<LeaseManager>,
    ttl: Duration,
    every: Duration,
    stop: CancelSignal,
    state: watch::Sender<AttemptState>,
    lease: watch::Sender<Lease>,
}

impl RenewLoop {
    fn set_state(&self, next: AttemptState) {
        let current = *self.state.borrow();
        match current.transition(next) {
            Ok(next) => {
                self.state.send_replace(next);
            }
            Err(e) => error!(error = %e, "Keep-alive state machine violated"),
        }
    }

    async fn run(self) -> KeepAliveExit {
        let start = tokio::time::Instant::now() + self.every;
        let mut ticker = interval_at(start, self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.stop.cancelled() => return KeepAliveExit::Stopped,
            }

            let current = self.lease.borrow().clone();
            self.set_state(AttemptState::Renewing);

            match self
                .manager
                .renew(&current.lock_name, &current.holder_id, current.token, self.ttl)
                .await
            {
                Ok(RenewOutcome::Renewed(renewed)) => {
                    debug!(
                        lock = %renewed.lock_name,
                        token = %renewed.token,
                        expires_at = renewed.expires_at,
                        "Keep-alive renewed lease"
                    );
                    self.lease.send_replace(renewed);
                    self.set_state(AttemptState::Held);
                }
                Ok(RenewOutcome::Denied(denial)) => {
                    warn!(
                        lock = %current.lock_name,
                        token = %current.token,
                        reason = %denial.reason,
                        "Keep-alive renewal denied, lease lost"
                    );
                    self.set_state(AttemptState::Expired);
                    return KeepAliveExit::Denied(denial);
                }
                Err(e) => {
                    if self.lapsed(&current) {
                        error!(
                            lock = %current.lock_name,
                            token = %current.token,
                            error = %e,
                            "Keep-alive could not renew before expiry"
                        );
                        self.set_state(AttemptState::Expired);
                        return KeepAliveExit::Expired(e);
                    }
                    warn!(
                        lock = %current.lock_name,
                        error = %e,
                        "Keep-alive renewal failed, retrying next tick"
                    );
                    self.set_state(AttemptState::Held);
                }
            }
        }
    }

    fn lapsed(&self, lease: &Lease) -> bool {
        let now: Timestamp = self.manager.now();
        lease.is_expired(now)
    }
}

impl KeepAlive {
    /// Start renewing `lease` with `ttl` every `ttl / 3`
    pub fn start(manager: Arc<LeaseManager>, lease: Lease, ttl: Duration) -> Self {
        Self::start_with_interval(manager, lease, ttl, ttl / 3)
    }

    pub fn start_with_interval(
        manager: Arc<LeaseManager>,
        lease: Lease,
        ttl: Duration,
        every: Duration,
    ) -> Self {
        let every = every.max(Duration::from_millis(1));
        let stop = CancelSignal::new();
        let (state_tx, state_rx) = watch::channel(AttemptState::Held);
        let (lease_tx, lease_rx) = watch::channel(lease);

        let task = RenewLoop {
            manager: manager.clone(),
            ttl,
            every,
            stop: stop.clone(),
            state: state_tx,
            lease: lease_tx,
        };
        let handle = tokio::spawn(task.run());

        Self {
            manager,
            stop,
            state: state_rx,
            lease: lease_rx,
            handle,
        }
    }

    pub fn state(&self) -> AttemptState {
        *self.state.borrow()
    }

    /// Latest renewed copy of the lease
    pub fn lease(&self) -> Lease {
        self.lease.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop renewing and wait for the task to finish. The lease stays held
    /// until it expires or is released.
    pub async fn stop(self) -> Result<KeepAliveExit, LockError> {
        self.stop.cancel();
        self.handle
            .await
            .map_err(|e| LockError::Internal(format!("keep-alive task failed: {e}")))
    }

    /// Wait for the task to end on its own
    pub async fn join(self) -> Result<KeepAliveExit, LockError> {
        self.handle
            .await
            .map_err(|e| LockError::Internal(format!("keep-alive task failed: {e}")))
    }

    /// Stop renewing and release the lease
    pub async fn release(self) -> Result<ReleaseOutcome, LockError> {
        let manager = self.manager.clone();
        let lease_rx = self.lease.clone();
        let exit = self.stop().await?;
        if let KeepAliveExit::Denied(denial) = exit {
            return Ok(ReleaseOutcome::Denied(denial));
        }

        let lease = lease_rx.borrow().clone();
        manager
            .release(&lease.lock_name, &lease.holder_id, lease.token)
            .await
    }
}
