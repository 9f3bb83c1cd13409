//! Lock Coordinator
//!
//! Client-facing acquisition on top of the [`LeaseManager`]. Waiting is
//! polling with jittered backoff: there is no wake-up when a lock is
//! released, so waiters race on every retry and no FIFO order is kept.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use leasehold_common::{FencingToken, HolderId, LockError, LockName};
use leasehold_consistency::{
    AcquireOutcome, Denial, Lease, LeaseManager, ReleaseOutcome, RenewOutcome,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::backoff::BackoffConfig;
use super::cancel::CancelSignal;
use crate::model::{AcquireResult, WaitPolicy};

/// Result of the closure run by [`LockCoordinator::with_lock`] together with
/// the outcome of the release that followed it
#[derive(Debug)]
pub struct Scoped<T> {
    pub lock_name: LockName,
    pub value: T,
    pub release: Result<ReleaseOutcome, LockError>,
}

impl<T> Scoped<T> {
    /// Whether the lease was still ours when the closure finished
    pub fn released_cleanly(&self) -> bool {
        matches!(self.release, Ok(ReleaseOutcome::Released))
    }

    /// The closure's value, or an error if the release showed the lease had
    /// been lost while the closure ran
    pub fn into_result(self) -> Result<T, LockError> {
        match self.release {
            Ok(ReleaseOutcome::Released) => Ok(self.value),
            Ok(ReleaseOutcome::Denied(denial)) => Err(LockError::LeaseLost {
                lock_name: self.lock_name.to_string(),
                reason: denial.reason.to_string(),
            }),
            Err(e) => Err(e),
        }
    }
}

/// Outcome of [`LockCoordinator::with_lock`]
#[derive(Debug)]
pub enum ScopedOutcome<T> {
    /// The lock was acquired and the closure ran
    Ran(Scoped<T>),
    /// The lock was not acquired; the closure did not run
    NotAcquired(AcquireResult),
}

impl<T> ScopedOutcome<T> {
    pub fn ran(self) -> Option<Scoped<T>> {
        match self {
            ScopedOutcome::Ran(scoped) => Some(scoped),
            ScopedOutcome::NotAcquired(_) => None,
        }
    }
}

#[derive(Debug)]
pub struct LockCoordinator {
    manager: Arc<LeaseManager>,
    backoff: BackoffConfig,
}

impl LockCoordinator {
    pub fn new(manager: Arc<LeaseManager>, backoff: BackoffConfig) -> Result<Self, LockError> {
        backoff.validate()?;
        Ok(Self { manager, backoff })
    }

    pub fn manager(&self) -> &Arc<LeaseManager> {
        &self.manager
    }

    pub fn backoff(&self) -> &BackoffConfig {
        &self.backoff
    }

    /// Acquire `lock_name`, waiting according to `policy`.
    ///
    /// `Unavailable` store errors are retried like denials while waiting; the
    /// error is returned only for `NoWait` or when it was the last outcome
    /// before the deadline. On cancellation no lease is left behind.
    pub async fn acquire(
        &self,
        lock_name: &LockName,
        holder_id: &HolderId,
        ttl: Duration,
        policy: WaitPolicy,
        cancel: &CancelSignal,
    ) -> Result<AcquireResult, LockError> {
        let start = Instant::now();
        let deadline = policy.deadline(start);
        let mut attempt: u32 = 0;
        let mut last_denial: Option<Denial> = None;
        let mut last_error: Option<LockError> = None;

        let result = loop {
            if cancel.is_cancelled() {
                break AcquireResult::Cancelled;
            }

            match self.manager.try_acquire(lock_name, holder_id, ttl).await {
                Ok(AcquireOutcome::Granted(lease)) => {
                    if cancel.is_cancelled() {
                        self.release_abandoned(&lease).await;
                        break AcquireResult::Cancelled;
                    }
                    break AcquireResult::Held(lease);
                }
                Ok(AcquireOutcome::Denied(denial)) => {
                    if !policy.allows_waiting() {
                        break AcquireResult::Denied(denial);
                    }
                    last_denial = Some(denial);
                    last_error = None;
                }
                Err(e) if e.is_retryable() && policy.allows_waiting() => {
                    debug!(lock = %lock_name, holder = %holder_id, error = %e, "Acquire attempt failed, will retry");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }

            let mut delay = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);

            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    if let Some(e) = last_error {
                        return Err(e);
                    }
                    break AcquireResult::TimedOut(last_denial);
                }
                delay = delay.min(deadline - now);
            }

            let cancelled = tokio::select! {
                _ = tokio::time::sleep(delay) => false,
                _ = cancel.cancelled() => true,
            };
            if cancelled {
                break AcquireResult::Cancelled;
            }
        };

        let state = result.state();
        match &result {
            AcquireResult::Held(lease) if attempt > 0 => info!(
                lock = %lock_name,
                holder = %holder_id,
                token = %lease.token,
                attempts = attempt + 1,
                waited_ms = start.elapsed().as_millis() as u64,
                "Lock acquired after waiting"
            ),
            _ => debug!(
                lock = %lock_name,
                holder = %holder_id,
                state = %state,
                attempts = attempt + 1,
                "Acquire finished"
            ),
        }
        Ok(result)
    }

    async fn release_abandoned(&self, lease: &Lease) {
        match self
            .manager
            .release(&lease.lock_name, &lease.holder_id, lease.token)
            .await
        {
            Ok(ReleaseOutcome::Released) => {
                debug!(lock = %lease.lock_name, token = %lease.token, "Released grant that arrived after cancellation");
            }
            Ok(ReleaseOutcome::Denied(denial)) => {
                debug!(lock = %lease.lock_name, reason = %denial.reason, "Grant that arrived after cancellation already gone");
            }
            Err(e) => {
                warn!(
                    lock = %lease.lock_name,
                    token = %lease.token,
                    error = %e,
                    "Failed to release grant that arrived after cancellation; it will expire"
                );
            }
        }
    }

    /// Single non-blocking attempt
    pub async fn try_acquire(
        &self,
        lock_name: &LockName,
        holder_id: &HolderId,
        ttl: Duration,
    ) -> Result<AcquireResult, LockError> {
        self.acquire(lock_name, holder_id, ttl, WaitPolicy::NoWait, &CancelSignal::new())
            .await
    }

    pub async fn renew(
        &self,
        lock_name: &LockName,
        holder_id: &HolderId,
        token: FencingToken,
        ttl: Duration,
    ) -> Result<RenewOutcome, LockError> {
        self.manager.renew(lock_name, holder_id, token, ttl).await
    }

    pub async fn release(
        &self,
        lock_name: &LockName,
        holder_id: &HolderId,
        token: FencingToken,
    ) -> Result<ReleaseOutcome, LockError> {
        self.manager.release(lock_name, holder_id, token).await
    }

    pub async fn inspect(&self, lock_name: &LockName) -> Result<Option<Lease>, LockError> {
        self.manager.inspect(lock_name).await
    }

    /// Acquire, run `f`, then release on every exit path.
    ///
    /// A panic inside `f` still releases the lease before the panic resumes.
    /// The release outcome is returned with the value and must be checked:
    /// a denied release means the lease lapsed while `f` was running.
    pub async fn with_lock<F, Fut, T>(
        &self,
        lock_name: &LockName,
        holder_id: &HolderId,
        ttl: Duration,
        policy: WaitPolicy,
        cancel: &CancelSignal,
        f: F,
    ) -> Result<ScopedOutcome<T>, LockError>
    where
        F: FnOnce(Lease) -> Fut,
        Fut: Future<Output = T>,
    {
        let lease = match self
            .acquire(lock_name, holder_id, ttl, policy, cancel)
            .await?
        {
            AcquireResult::Held(lease) => lease,
            other => return Ok(ScopedOutcome::NotAcquired(other)),
        };
        let token = lease.token;

        let outcome = AssertUnwindSafe(f(lease)).catch_unwind().await;

        let release = self.manager.release(lock_name, holder_id, token).await;
        match &release {
            Ok(ReleaseOutcome::Released) => {}
            Ok(ReleaseOutcome::Denied(denial)) => warn!(
                lock = %lock_name,
                holder = %holder_id,
                token = %token,
                reason = %denial.reason,
                "Lease was lost before the scoped section finished"
            ),
            Err(e) => warn!(
                lock = %lock_name,
                holder = %holder_id,
                token = %token,
                error = %e,
                "Release after scoped section failed"
            ),
        }

        match outcome {
            Ok(value) => Ok(ScopedOutcome::Ran(Scoped {
                lock_name: lock_name.clone(),
                value,
                release,
            })),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
