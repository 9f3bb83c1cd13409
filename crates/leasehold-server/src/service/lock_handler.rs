//! In-process adapter from the wire models to the lock coordinator
//!
//! Acquire, renew and release report validation failures and store errors
//! through the response `status` instead of failing.

use std::sync::Arc;
use std::time::Duration;

use leasehold_api::{
    AcquireRequest, AcquireResponse, InspectRequest, InspectResponse, LockStatus, ReleaseRequest,
    ReleaseResponse, RenewRequest, RenewResponse, WaitPolicyModel,
};
use leasehold_common::{FencingToken, HolderId, LockError, LockName};
use leasehold_consistency::{Denial, ReleaseOutcome, RenewOutcome};
use leasehold_core::{AcquireResult, CancelSignal, LockCoordinator, WaitPolicy};
use tracing::{debug, warn};

use crate::metrics::{Timer, record_acquire_duration};

/// Status reported for an operation that failed with `error`
pub fn status_for(error: &LockError) -> LockStatus {
    match error {
        LockError::InvalidArgument(_) => LockStatus::InvalidArgument,
        LockError::Unavailable(_) | LockError::LeaseLost { .. } | LockError::Internal(_) => {
            LockStatus::Unavailable
        }
    }
}

pub fn wait_policy(model: WaitPolicyModel) -> WaitPolicy {
    match model {
        WaitPolicyModel::NoWait => WaitPolicy::NoWait,
        WaitPolicyModel::WaitUpTo { wait_millis } => {
            WaitPolicy::WaitUpTo(Duration::from_millis(wait_millis))
        }
        WaitPolicyModel::WaitForever => WaitPolicy::WaitForever,
    }
}

fn parse_ids(lock_name: &str, holder_id: &str) -> Result<(LockName, HolderId), LockError> {
    Ok((LockName::new(lock_name)?, HolderId::new(holder_id)?))
}

fn holder_of(denial: &Denial) -> Option<String> {
    denial
        .current_holder
        .as_ref()
        .map(|holder| holder.as_str().to_string())
}

#[derive(Debug, Clone)]
pub struct LockOperationHandler {
    coordinator: Arc<LockCoordinator>,
}

impl LockOperationHandler {
    pub fn new(coordinator: Arc<LockCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<LockCoordinator> {
        &self.coordinator
    }

    pub async fn acquire(&self, request: AcquireRequest, cancel: &CancelSignal) -> AcquireResponse {
        let timer = Timer::new();
        let response = match self.try_acquire(&request, cancel).await {
            Ok(response) => response,
            Err(e) => {
                warn!(lock = %request.lock_name, holder = %request.holder_id, error = %e, "Acquire failed");
                AcquireResponse::error(status_for(&e), e.to_string())
            }
        };
        record_acquire_duration(response.status.as_str(), timer.elapsed_secs());
        response
    }

    async fn try_acquire(
        &self,
        request: &AcquireRequest,
        cancel: &CancelSignal,
    ) -> Result<AcquireResponse, LockError> {
        let (lock_name, holder_id) = parse_ids(&request.lock_name, &request.holder_id)?;
        let ttl = Duration::from_millis(request.ttl_millis);

        let result = self
            .coordinator
            .acquire(&lock_name, &holder_id, ttl, wait_policy(request.wait_policy), cancel)
            .await?;

        Ok(match result {
            AcquireResult::Held(lease) => {
                AcquireResponse::held(lease.token.value(), lease.expires_at)
            }
            AcquireResult::Denied(denial) => AcquireResponse::denied(
                denial.reason.as_str(),
                holder_of(&denial),
                denial.expires_at,
            ),
            AcquireResult::TimedOut(denial) => match denial {
                Some(denial) => AcquireResponse::timed_out(holder_of(&denial), denial.expires_at),
                None => AcquireResponse::timed_out(None, None),
            },
            AcquireResult::Cancelled => AcquireResponse::cancelled(),
        })
    }

    pub async fn renew(&self, request: RenewRequest) -> RenewResponse {
        let result = async {
            let (lock_name, holder_id) = parse_ids(&request.lock_name, &request.holder_id)?;
            self.coordinator
                .renew(
                    &lock_name,
                    &holder_id,
                    FencingToken::new(request.token),
                    Duration::from_millis(request.ttl_millis),
                )
                .await
        }
        .await;

        match result {
            Ok(RenewOutcome::Renewed(lease)) => RenewResponse::renewed(lease.expires_at),
            Ok(RenewOutcome::Denied(denial)) => {
                debug!(lock = %request.lock_name, reason = %denial.reason, "Renew denied");
                RenewResponse::denied(denial.reason.as_str())
            }
            Err(e) => {
                warn!(lock = %request.lock_name, holder = %request.holder_id, error = %e, "Renew failed");
                RenewResponse::error(status_for(&e), e.to_string())
            }
        }
    }

    pub async fn release(&self, request: ReleaseRequest) -> ReleaseResponse {
        let result = async {
            let (lock_name, holder_id) = parse_ids(&request.lock_name, &request.holder_id)?;
            self.coordinator
                .release(&lock_name, &holder_id, FencingToken::new(request.token))
                .await
        }
        .await;

        match result {
            Ok(ReleaseOutcome::Released) => ReleaseResponse::released(),
            Ok(ReleaseOutcome::Denied(denial)) => {
                debug!(lock = %request.lock_name, reason = %denial.reason, "Release denied");
                ReleaseResponse::denied(denial.reason.as_str())
            }
            Err(e) => {
                warn!(lock = %request.lock_name, holder = %request.holder_id, error = %e, "Release failed");
                ReleaseResponse::error(status_for(&e), e.to_string())
            }
        }
    }

    /// Read-only view of the stored lease. Errors are returned as-is since the
    /// response has no status field.
    pub async fn inspect(&self, request: InspectRequest) -> Result<InspectResponse, LockError> {
        let lock_name = LockName::new(request.lock_name)?;
        let now = self.coordinator.manager().now();

        Ok(match self.coordinator.inspect(&lock_name).await? {
            Some(lease) => InspectResponse {
                found: true,
                holder_id: Some(lease.holder_id.as_str().to_string()),
                token: Some(lease.token.value()),
                expires_at: Some(lease.expires_at),
                expired: lease.is_expired(now),
            },
            None => InspectResponse::absent(),
        })
    }
}
