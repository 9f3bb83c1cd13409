//! Lease data model
//!
//! A [`Lease`] is the only ownership record in the system. Everything else in
//! this module describes the outcomes of operations on leases.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use leasehold_common::{FencingToken, HolderId, LockError, LockName, Timestamp};
use serde::{Deserialize, Serialize};

/// Converts a TTL to milliseconds, saturating instead of overflowing
pub(crate) fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// Time-bounded exclusive ownership of a named resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Protected resource
    pub lock_name: LockName,
    /// Current owner
    pub holder_id: HolderId,
    /// Fencing token issued at grant time; never changed by renewal
    pub token: FencingToken,
    /// Grant timestamp (Unix millis)
    pub acquired_at: Timestamp,
    /// Expiration timestamp (Unix millis)
    pub expires_at: Timestamp,
    /// Optimistic-concurrency version, assigned by the store
    #[serde(default)]
    pub version: u64,
    /// Number of successful renewals
    #[serde(default)]
    pub renewal_count: u32,
}

impl Lease {
    /// Build an uncommitted lease. The store assigns the version on create.
    pub fn new(
        lock_name: LockName,
        holder_id: HolderId,
        token: FencingToken,
        now: Timestamp,
        ttl: Duration,
    ) -> Self {
        Self {
            lock_name,
            holder_id,
            token,
            acquired_at: now,
            expires_at: now.saturating_add(ttl_millis(ttl)),
            version: 0,
            renewal_count: 0,
        }
    }

    /// A lease is expired from `expires_at` onwards
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    pub fn remaining_ttl_ms(&self, now: Timestamp) -> u64 {
        if self.expires_at > now {
            (self.expires_at - now) as u64
        } else {
            0
        }
    }

    /// Whether `holder_id` and `token` both match this record
    pub fn is_held_by(&self, holder_id: &HolderId, token: FencingToken) -> bool {
        &self.holder_id == holder_id && self.token == token
    }

    /// Copy with the expiry pushed to `now + ttl`. The version is left for the
    /// store to bump.
    pub fn renewed(&self, now: Timestamp, ttl: Duration) -> Self {
        Self {
            expires_at: now.saturating_add(ttl_millis(ttl)),
            renewal_count: self.renewal_count.saturating_add(1),
            ..self.clone()
        }
    }
}

/// Why an operation was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Another live lease exists
    Held,
    /// No lease is stored under that name
    NotFound,
    /// The stored lease belongs to a different holder
    NotHolder,
    /// The holder matches but the token belongs to an older grant
    TokenMismatch,
    /// The lease expired before the request was evaluated
    Expired,
    /// The renewal limit configured for the manager was reached
    RenewLimitReached,
    /// Lost the optimistic-concurrency race twice
    Contended,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::Held => "held",
            DenyReason::NotFound => "not_found",
            DenyReason::NotHolder => "not_holder",
            DenyReason::TokenMismatch => "token_mismatch",
            DenyReason::Expired => "expired",
            DenyReason::RenewLimitReached => "renew_limit_reached",
            DenyReason::Contended => "contended",
        }
    }
}

impl Display for DenyReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A denied request together with what the caller needs to decide whether to
/// wait or give up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denial {
    pub reason: DenyReason,
    /// Holder of the stored lease, if any
    #[serde(default)]
    pub current_holder: Option<HolderId>,
    /// Expiry of the stored lease, if any
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
}

impl Denial {
    pub fn new(reason: DenyReason) -> Self {
        Self {
            reason,
            current_holder: None,
            expires_at: None,
        }
    }

    pub fn with_lease(reason: DenyReason, lease: &Lease) -> Self {
        Self {
            reason,
            current_holder: Some(lease.holder_id.clone()),
            expires_at: Some(lease.expires_at),
        }
    }

    /// Denial because `lease` is currently held
    pub fn held_by(lease: &Lease) -> Self {
        Self::with_lease(DenyReason::Held, lease)
    }
}

/// Result of `TryAcquire`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Granted(Lease),
    Denied(Denial),
}

impl AcquireOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, AcquireOutcome::Granted(_))
    }

    pub fn lease(&self) -> Option<&Lease> {
        match self {
            AcquireOutcome::Granted(lease) => Some(lease),
            AcquireOutcome::Denied(_) => None,
        }
    }
}

/// Result of `Renew`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewOutcome {
    Renewed(Lease),
    Denied(Denial),
}

impl RenewOutcome {
    pub fn is_renewed(&self) -> bool {
        matches!(self, RenewOutcome::Renewed(_))
    }
}

/// Result of `Release`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    Denied(Denial),
}

impl ReleaseOutcome {
    pub fn is_released(&self) -> bool {
        matches!(self, ReleaseOutcome::Released)
    }
}

/// Result of `ForceExpireIfStale`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReclaimOutcome {
    Reclaimed(Lease),
    NoOp,
}

/// Scope of the fencing-token sequence.
///
/// `Global` keeps one sequence across all lock names so tokens from different
/// locks are comparable; `PerLock` removes cross-lock contention on the counter
/// at the cost of that comparability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FencingScope {
    #[default]
    Global,
    PerLock,
}

impl FromStr for FencingScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "global" => Ok(FencingScope::Global),
            "per_lock" | "per-lock" | "perlock" => Ok(FencingScope::PerLock),
            _ => Err(format!("Invalid fencing scope: {}", s)),
        }
    }
}

impl Display for FencingScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FencingScope::Global => f.write_str("global"),
            FencingScope::PerLock => f.write_str("per_lock"),
        }
    }
}

/// Lease manager settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseConfig {
    /// Shortest TTL a client may request
    pub min_ttl: Duration,
    /// Longest TTL a client may request; indefinite holds are not allowed
    pub max_ttl: Duration,
    /// Maximum renewals per grant (0 = unlimited)
    pub max_renewals: u32,
    pub fencing_scope: FencingScope,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            min_ttl: Duration::from_secs(1),
            max_ttl: Duration::from_secs(3600),
            max_renewals: 0,
            fencing_scope: FencingScope::Global,
        }
    }
}

impl LeaseConfig {
    pub fn validate(&self) -> Result<(), LockError> {
        if self.min_ttl.is_zero() {
            return Err(LockError::invalid_argument("min_ttl must be positive"));
        }
        if self.min_ttl > self.max_ttl {
            return Err(LockError::invalid_argument(format!(
                "min_ttl {:?} exceeds max_ttl {:?}",
                self.min_ttl, self.max_ttl
            )));
        }
        Ok(())
    }

    /// Reject TTLs outside `[min_ttl, max_ttl]`
    pub fn check_ttl(&self, ttl: Duration) -> Result<(), LockError> {
        if ttl.is_zero() {
            return Err(LockError::invalid_argument("ttl must be positive"));
        }
        if ttl < self.min_ttl {
            return Err(LockError::invalid_argument(format!(
                "ttl {}ms is below the minimum of {}ms",
                ttl.as_millis(),
                self.min_ttl.as_millis()
            )));
        }
        if ttl > self.max_ttl {
            return Err(LockError::invalid_argument(format!(
                "ttl {}ms exceeds the maximum of {}ms",
                ttl.as_millis(),
                self.max_ttl.as_millis()
            )));
        }
        Ok(())
    }
}

/// Filter for listing leases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseQuery {
    /// Only leases held by this holder
    #[serde(default)]
    pub holder_id: Option<HolderId>,
    /// Include expired leases that have not been reclaimed yet
    #[serde(default)]
    pub include_expired: bool,
    /// Maximum results
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

impl Default for LeaseQuery {
    fn default() -> Self {
        Self {
            holder_id: None,
            include_expired: false,
            limit: default_limit(),
        }
    }
}

/// Lease statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStats {
    /// Leases currently stored and not expired
    pub active_leases: u64,
    /// Successful grants
    pub total_acquisitions: u64,
    /// Denied acquisition attempts
    pub denied_acquisitions: u64,
    /// Successful renewals
    pub total_renewals: u64,
    /// Successful releases
    pub total_releases: u64,
    /// Leases reclaimed by the sweeper
    pub reclaimed_leases: u64,
    /// Administrative force releases
    pub force_releases: u64,
}
