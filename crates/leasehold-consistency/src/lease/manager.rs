//! Lease Manager
//!
//! Enforces lock semantics on top of a [`LeaseStore`] and owns fencing-token
//! issuance. The manager keeps no lease state of its own: every decision
//! re-reads the store, and correctness rests on the store's atomic
//! `create_if_absent` / `compare_and_swap` / `delete`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use leasehold_common::{Clock, FencingToken, HolderId, LockError, LockName, Timestamp};
use metrics::counter;
use tracing::{debug, info, warn};

use super::fencing::FencingCounter;
use super::model::*;
use super::store::{LeaseStore, MemoryLeaseStore, StoreError};

/// Store conflicts are absorbed here; every other store failure surfaces.
fn store_error(op: &'static str, lock_name: &LockName, err: StoreError) -> LockError {
    match err {
        StoreError::Unavailable(msg) => {
            warn!(op, lock = %lock_name, error = %msg, "Lease store unavailable");
            LockError::Unavailable(msg)
        }
        StoreError::Corrupted(msg) => {
            tracing::error!(op, lock = %lock_name, error = %msg, "Lease store corrupted");
            LockError::Internal(msg)
        }
        StoreError::Conflict => {
            LockError::Internal(format!("unhandled version conflict during {op}"))
        }
    }
}

#[derive(Default)]
struct LeaseStatsCollector {
    total_acquisitions: AtomicU64,
    denied_acquisitions: AtomicU64,
    total_renewals: AtomicU64,
    total_releases: AtomicU64,
    reclaimed_leases: AtomicU64,
    force_releases: AtomicU64,
}

/// Issues, renews, releases and reclaims leases
pub struct LeaseManager {
    store: Arc<dyn LeaseStore>,
    counter: Arc<dyn FencingCounter>,
    clock: Arc<dyn Clock>,
    config: LeaseConfig,
    stats: LeaseStatsCollector,
}

impl std::fmt::Debug for LeaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseManager")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl LeaseManager {
    pub fn new(
        store: Arc<dyn LeaseStore>,
        counter: Arc<dyn FencingCounter>,
        clock: Arc<dyn Clock>,
        config: LeaseConfig,
    ) -> Result<Self, LockError> {
        config.validate()?;
        if counter.scope() != config.fencing_scope {
            return Err(LockError::invalid_argument(format!(
                "fencing counter scope {} does not match configured scope {}",
                counter.scope(),
                config.fencing_scope
            )));
        }
        if store.fencing_scope() != config.fencing_scope {
            return Err(LockError::invalid_argument(format!(
                "lease store orders tokens per {} scope but configured scope is {}",
                store.fencing_scope(),
                config.fencing_scope
            )));
        }

        Ok(Self {
            store,
            counter,
            clock,
            config,
            stats: LeaseStatsCollector::default(),
        })
    }

    /// Manager over an embedded store that also serves as the token counter
    pub fn with_memory_store(
        store: Arc<MemoryLeaseStore>,
        clock: Arc<dyn Clock>,
        config: LeaseConfig,
    ) -> Result<Self, LockError> {
        Self::new(store.clone(), store, clock, config)
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    /// Current time according to the manager's clock
    pub fn now(&self) -> Timestamp {
        self.clock.now_millis()
    }

    /// Try to take `lock_name` for `holder_id` without waiting
    pub async fn try_acquire(
        &self,
        lock_name: &LockName,
        holder_id: &HolderId,
        ttl: Duration,
    ) -> Result<AcquireOutcome, LockError> {
        self.config.check_ttl(ttl)?;

        for attempt in 0..2 {
            let now = self.now();
            let existing = self
                .store
                .get(lock_name)
                .await
                .map_err(|e| store_error("acquire", lock_name, e))?;

            if let Some(current) = existing
                && !current.is_expired(now)
            {
                return Ok(self.deny_acquire(lock_name, holder_id, Denial::held_by(&current)));
            }

            let token = self
                .counter
                .next_token(lock_name)
                .await
                .map_err(|e| store_error("acquire", lock_name, e))?;
            let lease = Lease::new(lock_name.clone(), holder_id.clone(), token, now, ttl);

            match self.store.create_if_absent(lease, now).await {
                Ok(committed) => {
                    self.stats.total_acquisitions.fetch_add(1, Ordering::Relaxed);
                    counter!("leasehold_acquire_total", "result" => "granted").increment(1);
                    debug!(
                        lock = %lock_name,
                        holder = %holder_id,
                        token = %committed.token,
                        version = committed.version,
                        expires_at = committed.expires_at,
                        "Lease granted"
                    );
                    return Ok(AcquireOutcome::Granted(committed));
                }
                Err(StoreError::Conflict) => {
                    debug!(lock = %lock_name, holder = %holder_id, attempt, "Create lost a race or its token was overtaken, re-reading");
                }
                Err(e) => return Err(store_error("acquire", lock_name, e)),
            }
        }

        Ok(self.deny_acquire(lock_name, holder_id, Denial::new(DenyReason::Contended)))
    }

    fn deny_acquire(&self, lock_name: &LockName, holder_id: &HolderId, denial: Denial) -> AcquireOutcome {
        self.stats.denied_acquisitions.fetch_add(1, Ordering::Relaxed);
        counter!("leasehold_acquire_total", "result" => "denied").increment(1);
        debug!(
            lock = %lock_name,
            holder = %holder_id,
            reason = %denial.reason,
            current_holder = ?denial.current_holder,
            "Acquire denied"
        );
        AcquireOutcome::Denied(denial)
    }

    /// Checks shared by renew and release. Returns the stored lease when the
    /// caller still owns it.
    fn check_ownership(
        existing: Option<Lease>,
        holder_id: &HolderId,
        token: FencingToken,
        now: Timestamp,
    ) -> Result<Lease, Denial> {
        let Some(lease) = existing else {
            return Err(Denial::new(DenyReason::NotFound));
        };
        if &lease.holder_id != holder_id {
            return Err(Denial::with_lease(DenyReason::NotHolder, &lease));
        }
        if lease.token != token {
            return Err(Denial::with_lease(DenyReason::TokenMismatch, &lease));
        }
        if lease.is_expired(now) {
            return Err(Denial::with_lease(DenyReason::Expired, &lease));
        }
        Ok(lease)
    }

    /// Extend a live lease owned by `holder_id` with `token` to `now + ttl`
    pub async fn renew(
        &self,
        lock_name: &LockName,
        holder_id: &HolderId,
        token: FencingToken,
        ttl: Duration,
    ) -> Result<RenewOutcome, LockError> {
        self.config.check_ttl(ttl)?;

        for _ in 0..2 {
            let now = self.now();
            let existing = self
                .store
                .get(lock_name)
                .await
                .map_err(|e| store_error("renew", lock_name, e))?;

            let current = match Self::check_ownership(existing, holder_id, token, now) {
                Ok(lease) => lease,
                Err(denial) => return Ok(self.deny_renew(lock_name, holder_id, denial)),
            };

            if self.config.max_renewals > 0 && current.renewal_count >= self.config.max_renewals {
                let denial = Denial::with_lease(DenyReason::RenewLimitReached, &current);
                return Ok(self.deny_renew(lock_name, holder_id, denial));
            }

            let renewed = current.renewed(now, ttl);
            match self
                .store
                .compare_and_swap(lock_name, current.version, renewed)
                .await
            {
                Ok(committed) => {
                    self.stats.total_renewals.fetch_add(1, Ordering::Relaxed);
                    counter!("leasehold_renew_total", "result" => "renewed").increment(1);
                    debug!(
                        lock = %lock_name,
                        holder = %holder_id,
                        token = %token,
                        version = committed.version,
                        expires_at = committed.expires_at,
                        "Lease renewed"
                    );
                    return Ok(RenewOutcome::Renewed(committed));
                }
                Err(StoreError::Conflict) => continue,
                Err(e) => return Err(store_error("renew", lock_name, e)),
            }
        }

        Ok(self.deny_renew(lock_name, holder_id, Denial::new(DenyReason::Contended)))
    }

    fn deny_renew(&self, lock_name: &LockName, holder_id: &HolderId, denial: Denial) -> RenewOutcome {
        counter!("leasehold_renew_total", "result" => "denied").increment(1);
        debug!(lock = %lock_name, holder = %holder_id, reason = %denial.reason, "Renew denied");
        RenewOutcome::Denied(denial)
    }

    /// Give up a live lease. Releasing twice yields `Released` then `Denied`.
    pub async fn release(
        &self,
        lock_name: &LockName,
        holder_id: &HolderId,
        token: FencingToken,
    ) -> Result<ReleaseOutcome, LockError> {
        for _ in 0..2 {
            let now = self.now();
            let existing = self
                .store
                .get(lock_name)
                .await
                .map_err(|e| store_error("release", lock_name, e))?;

            let current = match Self::check_ownership(existing, holder_id, token, now) {
                Ok(lease) => lease,
                Err(denial) => return Ok(self.deny_release(lock_name, holder_id, denial)),
            };

            match self.store.delete(lock_name, current.version).await {
                Ok(()) => {
                    self.stats.total_releases.fetch_add(1, Ordering::Relaxed);
                    counter!("leasehold_release_total", "result" => "released").increment(1);
                    debug!(lock = %lock_name, holder = %holder_id, token = %token, "Lease released");
                    return Ok(ReleaseOutcome::Released);
                }
                Err(StoreError::Conflict) => continue,
                Err(e) => return Err(store_error("release", lock_name, e)),
            }
        }

        Ok(self.deny_release(lock_name, holder_id, Denial::new(DenyReason::Contended)))
    }

    fn deny_release(
        &self,
        lock_name: &LockName,
        holder_id: &HolderId,
        denial: Denial,
    ) -> ReleaseOutcome {
        counter!("leasehold_release_total", "result" => "denied").increment(1);
        debug!(lock = %lock_name, holder = %holder_id, reason = %denial.reason, "Release denied");
        ReleaseOutcome::Denied(denial)
    }

    /// Remove the lease under `lock_name` if it has expired. A concurrent
    /// renew that lands first turns this into a no-op.
    pub async fn force_expire_if_stale(&self, lock_name: &LockName) -> Result<ReclaimOutcome, LockError> {
        let now = self.now();
        let existing = self
            .store
            .get(lock_name)
            .await
            .map_err(|e| store_error("reclaim", lock_name, e))?;

        let Some(lease) = existing else {
            return Ok(ReclaimOutcome::NoOp);
        };
        if !lease.is_expired(now) {
            return Ok(ReclaimOutcome::NoOp);
        }

        match self.store.delete(lock_name, lease.version).await {
            Ok(()) => {
                self.stats.reclaimed_leases.fetch_add(1, Ordering::Relaxed);
                counter!("leasehold_reclaimed_total").increment(1);
                info!(
                    lock = %lock_name,
                    holder = %lease.holder_id,
                    token = %lease.token,
                    overdue_ms = now - lease.expires_at,
                    "Expired lease reclaimed"
                );
                Ok(ReclaimOutcome::Reclaimed(lease))
            }
            Err(StoreError::Conflict) => {
                debug!(lock = %lock_name, "Lease changed during reclaim, skipping");
                Ok(ReclaimOutcome::NoOp)
            }
            Err(e) => Err(store_error("reclaim", lock_name, e)),
        }
    }

    /// Remove the lease under `lock_name` regardless of holder or expiry.
    /// Returns the removed lease, if any.
    pub async fn force_release(&self, lock_name: &LockName) -> Result<Option<Lease>, LockError> {
        for _ in 0..2 {
            let existing = self
                .store
                .get(lock_name)
                .await
                .map_err(|e| store_error("force_release", lock_name, e))?;
            let Some(lease) = existing else {
                return Ok(None);
            };

            match self.store.delete(lock_name, lease.version).await {
                Ok(()) => {
                    self.stats.force_releases.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        lock = %lock_name,
                        holder = %lease.holder_id,
                        token = %lease.token,
                        "Lease force released"
                    );
                    return Ok(Some(lease));
                }
                Err(StoreError::Conflict) => continue,
                Err(e) => return Err(store_error("force_release", lock_name, e)),
            }
        }

        Err(LockError::Unavailable(format!(
            "lease on '{lock_name}' kept changing during force release"
        )))
    }

    /// The stored lease under `lock_name`, which may be expired but not yet
    /// reclaimed
    pub async fn inspect(&self, lock_name: &LockName) -> Result<Option<Lease>, LockError> {
        self.store
            .get(lock_name)
            .await
            .map_err(|e| store_error("inspect", lock_name, e))
    }

    /// Stored leases matching `query`, ordered by lock name
    pub async fn list(&self, query: &LeaseQuery) -> Result<Vec<Lease>, LockError> {
        let now = self.now();
        let mut leases: Vec<Lease> = self
            .scan()
            .await?
            .into_iter()
            .filter(|lease| query.include_expired || !lease.is_expired(now))
            .filter(|lease| {
                query
                    .holder_id
                    .as_ref()
                    .is_none_or(|holder| &lease.holder_id == holder)
            })
            .collect();

        leases.sort_by(|a, b| a.lock_name.cmp(&b.lock_name));
        leases.truncate(query.limit);
        Ok(leases)
    }

    /// Every stored lease, live or expired
    pub async fn scan(&self) -> Result<Vec<Lease>, LockError> {
        self.store.scan().await.map_err(|e| match e {
            StoreError::Unavailable(msg) => LockError::Unavailable(msg),
            other => LockError::Internal(other.to_string()),
        })
    }

    pub async fn stats(&self) -> Result<LockStats, LockError> {
        let now = self.now();
        let active_leases = self
            .scan()
            .await?
            .iter()
            .filter(|lease| !lease.is_expired(now))
            .count() as u64;

        Ok(LockStats {
            active_leases,
            total_acquisitions: self.stats.total_acquisitions.load(Ordering::Relaxed),
            denied_acquisitions: self.stats.denied_acquisitions.load(Ordering::Relaxed),
            total_renewals: self.stats.total_renewals.load(Ordering::Relaxed),
            total_releases: self.stats.total_releases.load(Ordering::Relaxed),
            reclaimed_leases: self.stats.reclaimed_leases.load(Ordering::Relaxed),
            force_releases: self.stats.force_releases.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leasehold_common::ManualClock;

    struct Fixture {
        clock: Arc<ManualClock>,
        manager: LeaseManager,
    }

    fn fixture() -> Fixture {
        fixture_with(LeaseConfig::default())
    }

    fn fixture_with(config: LeaseConfig) -> Fixture {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = Arc::new(MemoryLeaseStore::with_fencing_scope(config.fencing_scope));
        let manager = LeaseManager::with_memory_store(store, clock.clone(), config).unwrap();
        Fixture { clock, manager }
    }

    fn name(n: &str) -> LockName {
        LockName::new(n).unwrap()
    }

    fn holder(h: &str) -> HolderId {
        HolderId::new(h).unwrap()
    }

    fn granted(outcome: AcquireOutcome) -> Lease {
        match outcome {
            AcquireOutcome::Granted(lease) => lease,
            AcquireOutcome::Denied(denial) => panic!("expected grant, got {:?}", denial),
        }
    }

    const TTL: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_acquire_grants_first_token() {
        let f = fixture();
        let lease = granted(f.manager.try_acquire(&name("a"), &holder("h1"), TTL).await.unwrap());

        assert_eq!(lease.token, FencingToken::new(1));
        assert_eq!(lease.expires_at, 6_000);
        assert_eq!(lease.version, 1);
    }

    #[tokio::test]
    async fn test_acquire_denied_while_held() {
        let f = fixture();
        granted(f.manager.try_acquire(&name("a"), &holder("h1"), TTL).await.unwrap());

        let outcome = f.manager.try_acquire(&name("a"), &holder("h2"), TTL).await.unwrap();
        match outcome {
            AcquireOutcome::Denied(denial) => {
                assert_eq!(denial.reason, DenyReason::Held);
                assert_eq!(denial.current_holder, Some(holder("h1")));
                assert_eq!(denial.expires_at, Some(6_000));
            }
            other => panic!("unexpected {:?}", other),
        }

        // Re-acquire by the holder itself is denied too; holders renew
        let again = f.manager.try_acquire(&name("a"), &holder("h1"), TTL).await.unwrap();
        assert!(!again.is_granted());
    }

    #[tokio::test]
    async fn test_denied_acquire_does_not_consume_token() {
        let f = fixture();
        granted(f.manager.try_acquire(&name("a"), &holder("h1"), TTL).await.unwrap());
        for _ in 0..3 {
            f.manager.try_acquire(&name("a"), &holder("h2"), TTL).await.unwrap();
        }

        let other = granted(f.manager.try_acquire(&name("b"), &holder("h2"), TTL).await.unwrap());
        assert_eq!(other.token, FencingToken::new(2));
    }

    #[tokio::test]
    async fn test_acquire_replaces_expired_lease() {
        let f = fixture();
        granted(f.manager.try_acquire(&name("a"), &holder("h1"), TTL).await.unwrap());
        f.clock.advance(TTL);

        let lease = granted(f.manager.try_acquire(&name("a"), &holder("h2"), TTL).await.unwrap());
        assert_eq!(lease.holder_id, holder("h2"));
        assert_eq!(lease.token, FencingToken::new(2));
    }

    #[tokio::test]
    async fn test_invalid_ttl_rejected() {
        let f = fixture();
        let result = f
            .manager
            .try_acquire(&name("a"), &holder("h1"), Duration::ZERO)
            .await;
        assert!(matches!(result, Err(LockError::InvalidArgument(_))));

        let result = f
            .manager
            .try_acquire(&name("a"), &holder("h1"), Duration::from_secs(7200))
            .await;
        assert!(matches!(result, Err(LockError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_renew_extends_and_keeps_token() {
        let f = fixture();
        let lease = granted(f.manager.try_acquire(&name("a"), &holder("h1"), TTL).await.unwrap());
        f.clock.advance(Duration::from_secs(3));

        match f
            .manager
            .renew(&name("a"), &holder("h1"), lease.token, TTL)
            .await
            .unwrap()
        {
            RenewOutcome::Renewed(renewed) => {
                assert_eq!(renewed.token, lease.token);
                assert_eq!(renewed.expires_at, 9_000);
                assert_eq!(renewed.version, lease.version + 1);
                assert_eq!(renewed.renewal_count, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_renew_denials() {
        let f = fixture();
        let lease = granted(f.manager.try_acquire(&name("a"), &holder("h1"), TTL).await.unwrap());

        let reason = |outcome: RenewOutcome| match outcome {
            RenewOutcome::Denied(d) => d.reason,
            RenewOutcome::Renewed(_) => panic!("unexpected renewal"),
        };

        let missing = f.manager.renew(&name("b"), &holder("h1"), lease.token, TTL).await.unwrap();
        assert_eq!(reason(missing), DenyReason::NotFound);

        let stranger = f.manager.renew(&name("a"), &holder("h2"), lease.token, TTL).await.unwrap();
        assert_eq!(reason(stranger), DenyReason::NotHolder);

        let wrong_token = f
            .manager
            .renew(&name("a"), &holder("h1"), FencingToken::new(99), TTL)
            .await
            .unwrap();
        assert_eq!(reason(wrong_token), DenyReason::TokenMismatch);

        f.clock.advance(TTL);
        let expired = f.manager.renew(&name("a"), &holder("h1"), lease.token, TTL).await.unwrap();
        assert_eq!(reason(expired), DenyReason::Expired);
    }

    #[tokio::test]
    async fn test_renew_limit() {
        let f = fixture_with(LeaseConfig {
            max_renewals: 2,
            ..Default::default()
        });
        let lease = granted(f.manager.try_acquire(&name("a"), &holder("h1"), TTL).await.unwrap());

        for _ in 0..2 {
            let outcome = f.manager.renew(&name("a"), &holder("h1"), lease.token, TTL).await.unwrap();
            assert!(outcome.is_renewed());
        }

        let outcome = f.manager.renew(&name("a"), &holder("h1"), lease.token, TTL).await.unwrap();
        assert!(matches!(
            outcome,
            RenewOutcome::Denied(Denial { reason: DenyReason::RenewLimitReached, .. })
        ));
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let f = fixture();
        let lease = granted(f.manager.try_acquire(&name("a"), &holder("h1"), TTL).await.unwrap());

        let first = f.manager.release(&name("a"), &holder("h1"), lease.token).await.unwrap();
        assert_eq!(first, ReleaseOutcome::Released);

        let second = f.manager.release(&name("a"), &holder("h1"), lease.token).await.unwrap();
        assert!(matches!(
            second,
            ReleaseOutcome::Denied(Denial { reason: DenyReason::NotFound, .. })
        ));
        assert!(f.manager.inspect(&name("a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_after_expiry_is_denied() {
        let f = fixture();
        let lease = granted(f.manager.try_acquire(&name("a"), &holder("h1"), TTL).await.unwrap());
        f.clock.advance(Duration::from_secs(6));

        let outcome = f.manager.release(&name("a"), &holder("h1"), lease.token).await.unwrap();
        assert!(matches!(
            outcome,
            ReleaseOutcome::Denied(Denial { reason: DenyReason::Expired, .. })
        ));
        // Left for the sweeper
        assert!(f.manager.inspect(&name("a")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_force_expire_only_touches_expired() {
        let f = fixture();
        granted(f.manager.try_acquire(&name("a"), &holder("h1"), TTL).await.unwrap());

        assert_eq!(
            f.manager.force_expire_if_stale(&name("a")).await.unwrap(),
            ReclaimOutcome::NoOp
        );
        assert_eq!(
            f.manager.force_expire_if_stale(&name("missing")).await.unwrap(),
            ReclaimOutcome::NoOp
        );

        f.clock.advance(TTL);
        assert!(matches!(
            f.manager.force_expire_if_stale(&name("a")).await.unwrap(),
            ReclaimOutcome::Reclaimed(_)
        ));
        assert!(f.manager.inspect(&name("a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_force_release() {
        let f = fixture();
        let lease = granted(f.manager.try_acquire(&name("a"), &holder("h1"), TTL).await.unwrap());

        let removed = f.manager.force_release(&name("a")).await.unwrap();
        assert_eq!(removed.map(|l| l.token), Some(lease.token));
        assert!(f.manager.force_release(&name("a")).await.unwrap().is_none());

        let outcome = f.manager.release(&name("a"), &holder("h1"), lease.token).await.unwrap();
        assert!(!outcome.is_released());
    }

    #[tokio::test]
    async fn test_list_and_stats() {
        let f = fixture();
        granted(f.manager.try_acquire(&name("b"), &holder("h1"), TTL).await.unwrap());
        granted(f.manager.try_acquire(&name("a"), &holder("h2"), TTL).await.unwrap());
        granted(
            f.manager
                .try_acquire(&name("c"), &holder("h1"), Duration::from_secs(1))
                .await
                .unwrap(),
        );
        f.manager.try_acquire(&name("a"), &holder("h3"), TTL).await.unwrap();
        f.clock.advance(Duration::from_secs(2));

        let live = f.manager.list(&LeaseQuery::default()).await.unwrap();
        let names: Vec<&str> = live.iter().map(|l| l.lock_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let by_holder = f
            .manager
            .list(&LeaseQuery {
                holder_id: Some(holder("h1")),
                include_expired: true,
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(by_holder.len(), 2);

        let stats = f.manager.stats().await.unwrap();
        assert_eq!(stats.active_leases, 2);
        assert_eq!(stats.total_acquisitions, 3);
        assert_eq!(stats.denied_acquisitions, 1);
    }

    #[tokio::test]
    async fn test_mismatched_counter_scope_rejected() {
        let store = Arc::new(MemoryLeaseStore::with_fencing_scope(FencingScope::PerLock));
        let result = LeaseManager::with_memory_store(
            store,
            Arc::new(ManualClock::new(0)),
            LeaseConfig::default(),
        );
        assert!(matches!(result, Err(LockError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_mismatched_store_scope_rejected() {
        let result = LeaseManager::new(
            Arc::new(MemoryLeaseStore::with_fencing_scope(FencingScope::PerLock)),
            Arc::new(crate::lease::LocalFencingCounter::new(FencingScope::Global)),
            Arc::new(ManualClock::new(0)),
            LeaseConfig::default(),
        );
        assert!(matches!(result, Err(LockError::InvalidArgument(_))));
    }
}
