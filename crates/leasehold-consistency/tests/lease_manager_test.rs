// Integration tests for LeaseManager
// Covers mutual exclusion, fencing monotonicity, stale-holder rejection and
// store failure handling

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use leasehold_common::{
    FencingToken, HolderId, LockError, LockName, ManualClock, SystemClock, Timestamp,
};
use leasehold_consistency::lease::testing::FlakyStore;
use leasehold_consistency::{
    AcquireOutcome, DenyReason, FencingScope, Lease, LeaseConfig, LeaseManager, LeaseStore,
    LocalFencingCounter, MemoryLeaseStore, ReclaimOutcome, ReleaseOutcome, RenewOutcome,
    StoreResult,
};
use proptest::prelude::*;
use tokio::sync::Notify;

fn name(n: &str) -> LockName {
    LockName::new(n).unwrap()
}

fn holder(h: &str) -> HolderId {
    HolderId::new(h).unwrap()
}

fn manual_manager(start: i64) -> (Arc<ManualClock>, LeaseManager) {
    let clock = Arc::new(ManualClock::new(start));
    let store = Arc::new(MemoryLeaseStore::new());
    let manager = LeaseManager::with_memory_store(store, clock.clone(), LeaseConfig::default())
        .expect("valid config");
    (clock, manager)
}

// ============================================================================
// Mutual exclusion
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquirers_never_overlap() {
    let store = Arc::new(MemoryLeaseStore::new());
    let manager = Arc::new(
        LeaseManager::with_memory_store(store, Arc::new(SystemClock::new()), LeaseConfig::default())
            .unwrap(),
    );
    let inside = Arc::new(AtomicUsize::new(0));
    let grants = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..16 {
        let manager = manager.clone();
        let inside = inside.clone();
        let grants = grants.clone();
        handles.push(tokio::spawn(async move {
            let lock = name("shared");
            let me = holder(&format!("worker-{}", i));
            for _ in 0..50 {
                let outcome = manager
                    .try_acquire(&lock, &me, Duration::from_secs(30))
                    .await
                    .unwrap();
                if let AcquireOutcome::Granted(lease) = outcome {
                    let holders = inside.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(holders, 0, "two holders inside the critical section");
                    grants.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    inside.fetch_sub(1, Ordering::SeqCst);

                    let released = manager.release(&lock, &me, lease.token).await.unwrap();
                    assert_eq!(released, ReleaseOutcome::Released);
                } else {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
    assert!(grants.load(Ordering::SeqCst) > 0);
    assert!(manager.inspect(&name("shared")).await.unwrap().is_none());
}

// ============================================================================
// Fencing monotonicity
// ============================================================================

#[tokio::test]
async fn test_tokens_increase_across_locks_and_expiry() {
    let (clock, manager) = manual_manager(0);
    let ttl = Duration::from_secs(2);
    let mut last = FencingToken::default();

    for round in 0..5 {
        for lock in ["a", "b", "c"] {
            let outcome = manager
                .try_acquire(&name(lock), &holder(&format!("h{}", round)), ttl)
                .await
                .unwrap();
            let lease = outcome.lease().cloned().expect("lock should be free");
            assert!(lease.token > last);
            last = lease.token;

            // Renewal keeps the token
            match manager
                .renew(&name(lock), &lease.holder_id, lease.token, ttl)
                .await
                .unwrap()
            {
                RenewOutcome::Renewed(renewed) => assert_eq!(renewed.token, lease.token),
                other => panic!("unexpected {:?}", other),
            }
        }
        clock.advance(ttl);
    }
    assert_eq!(last, FencingToken::new(15));
}

/// Parks the first create of one holder until released, leaving the token it
/// was allocated in flight
struct PausedCreateStore {
    inner: Arc<MemoryLeaseStore>,
    paused_holder: HolderId,
    armed: AtomicBool,
    parked: Notify,
    resume: Notify,
}

impl PausedCreateStore {
    fn new(inner: Arc<MemoryLeaseStore>, paused_holder: HolderId) -> Self {
        Self {
            inner,
            paused_holder,
            armed: AtomicBool::new(true),
            parked: Notify::new(),
            resume: Notify::new(),
        }
    }
}

#[async_trait]
impl LeaseStore for PausedCreateStore {
    async fn get(&self, lock_name: &LockName) -> StoreResult<Option<Lease>> {
        self.inner.get(lock_name).await
    }

    async fn create_if_absent(&self, lease: Lease, now: Timestamp) -> StoreResult<Lease> {
        if lease.holder_id == self.paused_holder && self.armed.swap(false, Ordering::SeqCst) {
            self.parked.notify_one();
            self.resume.notified().await;
        }
        self.inner.create_if_absent(lease, now).await
    }

    async fn compare_and_swap(
        &self,
        lock_name: &LockName,
        expected_version: u64,
        new_lease: Lease,
    ) -> StoreResult<Lease> {
        self.inner
            .compare_and_swap(lock_name, expected_version, new_lease)
            .await
    }

    async fn delete(&self, lock_name: &LockName, expected_version: u64) -> StoreResult<()> {
        self.inner.delete(lock_name, expected_version).await
    }

    async fn scan(&self) -> StoreResult<Vec<Lease>> {
        self.inner.scan().await
    }

    fn fencing_scope(&self) -> FencingScope {
        self.inner.fencing_scope()
    }
}

#[tokio::test]
async fn test_delayed_create_cannot_commit_an_older_token() {
    for scope in [FencingScope::Global, FencingScope::PerLock] {
        let inner = Arc::new(MemoryLeaseStore::with_fencing_scope(scope));
        let store = Arc::new(PausedCreateStore::new(inner.clone(), holder("A")));
        let manager = Arc::new(
            LeaseManager::new(
                store.clone(),
                inner,
                Arc::new(ManualClock::new(0)),
                LeaseConfig {
                    fencing_scope: scope,
                    ..Default::default()
                },
            )
            .unwrap(),
        );
        let lock = name("report");
        let ttl = Duration::from_secs(5);

        // A allocates its token, then stalls before the create lands
        let slow = {
            let manager = manager.clone();
            let lock = lock.clone();
            tokio::spawn(async move { manager.try_acquire(&lock, &holder("A"), ttl).await })
        };
        store.parked.notified().await;

        let first = manager
            .try_acquire(&lock, &holder("B"), ttl)
            .await
            .unwrap()
            .lease()
            .cloned()
            .expect("B should win while A is stalled");
        assert_eq!(
            manager.release(&lock, &holder("B"), first.token).await.unwrap(),
            ReleaseOutcome::Released
        );

        store.resume.notify_one();
        let later = slow
            .await
            .unwrap()
            .unwrap()
            .lease()
            .cloned()
            .expect("A should win on its retry");
        assert!(
            later.token > first.token,
            "{scope}: later grant {} not above earlier grant {}",
            later.token,
            first.token
        );
    }
}

#[derive(Debug, Clone)]
enum Op {
    Acquire { lock: usize, holder: usize, ttl_ms: u64 },
    Release { lock: usize },
    Advance { ms: u64 },
    Sweep { lock: usize },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize, 0..4usize, 1_000..5_000u64)
            .prop_map(|(lock, holder, ttl_ms)| Op::Acquire { lock, holder, ttl_ms }),
        (0..3usize).prop_map(|lock| Op::Release { lock }),
        (0..3_000u64).prop_map(|ms| Op::Advance { ms }),
        (0..3usize).prop_map(|lock| Op::Sweep { lock }),
    ]
}

proptest! {
    #[test]
    fn test_tokens_strictly_increase_for_any_sequence(ops in prop::collection::vec(arb_op(), 1..60)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let (clock, manager) = manual_manager(0);
            let locks = [name("l0"), name("l1"), name("l2")];
            let mut issued: Vec<FencingToken> = Vec::new();

            for op in ops {
                match op {
                    Op::Acquire { lock, holder: h, ttl_ms } => {
                        let outcome = manager
                            .try_acquire(&locks[lock], &holder(&format!("h{}", h)), Duration::from_millis(ttl_ms))
                            .await
                            .unwrap();
                        if let AcquireOutcome::Granted(lease) = outcome {
                            issued.push(lease.token);
                        }
                    }
                    Op::Release { lock } => {
                        if let Some(lease) = manager.inspect(&locks[lock]).await.unwrap() {
                            manager.release(&locks[lock], &lease.holder_id, lease.token).await.unwrap();
                        }
                    }
                    Op::Advance { ms } => clock.advance(Duration::from_millis(ms)),
                    Op::Sweep { lock } => {
                        manager.force_expire_if_stale(&locks[lock]).await.unwrap();
                    }
                }
            }

            assert!(issued.windows(2).all(|w| w[0] < w[1]), "tokens not increasing: {:?}", issued);
        });
    }
}

// ============================================================================
// Stale holders, idempotent release, expiry bound
// ============================================================================

#[tokio::test]
async fn test_stale_holder_is_rejected_after_reacquire() {
    let (clock, manager) = manual_manager(0);
    let ttl = Duration::from_secs(5);

    let first = manager.try_acquire(&name("job"), &holder("A"), ttl).await.unwrap();
    let first = first.lease().cloned().unwrap();
    clock.advance(Duration::from_secs(6));

    // Same holder id comes back after a restart and wins a fresh grant
    let second = manager.try_acquire(&name("job"), &holder("A"), ttl).await.unwrap();
    let second = second.lease().cloned().unwrap();
    assert!(second.token > first.token);

    let renew = manager
        .renew(&name("job"), &holder("A"), first.token, ttl)
        .await
        .unwrap();
    assert!(matches!(renew, RenewOutcome::Denied(ref d) if d.reason == DenyReason::TokenMismatch));

    let release = manager
        .release(&name("job"), &holder("A"), first.token)
        .await
        .unwrap();
    assert!(!release.is_released());

    // The current grant is untouched
    let stored = manager.inspect(&name("job")).await.unwrap().unwrap();
    assert_eq!(stored.token, second.token);
}

#[tokio::test]
async fn test_release_twice() {
    let (_clock, manager) = manual_manager(0);
    let lease = manager
        .try_acquire(&name("job"), &holder("A"), Duration::from_secs(5))
        .await
        .unwrap()
        .lease()
        .cloned()
        .unwrap();

    let first = manager.release(&name("job"), &holder("A"), lease.token).await;
    let second = manager.release(&name("job"), &holder("A"), lease.token).await;
    assert_eq!(first, Ok(ReleaseOutcome::Released));
    assert!(matches!(second, Ok(ReleaseOutcome::Denied(_))));
}

#[tokio::test]
async fn test_reclaim_not_before_ttl() {
    let (clock, manager) = manual_manager(0);
    manager
        .try_acquire(&name("job"), &holder("A"), Duration::from_secs(5))
        .await
        .unwrap();

    clock.set(4_999);
    assert_eq!(
        manager.force_expire_if_stale(&name("job")).await.unwrap(),
        ReclaimOutcome::NoOp
    );
    clock.set(5_000);
    assert!(matches!(
        manager.force_expire_if_stale(&name("job")).await.unwrap(),
        ReclaimOutcome::Reclaimed(_)
    ));
}

#[tokio::test]
async fn test_db_migration_scenario() {
    let (clock, manager) = manual_manager(0);
    let lock = name("db-migration");
    let ttl = Duration::from_secs(5);

    let a = manager.try_acquire(&lock, &holder("A"), ttl).await.unwrap();
    let a = a.lease().cloned().unwrap();
    assert_eq!(a.token, FencingToken::new(1));

    match manager.try_acquire(&lock, &holder("B"), ttl).await.unwrap() {
        AcquireOutcome::Denied(denial) => assert_eq!(denial.current_holder, Some(holder("A"))),
        other => panic!("unexpected {:?}", other),
    }

    clock.advance(Duration::from_secs(6));
    assert!(matches!(
        manager.force_expire_if_stale(&lock).await.unwrap(),
        ReclaimOutcome::Reclaimed(_)
    ));

    let b = manager.try_acquire(&lock, &holder("B"), ttl).await.unwrap();
    assert_eq!(b.lease().map(|l| l.token), Some(FencingToken::new(2)));

    let late = manager.release(&lock, &holder("A"), a.token).await.unwrap();
    assert!(matches!(late, ReleaseOutcome::Denied(_)));
}

// ============================================================================
// Store failures
// ============================================================================

fn flaky_manager() -> (Arc<FlakyStore<MemoryLeaseStore>>, Arc<ManualClock>, LeaseManager) {
    let inner = Arc::new(MemoryLeaseStore::new());
    let flaky = Arc::new(FlakyStore::new(inner.clone()));
    let clock = Arc::new(ManualClock::new(0));
    let manager = LeaseManager::new(flaky.clone(), inner, clock.clone(), LeaseConfig::default())
        .unwrap();
    (flaky, clock, manager)
}

#[tokio::test]
async fn test_single_conflict_is_retried() {
    let (flaky, _clock, manager) = flaky_manager();
    flaky.conflict_next(1);

    let outcome = manager
        .try_acquire(&name("job"), &holder("A"), Duration::from_secs(5))
        .await
        .unwrap();
    let lease = outcome.lease().cloned().expect("retry should win");
    // The first attempt consumed a token; gaps are allowed
    assert_eq!(lease.token, FencingToken::new(2));
}

#[tokio::test]
async fn test_repeated_conflicts_become_contended() {
    let (flaky, clock, manager) = flaky_manager();
    flaky.conflict_next(2);
    let outcome = manager
        .try_acquire(&name("job"), &holder("A"), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(matches!(outcome, AcquireOutcome::Denied(ref d) if d.reason == DenyReason::Contended));

    let lease = manager
        .try_acquire(&name("job"), &holder("A"), Duration::from_secs(5))
        .await
        .unwrap()
        .lease()
        .cloned()
        .unwrap();
    flaky.conflict_next(2);
    let renew = manager
        .renew(&name("job"), &holder("A"), lease.token, Duration::from_secs(5))
        .await
        .unwrap();
    assert!(matches!(renew, RenewOutcome::Denied(ref d) if d.reason == DenyReason::Contended));

    // A reclaim that loses its race is a no-op, not an error
    clock.advance(Duration::from_secs(5));
    flaky.conflict_next(1);
    assert_eq!(
        manager.force_expire_if_stale(&name("job")).await.unwrap(),
        ReclaimOutcome::NoOp
    );
}

#[tokio::test]
async fn test_unavailable_store_is_a_retryable_error() {
    let (flaky, _clock, manager) = flaky_manager();
    flaky.set_unavailable(true);

    let result = manager
        .try_acquire(&name("job"), &holder("A"), Duration::from_secs(5))
        .await;
    match result {
        Err(err @ LockError::Unavailable(_)) => assert!(err.is_retryable()),
        other => panic!("unexpected {:?}", other),
    }

    flaky.set_unavailable(false);
    let result = manager
        .try_acquire(&name("job"), &holder("A"), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(result.is_granted());
}

#[tokio::test]
async fn test_per_lock_counter_with_external_store() {
    let store = Arc::new(MemoryLeaseStore::with_fencing_scope(FencingScope::PerLock));
    let counter = Arc::new(LocalFencingCounter::new(FencingScope::PerLock));
    let manager = LeaseManager::new(
        store,
        counter,
        Arc::new(ManualClock::new(0)),
        LeaseConfig {
            fencing_scope: FencingScope::PerLock,
            ..Default::default()
        },
    )
    .unwrap();

    let ttl = Duration::from_secs(5);
    let a = manager.try_acquire(&name("a"), &holder("A"), ttl).await.unwrap();
    let b = manager.try_acquire(&name("b"), &holder("B"), ttl).await.unwrap();
    assert_eq!(a.lease().map(|l| l.token.value()), Some(1));
    assert_eq!(b.lease().map(|l| l.token.value()), Some(1));
}

#[tokio::test]
async fn test_reclaim_after_lost_race_retries_next_time() {
    let (flaky, clock, manager) = flaky_manager();
    manager
        .try_acquire(&name("job"), &holder("A"), Duration::from_secs(5))
        .await
        .unwrap();
    clock.advance(Duration::from_secs(5));

    flaky.conflict_next(1);
    assert_eq!(
        manager.force_expire_if_stale(&name("job")).await.unwrap(),
        ReclaimOutcome::NoOp
    );
    assert!(matches!(
        manager.force_expire_if_stale(&name("job")).await.unwrap(),
        ReclaimOutcome::Reclaimed(_)
    ));
    assert!(flaky.inner().get(&name("job")).await.unwrap().is_none());
}
