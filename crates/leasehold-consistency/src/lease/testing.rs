//! Fault injection for exercising store failure paths

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use leasehold_common::{LockName, Timestamp};

use super::model::{FencingScope, Lease};
use super::store::{LeaseStore, StoreError, StoreResult};

/// Wraps a store and fails operations on demand
pub struct FlakyStore<S> {
    inner: Arc<S>,
    unavailable: AtomicBool,
    fail_next: AtomicUsize,
    conflict_next: AtomicUsize,
}

impl<S: LeaseStore> FlakyStore<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            unavailable: AtomicBool::new(false),
            fail_next: AtomicUsize::new(0),
            conflict_next: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    /// Fail every operation with `Unavailable` until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next `n` operations with `Unavailable`
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Answer the next `n` writes with `Conflict` without touching the inner store
    pub fn conflict_next(&self, n: usize) {
        self.conflict_next.store(n, Ordering::SeqCst);
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) || Self::take(&self.fail_next) {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> StoreResult<()> {
        self.check()?;
        if Self::take(&self.conflict_next) {
            return Err(StoreError::Conflict);
        }
        Ok(())
    }
}

#[async_trait]
impl<S: LeaseStore> LeaseStore for FlakyStore<S> {
    async fn get(&self, lock_name: &LockName) -> StoreResult<Option<Lease>> {
        self.check()?;
        self.inner.get(lock_name).await
    }

    async fn create_if_absent(&self, lease: Lease, now: Timestamp) -> StoreResult<Lease> {
        self.check_write()?;
        self.inner.create_if_absent(lease, now).await
    }

    async fn compare_and_swap(
        &self,
        lock_name: &LockName,
        expected_version: u64,
        new_lease: Lease,
    ) -> StoreResult<Lease> {
        self.check_write()?;
        self.inner
            .compare_and_swap(lock_name, expected_version, new_lease)
            .await
    }

    async fn delete(&self, lock_name: &LockName, expected_version: u64) -> StoreResult<()> {
        self.check_write()?;
        self.inner.delete(lock_name, expected_version).await
    }

    async fn scan(&self) -> StoreResult<Vec<Lease>> {
        self.check()?;
        self.inner.scan().await
    }

    fn fencing_scope(&self) -> FencingScope {
        self.inner.fencing_scope()
    }
}
