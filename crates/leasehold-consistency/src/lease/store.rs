//! Lease Store: linearizable mapping from lock name to lease
//!
//! The store is the only component that performs compare-and-swap style
//! updates. Every primitive either takes effect atomically or reports an
//! error; callers never observe a partial write.

use std::collections::HashMap;

use async_trait::async_trait;
use leasehold_common::{FencingToken, LockName, Timestamp};
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::fencing::{FencingCounter, TokenReservation};
use super::model::{FencingScope, Lease};
use super::snapshot::{SNAPSHOT_FORMAT_VERSION, SnapshotError, StoreSnapshot};

/// Store-level failures
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Lost an optimistic-concurrency race. Re-read before retrying.
    #[error("version conflict")]
    Conflict,

    /// Storage unreachable. Always retryable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Stored data violates an invariant
    #[error("store corrupted: {0}")]
    Corrupted(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Capability interface satisfied by any linearizable backend
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Read the lease stored under `lock_name`
    async fn get(&self, lock_name: &LockName) -> StoreResult<Option<Lease>>;

    /// Store `lease` unless a lease that is live at `now` exists.
    ///
    /// Fails with [`StoreError::Conflict`] when the existing holder wins, or
    /// when `lease.token` is not greater than every token already granted
    /// under this name in the store's fencing scope. Token order and grant
    /// order therefore agree even when tokens are allocated before the call.
    /// Returns the committed lease with its store-assigned version.
    async fn create_if_absent(&self, lease: Lease, now: Timestamp) -> StoreResult<Lease>;

    /// Replace the lease stored under `lock_name` if its version is
    /// `expected_version`. The committed lease gets a newer version.
    async fn compare_and_swap(
        &self,
        lock_name: &LockName,
        expected_version: u64,
        new_lease: Lease,
    ) -> StoreResult<Lease>;

    /// Remove the lease stored under `lock_name` if its version is
    /// `expected_version`
    async fn delete(&self, lock_name: &LockName, expected_version: u64) -> StoreResult<()>;

    /// Enumerate every stored lease, live or expired
    async fn scan(&self) -> StoreResult<Vec<Lease>>;

    /// Scope in which `create_if_absent` orders tokens
    fn fencing_scope(&self) -> FencingScope;
}

#[derive(Debug, Default, Clone, Copy)]
struct LockMarks {
    issued: u64,
    retired: u64,
}

enum Issue {
    Token(FencingToken),
    /// The candidate token lies past the reserved block
    Reserve(u64),
}

#[derive(Debug, Default)]
struct StoreState {
    leases: HashMap<LockName, Lease>,
    /// Store-wide version counter; every mutation takes the next value
    version: u64,
    /// Highest token issued in either scope
    global_token: u64,
    /// Highest token of any lease removed from the store
    retired_token: u64,
    /// Only populated under `FencingScope::PerLock`
    lock_marks: HashMap<LockName, LockMarks>,
    /// Every sequence resumes above this after a restore or recovery
    token_floor: u64,
    /// Highest token that may be issued before another block is reserved
    reserved_through: Option<u64>,
    /// The persisted reservation has been folded into `token_floor`
    reservation_loaded: bool,
}

impl StoreState {
    fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Highest token granted so far under `lock_name`, live or retired
    fn granted_mark(&self, scope: FencingScope, lock_name: &LockName) -> u64 {
        let retired = match scope {
            FencingScope::Global => self.retired_token,
            FencingScope::PerLock => self.lock_marks.get(lock_name).map_or(0, |m| m.retired),
        };
        let current = self.leases.get(lock_name).map_or(0, |l| l.token.value());
        retired.max(current).max(self.token_floor)
    }

    fn retire(&mut self, scope: FencingScope, lease: &Lease) {
        let token = lease.token.value();
        match scope {
            FencingScope::Global => self.retired_token = self.retired_token.max(token),
            FencingScope::PerLock => {
                let marks = self.lock_marks.entry(lease.lock_name.clone()).or_default();
                marks.retired = marks.retired.max(token);
            }
        }
    }

    fn issue(&mut self, scope: FencingScope, lock_name: &LockName) -> StoreResult<Issue> {
        let last = match scope {
            FencingScope::Global => self.global_token,
            FencingScope::PerLock => self.lock_marks.get(lock_name).map_or(0, |m| m.issued),
        };
        let token = last
            .max(self.token_floor)
            .checked_add(1)
            .ok_or_else(|| StoreError::Corrupted("fencing token space exhausted".to_string()))?;

        if let Some(limit) = self.reserved_through
            && token > limit
        {
            return Ok(Issue::Reserve(token));
        }

        if scope == FencingScope::PerLock {
            self.lock_marks.entry(lock_name.clone()).or_default().issued = token;
        }
        self.global_token = self.global_token.max(token);
        Ok(Issue::Token(FencingToken::new(token)))
    }

    fn raise_token_floor(&mut self, floor: u64) {
        self.token_floor = self.token_floor.max(floor);
        self.global_token = self.global_token.max(floor);
        self.retired_token = self.retired_token.max(floor);
    }
}

/// Embedded lease store guarded by a single mutex.
///
/// Also implements [`FencingCounter`] with the counter kept inside the same
/// state, so a snapshot always carries the token high-water mark together
/// with the leases it was issued to. With a [`TokenReservation`] attached the
/// counter is durable on its own, independent of snapshots.
#[derive(Debug)]
pub struct MemoryLeaseStore {
    state: Mutex<StoreState>,
    fencing_scope: FencingScope,
    reservation: Option<TokenReservation>,
    /// Serializes reservation writes
    reserving: tokio::sync::Mutex<()>,
}

impl Default for MemoryLeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::with_fencing_scope(FencingScope::Global)
    }

    pub fn with_fencing_scope(fencing_scope: FencingScope) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            fencing_scope,
            reservation: None,
            reserving: tokio::sync::Mutex::new(()),
        }
    }

    /// Issue tokens only from blocks persisted through `reservation`
    pub fn with_token_reservation(mut self, reservation: TokenReservation) -> Self {
        self.state.get_mut().reserved_through = Some(0);
        self.reservation = Some(reservation);
        self
    }

    pub fn token_reservation(&self) -> Option<&TokenReservation> {
        self.reservation.as_ref()
    }

    /// Number of stored leases, live or expired
    pub fn len(&self) -> usize {
        self.state.lock().leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capture the complete store state
    pub fn snapshot(&self, now: Timestamp) -> StoreSnapshot {
        let state = self.state.lock();
        let mut leases: Vec<Lease> = state.leases.values().cloned().collect();
        leases.sort_by(|a, b| a.lock_name.cmp(&b.lock_name));

        StoreSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            taken_at: now,
            fencing_scope: self.fencing_scope,
            leases,
            version: state.version,
            global_token: state.global_token,
        }
    }

    /// Replace the stored leases with those in `snapshot`.
    ///
    /// Counters never move backwards: the version counter and every token
    /// sequence resume above both the current state and anything the
    /// snapshot or its leases carry.
    pub fn restore(&self, snapshot: StoreSnapshot) -> StoreResult<()> {
        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(StoreError::Corrupted(format!(
                "unsupported snapshot format {}",
                snapshot.format_version
            )));
        }

        let mut leases = HashMap::with_capacity(snapshot.leases.len());
        let mut version = snapshot.version;
        let mut floor = snapshot.global_token;
        for lease in snapshot.leases {
            if leases.contains_key(&lease.lock_name) {
                return Err(StoreError::Corrupted(format!(
                    "duplicate lease for '{}' in snapshot",
                    lease.lock_name
                )));
            }
            version = version.max(lease.version);
            floor = floor.max(lease.token.value());
            leases.insert(lease.lock_name.clone(), lease);
        }

        let count = leases.len();
        let mut state = self.state.lock();
        let floor = floor.max(state.global_token).max(state.token_floor);
        let mut restored = StoreState {
            leases,
            version: version.max(state.version),
            reserved_through: state.reserved_through,
            reservation_loaded: state.reservation_loaded,
            ..Default::default()
        };
        restored.raise_token_floor(floor);
        *state = restored;
        debug!(leases = count, token_floor = floor, "Lease store restored from snapshot");
        Ok(())
    }

    /// Resume token issuance above the durably reserved bound.
    ///
    /// Returns the bound read back, or 0 without a reservation. Issuing or
    /// trimming performs this step first if it has not run yet.
    pub async fn recover_token_reservation(&self) -> Result<u64, SnapshotError> {
        let Some(reservation) = &self.reservation else {
            return Ok(0);
        };
        let _reserving = self.reserving.lock().await;
        self.load_reservation(reservation).await
    }

    /// Caller holds `reserving`
    async fn load_reservation(&self, reservation: &TokenReservation) -> Result<u64, SnapshotError> {
        let reserved = reservation.load().await?;
        let mut state = self.state.lock();
        state.raise_token_floor(reserved);
        state.reservation_loaded = true;
        Ok(reserved)
    }

    /// Shrink the durable reservation to the highest token issued so far, so
    /// a clean restart continues the sequence without skipping a block.
    pub async fn trim_token_reservation(&self) -> Result<u64, SnapshotError> {
        let Some(reservation) = &self.reservation else {
            return Ok(0);
        };
        let _reserving = self.reserving.lock().await;
        let loaded = self.state.lock().reservation_loaded;
        if !loaded {
            self.load_reservation(reservation).await?;
        }

        // Stop issuing past the new bound before it reaches disk
        let issued = {
            let mut state = self.state.lock();
            state.reserved_through = Some(state.global_token);
            state.global_token
        };
        reservation.persist(issued).await?;
        debug!(reserved_through = issued, "Fencing token reservation trimmed");
        Ok(issued)
    }

    /// Make `token` issuable. The caller recomputes its candidate afterwards,
    /// since loading the reservation may have raised the floor.
    async fn reserve_through(&self, token: u64) -> StoreResult<()> {
        let Some(reservation) = &self.reservation else {
            return Err(StoreError::Corrupted(
                "token block requested without a reservation".to_string(),
            ));
        };
        let unavailable = |e: SnapshotError| StoreError::Unavailable(e.to_string());
        let _reserving = self.reserving.lock().await;

        let (loaded, reserved_through) = {
            let state = self.state.lock();
            (state.reservation_loaded, state.reserved_through)
        };
        if !loaded {
            self.load_reservation(reservation).await.map_err(unavailable)?;
            return Ok(());
        }
        if reserved_through.is_none_or(|limit| limit >= token) {
            return Ok(());
        }

        let limit = token.saturating_add(reservation.block_size() - 1);
        reservation.persist(limit).await.map_err(unavailable)?;

        let mut state = self.state.lock();
        state.reserved_through = Some(state.reserved_through.map_or(limit, |cur| cur.max(limit)));
        debug!(reserved_through = limit, "Fencing token block reserved");
        Ok(())
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn get(&self, lock_name: &LockName) -> StoreResult<Option<Lease>> {
        Ok(self.state.lock().leases.get(lock_name).cloned())
    }

    async fn create_if_absent(&self, mut lease: Lease, now: Timestamp) -> StoreResult<Lease> {
        let mut state = self.state.lock();

        if let Some(existing) = state.leases.get(&lease.lock_name)
            && !existing.is_expired(now)
        {
            trace!(lock = %lease.lock_name, holder = %existing.holder_id, "Create rejected: lease is live");
            return Err(StoreError::Conflict);
        }

        let granted = state.granted_mark(self.fencing_scope, &lease.lock_name);
        if lease.token.value() <= granted {
            debug!(
                lock = %lease.lock_name,
                holder = %lease.holder_id,
                token = %lease.token,
                granted,
                "Create rejected: token is not newer than an earlier grant"
            );
            return Err(StoreError::Conflict);
        }

        lease.version = state.next_version();
        state.leases.insert(lease.lock_name.clone(), lease.clone());
        Ok(lease)
    }

    async fn compare_and_swap(
        &self,
        lock_name: &LockName,
        expected_version: u64,
        mut new_lease: Lease,
    ) -> StoreResult<Lease> {
        if &new_lease.lock_name != lock_name {
            return Err(StoreError::Corrupted(format!(
                "lease for '{}' written under '{}'",
                new_lease.lock_name, lock_name
            )));
        }

        let mut state = self.state.lock();
        match state.leases.get(lock_name) {
            Some(current) if current.version == expected_version => {}
            _ => return Err(StoreError::Conflict),
        }

        new_lease.version = state.next_version();
        state.leases.insert(lock_name.clone(), new_lease.clone());
        Ok(new_lease)
    }

    async fn delete(&self, lock_name: &LockName, expected_version: u64) -> StoreResult<()> {
        let mut state = self.state.lock();
        match state.leases.get(lock_name) {
            Some(current) if current.version == expected_version => {}
            _ => return Err(StoreError::Conflict),
        }

        if let Some(removed) = state.leases.remove(lock_name) {
            state.retire(self.fencing_scope, &removed);
        }
        // Deletion is a mutation too; the next grant must not reuse this version
        state.next_version();
        Ok(())
    }

    async fn scan(&self) -> StoreResult<Vec<Lease>> {
        Ok(self.state.lock().leases.values().cloned().collect())
    }

    fn fencing_scope(&self) -> FencingScope {
        self.fencing_scope
    }
}

#[async_trait]
impl FencingCounter for MemoryLeaseStore {
    async fn next_token(&self, lock_name: &LockName) -> StoreResult<FencingToken> {
        loop {
            let issue = self.state.lock().issue(self.fencing_scope, lock_name)?;
            match issue {
                Issue::Token(token) => return Ok(token),
                Issue::Reserve(token) => self.reserve_through(token).await?,
            }
        }
    }

    fn scope(&self) -> FencingScope {
        self.fencing_scope
    }
}
