//! Fencing token allocation
//!
//! Tokens are strictly increasing within their scope and never reissued,
//! including across restarts when backed by a durable counter.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use leasehold_common::{FencingToken, LockName};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::model::FencingScope;
use super::snapshot::{SnapshotError, read_optional, write_durably};
use super::store::{StoreError, StoreResult};

/// Strictly increasing token source
#[async_trait]
pub trait FencingCounter: Send + Sync {
    /// Allocate the next token for `lock_name`
    async fn next_token(&self, lock_name: &LockName) -> StoreResult<FencingToken>;

    fn scope(&self) -> FencingScope;
}

/// Process-local counter.
///
/// Only suitable when the counter lives as long as the store it fences, or
/// when started from a floor at least as high as any token already issued.
#[derive(Debug, Default)]
pub struct LocalFencingCounter {
    scope: FencingScope,
    global: AtomicU64,
    per_lock: DashMap<LockName, u64>,
}

impl LocalFencingCounter {
    pub fn new(scope: FencingScope) -> Self {
        Self::with_floor(scope, 0)
    }

    /// Start every sequence above `floor`
    pub fn with_floor(scope: FencingScope, floor: u64) -> Self {
        Self {
            scope,
            global: AtomicU64::new(floor),
            per_lock: DashMap::new(),
        }
    }

    fn floor(&self) -> u64 {
        self.global.load(Ordering::Acquire)
    }
}

#[async_trait]
impl FencingCounter for LocalFencingCounter {
    async fn next_token(&self, lock_name: &LockName) -> StoreResult<FencingToken> {
        match self.scope {
            FencingScope::Global => self
                .global
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_add(1))
                .map(|prev| FencingToken::new(prev + 1))
                .map_err(|_| StoreError::Corrupted("fencing token space exhausted".to_string())),
            FencingScope::PerLock => {
                let floor = self.floor();
                let mut entry = self.per_lock.entry(lock_name.clone()).or_insert(floor);
                *entry = entry.checked_add(1).ok_or_else(|| {
                    StoreError::Corrupted("fencing token space exhausted".to_string())
                })?;
                Ok(FencingToken::new(*entry))
            }
        }
    }

    fn scope(&self) -> FencingScope {
        self.scope
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReservationRecord {
    reserved_through: u64,
}

/// Durable upper bound on issued fencing tokens.
///
/// Tokens are handed out in blocks. The end of a block is synced to disk
/// before any token inside it is issued, so a store that crashes and restarts
/// from an older snapshot still resumes above every token it handed out.
#[derive(Debug, Clone)]
pub struct TokenReservation {
    path: PathBuf,
    block_size: u64,
}

impl TokenReservation {
    pub const DEFAULT_BLOCK_SIZE: u64 = 1000;

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_size: Self::DEFAULT_BLOCK_SIZE,
        }
    }

    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// The last persisted bound, or 0 when nothing was ever reserved
    pub async fn load(&self) -> Result<u64, SnapshotError> {
        let Some(bytes) = read_optional(&self.path).await? else {
            return Ok(0);
        };
        let record: ReservationRecord = serde_json::from_slice(&bytes)?;
        info!(
            path = %self.path.display(),
            reserved_through = record.reserved_through,
            "Fencing token reservation loaded"
        );
        Ok(record.reserved_through)
    }

    pub async fn persist(&self, reserved_through: u64) -> Result<(), SnapshotError> {
        let bytes = serde_json::to_vec(&ReservationRecord { reserved_through })?;
        write_durably(&self.path, &bytes).await
    }
}
