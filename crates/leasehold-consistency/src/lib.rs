//! Leasehold Consistency - lease records, storage and issuance
//!
//! This crate provides:
//! - The lease data model and operation outcomes
//! - The `LeaseStore` capability with an embedded mutex-guarded implementation
//! - Fencing-token counters (global or per-lock)
//! - The `LeaseManager`, which enforces mutual exclusion on top of the store

pub mod lease;

pub use lease::{
    AcquireOutcome, Denial, DenyReason, FencingCounter, FencingScope, Lease, LeaseConfig,
    LeaseManager, LeaseQuery, LeaseStore, LocalFencingCounter, LockStats, MemoryLeaseStore,
    ReclaimOutcome, ReleaseOutcome, RenewOutcome, SnapshotError, StoreError, StoreResult,
    StoreSnapshot, TokenReservation,
};
