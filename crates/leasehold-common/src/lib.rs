//! Leasehold Common - Shared types, errors, and utilities
//!
//! This crate provides the foundational types used across all Leasehold components:
//! - Error taxonomy surfaced to lock clients
//! - Identifier newtypes (`LockName`, `HolderId`, `FencingToken`)
//! - Clock abstraction used for lease expiry decisions

pub mod clock;
pub mod error;
pub mod types;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock, current_timestamp};
pub use error::{LockError, Result};
pub use types::{FencingToken, HolderId, LockName, Timestamp};

/// Maximum length in bytes of a lock name or holder id
pub const MAX_IDENTIFIER_LEN: usize = 512;

/// Default lease time-to-live in milliseconds
pub const DEFAULT_TTL_MS: u64 = 30_000;
