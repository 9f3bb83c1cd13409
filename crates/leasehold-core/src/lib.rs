//! Leasehold Core - client-facing lock coordination
//!
//! This crate provides:
//! - `LockCoordinator`: blocking and non-blocking acquisition, scoped locking
//! - `KeepAlive`: background renewal of a held lease
//! - `ExpirySweeper`: periodic reclamation of expired leases
//! - `FenceValidator`: downstream rejection of stale fencing tokens

pub mod model;
pub mod service;

pub use model::*;
pub use service::backoff::BackoffConfig;
pub use service::cancel::CancelSignal;
pub use service::coordinator::{LockCoordinator, Scoped, ScopedOutcome};
pub use service::fence::{FenceRejection, FenceValidator};
pub use service::keep_alive::{KeepAlive, KeepAliveExit};
pub use service::sweeper::{ExpirySweeper, SweepReport, SweeperConfig};
