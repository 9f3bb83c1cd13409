//! Leasehold API - request/response models
//!
//! This crate provides the transport-neutral models for the lock operations:
//! - Acquire, Renew, Release and Inspect request/response pairs
//! - The status vocabulary shared by every response
//!
//! JSON field names are camelCase.

pub mod lock;

pub use lock::*;
