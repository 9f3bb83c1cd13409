//! Leases and the components that manage them
//!
//! - [`model`]: lease records and operation outcomes
//! - [`store`]: the linearizable store capability and its embedded implementation
//! - [`fencing`]: fencing-token counters
//! - [`manager`]: lock semantics over the store
//! - [`snapshot`]: persistence of the embedded store

mod fencing;
mod manager;
mod model;
mod snapshot;
mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use fencing::*;
pub use manager::*;
pub use model::*;
pub use snapshot::*;
pub use store::*;
