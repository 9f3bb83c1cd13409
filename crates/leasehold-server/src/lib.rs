// Main library module for the Leasehold lock service host
// The binary in main.rs wires these together; tests drive them directly.

pub mod metrics; // Metrics descriptions and Prometheus exporter
pub mod model; // Configuration
pub mod service; // Request handling
pub mod startup; // Logging, shutdown and service assembly

pub use model::{Cli, Configuration};
pub use service::LockOperationHandler;
pub use startup::{LockServer, StorePersistence};
