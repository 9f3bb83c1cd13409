//! Application startup utilities

pub mod app;
pub mod logging;
pub mod shutdown;

pub use app::{LockServer, StorePersistence};
pub use logging::{LogRotation, LoggingConfig, LoggingGuard, init_logging};
pub use shutdown::{ShutdownSignal, wait_for_shutdown_signal};
