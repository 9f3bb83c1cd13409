//! Request handling

pub mod lock_handler;

pub use lock_handler::LockOperationHandler;
