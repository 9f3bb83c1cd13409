pub mod backoff;
pub mod cancel;
pub mod coordinator;
pub mod fence;
pub mod keep_alive;
pub mod sweeper;
