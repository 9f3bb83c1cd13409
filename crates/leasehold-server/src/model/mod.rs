//! Server models

pub mod config;

pub use config::{Cli, Configuration, ConfigurationError};
