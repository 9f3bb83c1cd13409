//! Configuration management for the Leasehold server
//!
//! Sources, lowest precedence first: the YAML file (`conf/application.yml` by
//! default), `LEASEHOLD_`-prefixed environment variables using `__` as the
//! key separator (`LEASEHOLD_LEASE__MIN_TTL_MS`), then command line flags.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use leasehold_common::LockError;
use leasehold_consistency::{FencingScope, LeaseConfig, TokenReservation};
use leasehold_core::{BackoffConfig, SweeperConfig};

use crate::startup::{LoggingConfig, StorePersistence};

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
pub const DEFAULT_METRICS_ADDRESS: &str = "0.0.0.0:9464";

/// Command line arguments for the server
#[derive(Debug, Default, Parser)]
#[command(name = "leasehold-server", version, about = "Lease-based distributed lock service")]
pub struct Cli {
    /// Configuration file; a missing default file is not an error
    #[arg(short = 'c', long = "config", env = "LEASEHOLD_CONFIG")]
    pub config: Option<PathBuf>,
    /// Store snapshot loaded at startup and written on shutdown
    #[arg(long = "snapshot")]
    pub snapshot: Option<String>,
    #[arg(long = "sweep-interval-ms")]
    pub sweep_interval_ms: Option<u64>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigurationError {
    #[error(transparent)]
    Source(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] LockError),
}

/// Application configuration loaded from the config file and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn new(cli: &Cli) -> Result<Self, ConfigurationError> {
        let (path, required) = match &cli.config {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        let builder = Config::builder().add_source(File::from(path).required(required));
        Self::build(builder, cli)
    }

    /// Load from an in-memory YAML document instead of a file
    pub fn from_yaml_str(yaml: &str, cli: &Cli) -> Result<Self, ConfigurationError> {
        let builder = Config::builder().add_source(File::from_str(yaml, FileFormat::Yaml));
        Self::build(builder, cli)
    }

    fn build(
        builder: ConfigBuilder<DefaultState>,
        cli: &Cli,
    ) -> Result<Self, ConfigurationError> {
        let mut builder = builder.add_source(
            Environment::with_prefix("LEASEHOLD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(path) = &cli.snapshot {
            builder = builder.set_override("store.snapshot_path", path.as_str())?;
        }
        if let Some(interval) = cli.sweep_interval_ms {
            builder = builder.set_override("sweeper.interval_ms", interval)?;
        }

        Ok(Configuration {
            config: builder.build()?,
        })
    }

    fn millis(&self, key: &str, default: u64) -> Duration {
        let value = self.config.get_int(key).map(|v| v.max(0) as u64);
        Duration::from_millis(value.unwrap_or(default))
    }

    // ========================================================================
    // Lease Configuration
    // ========================================================================

    pub fn min_ttl(&self) -> Duration {
        self.millis("lease.min_ttl_ms", 1_000)
    }

    pub fn max_ttl(&self) -> Duration {
        self.millis("lease.max_ttl_ms", 3_600_000)
    }

    pub fn max_renewals(&self) -> u32 {
        self.config
            .get_int("lease.max_renewals")
            .map(|v| v.clamp(0, u32::MAX as i64) as u32)
            .unwrap_or(0)
    }

    pub fn fencing_scope(&self) -> Result<FencingScope, LockError> {
        match self.config.get_string("lease.fencing_scope") {
            Ok(scope) => scope.parse().map_err(LockError::invalid_argument),
            Err(_) => Ok(FencingScope::default()),
        }
    }

    pub fn lease_config(&self) -> Result<LeaseConfig, LockError> {
        let config = LeaseConfig {
            min_ttl: self.min_ttl(),
            max_ttl: self.max_ttl(),
            max_renewals: self.max_renewals(),
            fencing_scope: self.fencing_scope()?,
        };
        config.validate()?;
        Ok(config)
    }

    // ========================================================================
    // Sweeper / Backoff Configuration
    // ========================================================================

    pub fn sweeper_config(&self) -> SweeperConfig {
        let defaults = SweeperConfig::default();
        SweeperConfig {
            interval: self.millis("sweeper.interval_ms", defaults.interval.as_millis() as u64),
            enabled: self
                .config
                .get_bool("sweeper.enabled")
                .unwrap_or(defaults.enabled),
        }
    }

    pub fn backoff_config(&self) -> BackoffConfig {
        let defaults = BackoffConfig::default();
        BackoffConfig {
            initial_delay: self.millis(
                "backoff.initial_delay_ms",
                defaults.initial_delay.as_millis() as u64,
            ),
            max_delay: self.millis("backoff.max_delay_ms", defaults.max_delay.as_millis() as u64),
            multiplier: self
                .config
                .get_float("backoff.multiplier")
                .unwrap_or(defaults.multiplier),
            jitter: self
                .config
                .get_float("backoff.jitter")
                .unwrap_or(defaults.jitter),
        }
    }

    // ========================================================================
    // Store / Metrics / Logging Configuration
    // ========================================================================

    /// Snapshot file, if persistence across restarts is configured
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.config
            .get_string("store.snapshot_path")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from)
    }

    /// Fencing tokens reserved per durable write
    pub fn token_block_size(&self) -> u64 {
        self.config
            .get_int("store.token_block_size")
            .map(|v| v.max(1) as u64)
            .unwrap_or(TokenReservation::DEFAULT_BLOCK_SIZE)
    }

    pub fn store_persistence(&self) -> Option<StorePersistence> {
        self.snapshot_path().map(|path| {
            StorePersistence::new(path).with_token_block_size(self.token_block_size())
        })
    }

    pub fn metrics_enabled(&self) -> bool {
        self.config.get_bool("metrics.enabled").unwrap_or(false)
    }

    pub fn metrics_listen_address(&self) -> Result<SocketAddr, LockError> {
        let address = self
            .config
            .get_string("metrics.listen_address")
            .unwrap_or_else(|_| DEFAULT_METRICS_ADDRESS.to_string());
        address.parse().map_err(|e| {
            LockError::invalid_argument(format!("metrics.listen_address '{}': {}", address, e))
        })
    }

    /// `logging.*` from the config file, overridden by `LEASEHOLD_LOG_*`
    pub fn logging_config(&self) -> LoggingConfig {
        let level = self
            .config
            .get_string("logging.level")
            .unwrap_or_else(|_| "info".to_string());
        let rotation = self.config.get_string("logging.rotation").ok();

        LoggingConfig::from_config(
            self.config.get_string("logging.dir").ok(),
            self.config.get_bool("logging.console").unwrap_or(true),
            self.config.get_bool("logging.file").unwrap_or(true),
            &level,
            rotation.as_deref(),
        )
        .with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Reject settings that would break the lease guarantees before anything
    /// starts
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let lease = self.lease_config()?;
        self.sweeper_config().validate(lease.min_ttl)?;
        self.backoff_config().validate()?;
        if self.metrics_enabled() {
            self.metrics_listen_address()?;
        }
        Ok(())
    }
}
