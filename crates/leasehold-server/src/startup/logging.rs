//! Multi-file logging
//!
//! Every event goes to the root file; component files receive only the events
//! whose `tracing` target matches their crate:
//!
//! | Log File          | Component                         | Target Prefixes         |
//! |-------------------|-----------------------------------|-------------------------|
//! | leasehold.log     | Root logger (all components)      | (all)                   |
//! | lease-store.log   | Lease store, counters, manager    | leasehold_consistency   |
//! | coordinator.log   | Coordinator, keep-alive, sweeper  | leasehold_core          |
//! | server.log        | Process host and request handler  | leasehold_server        |
//!
//! Log files are stored in `~/leasehold/logs` by default. Override with the
//! `LEASEHOLD_LOG_DIR` environment variable or `logging.dir` in the config file.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

pub const ROOT_LOG_FILE: &str = "leasehold.log";

struct ComponentLogDef {
    file_name: &'static str,
    targets: &'static [&'static str],
}

const COMPONENT_LOGS: &[ComponentLogDef] = &[
    ComponentLogDef {
        file_name: "lease-store.log",
        targets: &["leasehold_consistency"],
    },
    ComponentLogDef {
        file_name: "coordinator.log",
        targets: &["leasehold_core"],
    },
    ComponentLogDef {
        file_name: "server.log",
        targets: &["leasehold_server"],
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

impl FromStr for LogRotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(LogRotation::Daily),
            "hourly" => Ok(LogRotation::Hourly),
            "never" => Ok(LogRotation::Never),
            _ => Err(format!("Invalid log rotation: {}", s)),
        }
    }
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub console_output: bool,
    pub console_level: Level,
    pub file_logging: bool,
    pub file_level: Level,
    pub rotation: LogRotation,
}

fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{}/leasehold/logs", home))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            console_output: true,
            console_level: Level::INFO,
            file_logging: true,
            file_level: Level::INFO,
            rotation: LogRotation::Daily,
        }
    }
}

impl LoggingConfig {
    /// Defaults overridden by `LEASEHOLD_LOG_*` environment variables
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Build from the `logging.*` section of the configuration file
    pub fn from_config(
        log_dir: Option<String>,
        console_output: bool,
        file_logging: bool,
        level: &str,
        rotation: Option<&str>,
    ) -> Self {
        let level = level.parse().unwrap_or(Level::INFO);
        Self {
            log_dir: log_dir.map(PathBuf::from).unwrap_or_else(default_log_dir),
            console_output,
            console_level: level,
            file_logging,
            file_level: level,
            rotation: rotation
                .and_then(|r| r.parse().ok())
                .unwrap_or(LogRotation::Daily),
        }
    }

    /// Apply `LEASEHOLD_LOG_DIR`, `_CONSOLE`, `_FILE`, `_LEVEL`, `_FILE_LEVEL`
    /// and `_ROTATION` as returned by `lookup`. Unset variables keep the
    /// current value.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup("LEASEHOLD_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(console) = lookup("LEASEHOLD_LOG_CONSOLE") {
            self.console_output = parse_flag(&console);
        }
        if let Some(file) = lookup("LEASEHOLD_LOG_FILE") {
            self.file_logging = parse_flag(&file);
        }
        if let Some(level) = lookup("LEASEHOLD_LOG_LEVEL").and_then(|v| v.parse().ok()) {
            self.console_level = level;
            self.file_level = level;
        }
        if let Some(level) = lookup("LEASEHOLD_LOG_FILE_LEVEL").and_then(|v| v.parse().ok()) {
            self.file_level = level;
        }
        if let Some(rotation) = lookup("LEASEHOLD_LOG_ROTATION").and_then(|v| v.parse().ok()) {
            self.rotation = rotation;
        }
        self
    }
}

/// Keeps the non-blocking file writers alive. Dropping it flushes buffered
/// output, so hold it until the process exits.
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

/// Install the global subscriber: an optional console layer filtered by
/// `RUST_LOG` (falling back to the configured level), the root file, and one
/// file per component routed by target.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;
    }

    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.console_level.to_string()));
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(filter);
        layers.push(Box::new(console_layer));
    }

    if config.file_logging {
        let root_appender =
            RollingFileAppender::new(config.rotation.into(), &config.log_dir, ROOT_LOG_FILE);
        let (root_nb, root_guard) = tracing_appender::non_blocking(root_appender);
        guards.push(root_guard);

        let root_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.file_level.to_string()));
        let root_layer = fmt::layer()
            .with_writer(root_nb)
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_filter(root_filter);
        layers.push(Box::new(root_layer));

        let component_level: LevelFilter = config.file_level.into();
        for component in COMPONENT_LOGS {
            let appender = RollingFileAppender::new(
                config.rotation.into(),
                &config.log_dir,
                component.file_name,
            );
            let (nb, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);

            let mut targets = Targets::new();
            for target in component.targets {
                targets = targets.with_target(*target, component_level);
            }

            let layer = fmt::layer()
                .with_writer(nb)
                .with_target(true)
                .with_thread_names(true)
                .with_ansi(false)
                .with_filter(targets);
            layers.push(Box::new(layer));
        }
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    if config.file_logging {
        tracing::info!(
            log_dir = %config.log_dir.display(),
            component_files = COMPONENT_LOGS.len(),
            "File logging initialized"
        );
    }

    Ok(LoggingGuard {
        _file_guards: guards,
    })
}
