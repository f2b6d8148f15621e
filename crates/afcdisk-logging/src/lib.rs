use std::path::PathBuf;

use afcdisk_config::{Config, ConfigError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use tracing::{debug, error, info, instrument, trace, warn};
pub use tracing_appender::non_blocking::WorkerGuard;

/// How often the file log rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

impl From<Rotation> for rolling::Rotation {
    fn from(r: Rotation) -> Self {
        match r {
            Rotation::Hourly => rolling::Rotation::HOURLY,
            Rotation::Daily => rolling::Rotation::DAILY,
            Rotation::Never => rolling::Rotation::NEVER,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or
    /// `afcdisk_fuse=debug,info`.
    #[serde(default = "default_level")]
    pub level: String,

    /// Directory for log files. No file logging when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default = "default_prefix")]
    pub file_prefix: String,

    #[serde(default)]
    pub rotation: Rotation,

    #[serde(default)]
    pub json_format: bool,

    /// Mirror records to stderr.
    #[serde(default = "default_true")]
    pub console_output: bool,
}

fn default_level() -> String {
    "info".into()
}

fn default_prefix() -> String {
    "afcdisk".into()
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_level(),
            log_dir: None,
            file_prefix: default_prefix(),
            rotation: Rotation::default(),
            json_format: false,
            console_output: true,
        }
    }
}

impl Config for LogConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        EnvFilter::try_new(&self.level)
            .map(|_| ())
            .map_err(|e| ConfigError::invalid("level", e.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to create log file appender: {0}")]
    Appender(#[from] rolling::InitError),

    #[error("failed to install subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

type BoxedLayer<S> = Box<dyn tracing_subscriber::Layer<S> + Send + Sync>;

/// Install the global subscriber. Call once at startup.
///
/// The returned guard flushes the non-blocking file writer on drop, so the
/// caller keeps it alive for the life of the process.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, LogError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(env_filter);

    let console_layer: Option<BoxedLayer<_>> = match (config.console_output, config.json_format) {
        (false, _) => None,
        (true, true) => Some(Box::new(fmt::layer().json().with_writer(std::io::stderr))),
        (true, false) => Some(Box::new(fmt::layer().with_writer(std::io::stderr))),
    };

    let (file_layer, guard): (Option<BoxedLayer<_>>, Option<WorkerGuard>) =
        match config.log_dir {
            Some(ref log_dir) => {
                let file_appender = rolling::RollingFileAppender::builder()
                    .rotation(config.rotation.into())
                    .filename_prefix(&config.file_prefix)
                    .filename_suffix("log")
                    .build(log_dir)?;

                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                let layer: BoxedLayer<_> = if config.json_format {
                    Box::new(fmt::layer().json().with_ansi(false).with_writer(non_blocking))
                } else {
                    Box::new(fmt::layer().with_ansi(false).with_writer(non_blocking))
                };
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

    registry.with(console_layer).with(file_layer).try_init()?;
    debug!(level = %config.level, log_dir = ?config.log_dir, "logging initialised");

    Ok(guard)
}
