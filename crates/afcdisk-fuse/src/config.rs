//! Mount configuration.

use std::path::PathBuf;
use std::time::Duration;

use afcdisk_config::{Config, ConfigError};
use serde::{Deserialize, Serialize};

/// How a failed backend call is reported to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Every failure becomes `ENOENT`.
    #[default]
    Collapse,
    /// Map the status code to the closest errno.
    Errno,
}

impl ErrorPolicy {
    pub fn errno(self, status: &afcdisk_types::Status) -> i32 {
        match self {
            ErrorPolicy::Collapse => libc::ENOENT,
            ErrorPolicy::Errno => status.errno(),
        }
    }
}

/// Settings shared by every mount created by a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuseConfig {
    /// Directory under which `<volume>` mount points are created.
    #[serde(default = "default_mount_root")]
    pub mount_root: PathBuf,

    /// Pass `debug` to the driver. Always on in debug builds.
    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_true")]
    pub defer_permissions: bool,

    #[serde(default)]
    pub allow_other: bool,

    #[serde(default)]
    pub auto_unmount: bool,

    /// Attribute cache timeout handed to the kernel.
    #[serde(default = "default_timeout_ms")]
    pub attr_timeout_ms: u64,

    /// Entry (lookup) cache timeout handed to the kernel.
    #[serde(default = "default_timeout_ms")]
    pub entry_timeout_ms: u64,

    #[serde(default)]
    pub error_policy: ErrorPolicy,

    /// Force the loop to exit on SIGINT, SIGTERM and SIGHUP while a session
    /// runs.
    #[serde(default = "default_true")]
    pub handle_signals: bool,
}

fn default_mount_root() -> PathBuf {
    PathBuf::from("/Volumes")
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    1000
}

impl Default for FuseConfig {
    fn default() -> Self {
        Self {
            mount_root: default_mount_root(),
            debug: false,
            defer_permissions: true,
            allow_other: false,
            auto_unmount: false,
            attr_timeout_ms: default_timeout_ms(),
            entry_timeout_ms: default_timeout_ms(),
            error_policy: ErrorPolicy::default(),
            handle_signals: true,
        }
    }
}

impl FuseConfig {
    pub fn attr_timeout(&self) -> Duration {
        Duration::from_millis(self.attr_timeout_ms)
    }

    pub fn entry_timeout(&self) -> Duration {
        Duration::from_millis(self.entry_timeout_ms)
    }

    /// Whether the `debug` mount argument is passed.
    pub fn debug_enabled(&self) -> bool {
        self.debug || cfg!(debug_assertions)
    }
}

impl Config for FuseConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.mount_root.is_absolute() {
            return Err(ConfigError::invalid("mount_root", "must be an absolute path"));
        }
        Ok(())
    }
}
