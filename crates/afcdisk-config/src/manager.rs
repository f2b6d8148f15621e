use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::{Config, ConfigError};

/// Holds the current configuration and swaps it atomically on reload.
pub struct ConfigManager<T: Config> {
    config: ArcSwap<T>,
    path: Option<PathBuf>,
}

impl<T: Config> ConfigManager<T> {
    pub fn new(config: T) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            path: None,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = Self::read(path)?;
        Ok(Self {
            config: ArcSwap::from_pointee(config),
            path: Some(path.to_path_buf()),
        })
    }

    /// Load `path` if it exists, otherwise start from `T::default()`.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError>
    where
        T: Default,
    {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::new(T::default()))
        }
    }

    pub fn get(&self) -> Arc<T> {
        self.config.load_full()
    }

    pub fn update(&self, new_config: T) -> Result<(), ConfigError> {
        new_config.validate()?;
        self.config.store(Arc::new(new_config));
        Ok(())
    }

    /// Re-read the file the manager was loaded from. A no-op for managers
    /// built with [`ConfigManager::new`].
    pub fn reload(&self) -> Result<(), ConfigError> {
        if let Some(ref path) = self.path {
            let new_config = Self::read(path)?;
            self.config.store(Arc::new(new_config));
            tracing::info!("Config reloaded from {:?}", path);
        }
        Ok(())
    }

    fn read(path: &Path) -> Result<T, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        T::from_toml_str(&content)
    }
}
