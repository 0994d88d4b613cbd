use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::BaseDirs;

use crate::catalog::VersionCatalog;
use crate::deriver::{CommandDeriver, DEFAULT_DERIVE_COMMAND};
use crate::error::ImageStoreError;

pub const VERSIONS_ENV: &str = "RHCOS_VERSIONS";
pub const DATA_DIR_ENV: &str = "IMAGE_STORE_DATA_DIR";
pub const DERIVE_COMMAND_ENV: &str = "IMAGE_STORE_DERIVE_COMMAND";

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: Utf8PathBuf,
    /// JSON catalog override; `None` selects the built-in table.
    pub versions: Option<String>,
    pub derive_command: String,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            versions: None,
            derive_command: DEFAULT_DERIVE_COMMAND.to_string(),
        }
    }

    pub fn catalog(&self) -> Result<VersionCatalog, ImageStoreError> {
        match &self.versions {
            Some(content) => VersionCatalog::from_json(content),
            None => Ok(VersionCatalog::builtin()),
        }
    }

    pub fn deriver(&self) -> Result<CommandDeriver, ImageStoreError> {
        CommandDeriver::from_command_line(&self.derive_command)
            .map_err(|err| ImageStoreError::Config(format!("invalid derive command: {err}")))
    }
}

/// Values supplied on the command line. Each one wins over its environment
/// variable.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_dir: Option<String>,
    pub versions: Option<String>,
    pub versions_file: Option<String>,
    pub derive_command: Option<String>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(overrides: ConfigOverrides) -> Result<StoreConfig, ImageStoreError> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    pub fn resolve_with<E>(overrides: ConfigOverrides, env: E) -> Result<StoreConfig, ImageStoreError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let data_dir = match overrides.data_dir.or_else(|| lookup(DATA_DIR_ENV)) {
            Some(dir) => Utf8PathBuf::from(dir),
            None => default_data_dir()?,
        };

        let versions = match (overrides.versions, overrides.versions_file) {
            (Some(content), _) => Some(content),
            (None, Some(path)) => {
                let path = PathBuf::from(path);
                Some(
                    fs::read_to_string(&path)
                        .map_err(|_| ImageStoreError::ConfigRead(path.clone()))?,
                )
            }
            (None, None) => lookup(VERSIONS_ENV),
        };

        let derive_command = overrides
            .derive_command
            .or_else(|| lookup(DERIVE_COMMAND_ENV))
            .unwrap_or_else(|| DEFAULT_DERIVE_COMMAND.to_string());

        Ok(StoreConfig {
            data_dir,
            versions,
            derive_command,
        })
    }
}

pub fn default_data_dir() -> Result<Utf8PathBuf, ImageStoreError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("base-image-store")).ok()
        })
        .ok_or_else(|| ImageStoreError::Filesystem("unable to resolve data directory".to_string()))
}
