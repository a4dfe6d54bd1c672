//! Configuration and well-known locations
//!
//! numng keeps all of its state under one base directory:
//!
//! ```text
//! ~/.local/share/nushell/numng/     (NUMNG_HOME)
//! ├── config.toml                   optional settings, see GlobalConfig
//! ├── store/                        content store (NUMNG_STORE_DIR)
//! └── nu_config_nupm_home/          managed home used by `--nu-config`
//! ```
//!
//! The nushell configuration directory (`~/.config/nushell/numng`, or
//! `NUMNG_CONFIG_DIR`) holds the `--nu-config` package file and load script.

mod global;

pub use global::{BinMode, GlobalConfig};

use crate::constants::PACKAGE_FILE_NAME;
use crate::core::NumngError;
use crate::utils::platform::resolve_path;
use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};

/// Environment variable overriding the base directory.
pub const ENV_HOME: &str = "NUMNG_HOME";
/// Environment variable overriding the store directory.
pub const ENV_STORE_DIR: &str = "NUMNG_STORE_DIR";
/// Environment variable overriding the nushell config directory.
pub const ENV_CONFIG_DIR: &str = "NUMNG_CONFIG_DIR";

/// Resolved locations numng reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumngPaths {
    pub base_dir: PathBuf,
    pub store_dir: PathBuf,
    pub nu_config_dir: PathBuf,
}

impl NumngPaths {
    /// Resolves the locations from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves the locations using `lookup` for environment variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_dir = match lookup(ENV_HOME) {
            Some(dir) => resolve_path(&dir)?,
            None => dirs::data_dir()
                .context("Unable to determine data directory")?
                .join("nushell")
                .join("numng"),
        };
        let store_dir = match lookup(ENV_STORE_DIR) {
            Some(dir) => resolve_path(&dir)?,
            None => base_dir.join("store"),
        };
        let nu_config_dir = match lookup(ENV_CONFIG_DIR) {
            Some(dir) => resolve_path(&dir)?,
            None => dirs::config_dir()
                .context("Unable to determine config directory")?
                .join("nushell")
                .join("numng"),
        };
        Ok(Self {
            base_dir,
            store_dir,
            nu_config_dir,
        })
    }

    /// Locations rooted in a single directory.
    #[must_use]
    pub fn under(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            store_dir: base_dir.join("store"),
            nu_config_dir: base_dir.join("nu_config"),
        }
    }

    /// `<base>/config.toml`
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }

    /// Package file used by `--nu-config`.
    #[must_use]
    pub fn nu_config_package_file(&self) -> PathBuf {
        self.nu_config_dir.join(PACKAGE_FILE_NAME)
    }

    /// Load script written by `--nu-config`.
    #[must_use]
    pub fn nu_config_script_file(&self) -> PathBuf {
        self.nu_config_dir.join("load_script.nu")
    }

    /// Managed home used by `--nu-config`.
    #[must_use]
    pub fn nu_config_home(&self) -> PathBuf {
        self.base_dir.join("nu_config_nupm_home")
    }
}

/// Refuses managed homes with fewer than three normal path components.
///
/// numng creates and prunes entries inside the home, so `/`, `/home` or
/// `/home/user` are never acceptable.
pub fn validate_managed_home(path: &Path) -> Result<(), NumngError> {
    let depth = path.components().filter(|c| matches!(c, Component::Normal(_))).count();
    if depth > 2 {
        Ok(())
    } else {
        Err(NumngError::NupmHomeTooShallow {
            path: path.to_path_buf(),
        })
    }
}
