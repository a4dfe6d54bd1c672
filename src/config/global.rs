//! User-level configuration file (`<base>/config.toml`).
//!
//! Every field is optional; a missing file or missing keys fall back to defaults.
//!
//! ```toml
//! # Parallel fetches (default: max(4, 2 × cores))
//! max_parallel = 8
//!
//! # argv prefix used for non-cargo build commands; the command is appended
//! build_shell = ["nu", "--no-history", "--no-config-file", "--commands"]
//!
//! # How bin entries are placed into <home>/bin: "symlink" or "copy"
//! bin_mode = "symlink"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// How bin entries are placed into the managed `bin/` directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinMode {
    #[default]
    Symlink,
    Copy,
}

fn default_build_shell() -> Vec<String> {
    ["nu", "--no-history", "--no-config-file", "--commands"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn is_default_build_shell(shell: &Vec<String>) -> bool {
    *shell == default_build_shell()
}

/// Settings read from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Upper bound on concurrent fetches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,

    /// argv prefix for build commands; must not be empty
    #[serde(default = "default_build_shell", skip_serializing_if = "is_default_build_shell")]
    pub build_shell: Vec<String>,

    #[serde(default)]
    pub bin_mode: BinMode,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            max_parallel: None,
            build_shell: default_build_shell(),
            bin_mode: BinMode::default(),
        }
    }
}

impl GlobalConfig {
    /// Loads the config at `path`, or defaults when the file does not exist.
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load_from(path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Loads and validates the config at `path`.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        if config.build_shell.is_empty() {
            anyhow::bail!("Invalid config {}: build_shell must not be empty", path.display());
        }
        if config.max_parallel == Some(0) {
            anyhow::bail!("Invalid config {}: max_parallel must be at least 1", path.display());
        }
        Ok(config)
    }

    /// Writes the config to `path` as TOML.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Effective fetch parallelism.
    #[must_use]
    pub fn max_parallel(&self) -> usize {
        self.max_parallel.unwrap_or_else(crate::constants::default_max_parallel)
    }
}
