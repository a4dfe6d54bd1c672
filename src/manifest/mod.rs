//! Package declarations and the format adapters that produce them.
//!
//! Every package numng deals with (the root package file, registry entries,
//! in-package metadata of fetched packages) is normalized into one
//! [`PackageDeclaration`]. Three source formats are understood:
//!
//! - **numng** ([`numng`]): the native JSON format, parsed strictly
//! - **nupm** ([`nupm`]): registry records and `nupm.nuon` package metadata
//! - **packer** ([`packer`]): `meta.nuon` of packer.nu packages
//!
//! When the format is not known up front, [`detect`] picks the adapter from the
//! keys present in the raw value.
//!
//! # Root Package File
//!
//! ```json
//! {
//!   "name": "my-config",
//!   "allow_build_commands": false,
//!   "registry": {"source_uri": "https://github.com/nushell/nupm", "package_format": "nupm"},
//!   "depends": [
//!     "nu-git-manager",
//!     {"name": "webserver", "version": "^0.3"},
//!     {"name": "tools", "source_uri": "https://example.com/tools", "git_ref": "v1.2.0"}
//!   ],
//!   "linkin": {"vendor/lib": {"source_uri": "https://example.com/lib"}},
//!   "shell_config": {"use_all": ["mod.nu"]}
//! }
//! ```
//!
//! Declarations are immutable once normalized; registry filling produces new
//! values through [`PackageDeclaration::fill_missing`].

pub mod detect;
pub mod identity;
pub mod nuon;
pub mod numng;
pub mod nupm;
pub mod packer;

pub use detect::detect_format;
pub use identity::SourceIdentity;

use crate::constants::{
    DEFAULT_GIT_REF, NUPM_METADATA_FILE, PACKAGE_FILE_NAME, PACKER_METADATA_FILE,
};
use crate::core::NumngError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Where a package's contents come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    Git,
}

impl SourceType {
    /// Parses a `source_type` value.
    pub fn parse(text: &str, package: Option<&str>) -> Result<Self, NumngError> {
        match text.to_lowercase().as_str() {
            "git" => Ok(Self::Git),
            other => Err(NumngError::SpecParse {
                package: package.map(ToString::to_string),
                field: "source_type".to_string(),
                reason: format!("'{other}' is not a supported source type"),
            }),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Git => write!(f, "git"),
        }
    }
}

/// Package description format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageFormat {
    Numng,
    Nupm,
    Packer,
    #[default]
    Auto,
}

impl PackageFormat {
    /// Parses a `package_format` value (`packer` and `packer.nu` are synonyms).
    pub fn parse(text: &str, package: Option<&str>) -> Result<Self, NumngError> {
        match text.to_lowercase().as_str() {
            "numng" => Ok(Self::Numng),
            "nupm" => Ok(Self::Nupm),
            "packer" | "packer.nu" => Ok(Self::Packer),
            "auto" => Ok(Self::Auto),
            _ => Err(NumngError::UnsupportedFormat {
                package: package.map(ToString::to_string),
                format: text.to_string(),
            }),
        }
    }
}

impl fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numng => write!(f, "numng"),
            Self::Nupm => write!(f, "nupm"),
            Self::Packer => write!(f, "packer.nu"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Kind of a shell integration entry.
///
/// The order of the variants is the order entries are emitted per package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellEntryKind {
    /// `source <path>`
    Source,
    /// `use <path>`
    Use,
    /// `use <path> *`
    UseAll,
    /// `source-env <path>`
    SourceEnv,
    /// Directory appended to `NU_LIB_DIRS`
    LibDir,
}

impl ShellEntryKind {
    /// Parses a `shell_config` key. `lib_dir` is not accepted here; only the
    /// packer adapter produces it.
    #[must_use]
    pub fn from_config_key(key: &str) -> Option<Self> {
        match key {
            "source" => Some(Self::Source),
            "use" => Some(Self::Use),
            "use_all" => Some(Self::UseAll),
            "source_env" => Some(Self::SourceEnv),
            _ => None,
        }
    }
}

/// Entries that can only be determined by looking at the fetched package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Discovery {
    /// nupm `type: script`: every top-level `*.nu`/`*.nush` file becomes a bin entry
    NupmScripts,
    /// packer.nu: `env.nu`, `init.nu` and `lib/` when present
    PackerFiles,
}

/// The normalized form of one package entry.
///
/// Every field is optional so that declarations can be merged: a field that is
/// `None` has not been stated and may be filled from a registry or from the
/// package's own metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageDeclaration {
    pub name: Option<String>,
    pub source_type: Option<SourceType>,
    pub source_uri: Option<String>,
    pub git_ref: Option<String>,
    pub path_offset: Option<String>,
    pub package_format: Option<PackageFormat>,
    /// Dependencies; bare names are declarations with only `name` set
    pub depends: Option<Vec<PackageDeclaration>>,
    /// `[inner:]outer` → declaration of the package linked into this one
    pub link_in: Option<BTreeMap<String, PackageDeclaration>>,
    pub ignore_registry: Option<bool>,
    /// Version constraint used for registry lookups
    pub version: Option<String>,

    pub plugin_paths: Option<Vec<String>>,
    /// Library name → directory inside the package
    pub lib_dirs: Option<BTreeMap<String, String>>,
    pub shell_config: Option<BTreeMap<ShellEntryKind, Vec<String>>>,
    /// Executable name → file inside the package
    pub bin: Option<BTreeMap<String, String>>,
    pub build_command: Option<String>,
    pub discovery: Option<Discovery>,

    /// Root only: whether dependencies may run build commands
    pub allow_build_commands: Option<bool>,
    /// Root only: registry sources in declaration order
    pub registry: Vec<PackageDeclaration>,
}

impl PackageDeclaration {
    /// A bare reference to a package by name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Name or a placeholder for messages.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    /// Effective git ref.
    #[must_use]
    pub fn git_ref_or_default(&self) -> &str {
        self.git_ref.as_deref().unwrap_or(DEFAULT_GIT_REF)
    }

    #[must_use]
    pub fn ignores_registry(&self) -> bool {
        self.ignore_registry.unwrap_or(false)
    }

    #[must_use]
    pub fn allows_build_commands(&self) -> bool {
        self.allow_build_commands.unwrap_or(false)
    }

    /// Whether the declaration lacks a source and must be filled from a registry.
    #[must_use]
    pub fn needs_registry(&self) -> bool {
        self.source_uri.is_none()
    }

    /// Fills every unset field from `filler`.
    ///
    /// `source_type` travels with `source_uri`: both are taken only when this
    /// declaration has no URI. `allow_build_commands` and `registry` are never
    /// filled. Collections are taken wholesale, never merged element-wise.
    pub fn fill_missing(&mut self, filler: &Self) {
        fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(value);
            }
        }

        fill(&mut self.name, &filler.name);
        if self.source_uri.is_none() {
            self.source_uri.clone_from(&filler.source_uri);
            self.source_type = filler.source_type.or(self.source_type);
        }
        fill(&mut self.git_ref, &filler.git_ref);
        fill(&mut self.path_offset, &filler.path_offset);
        fill(&mut self.package_format, &filler.package_format);
        fill(&mut self.depends, &filler.depends);
        fill(&mut self.link_in, &filler.link_in);
        fill(&mut self.ignore_registry, &filler.ignore_registry);
        fill(&mut self.version, &filler.version);
        self.fill_materialization(filler);
    }

    /// Fills only the materialization fields (plugins, libs, shell config, bin,
    /// build command and discovery).
    pub fn fill_materialization(&mut self, filler: &Self) {
        fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(value);
            }
        }

        fill(&mut self.plugin_paths, &filler.plugin_paths);
        fill(&mut self.lib_dirs, &filler.lib_dirs);
        fill(&mut self.shell_config, &filler.shell_config);
        fill(&mut self.bin, &filler.bin);
        fill(&mut self.build_command, &filler.build_command);
        fill(&mut self.discovery, &filler.discovery);
    }

    /// Drops the fields a registry-source declaration may not carry.
    #[must_use]
    pub fn into_registry_source(mut self) -> Self {
        self.depends = None;
        self.link_in = None;
        self.registry.clear();
        self
    }
}

/// Normalizes a raw declaration with the adapter selected by `hint`.
///
/// With [`PackageFormat::Auto`] the adapter is chosen by [`detect_format`]; the
/// detected format is not written into the result.
pub fn normalize(raw: &Value, hint: PackageFormat) -> Result<PackageDeclaration, NumngError> {
    let format = match hint {
        PackageFormat::Auto => detect_format(raw)?,
        explicit => explicit,
    };
    tracing::trace!(target: "manifest", "normalizing declaration as {format}");
    match format {
        PackageFormat::Numng | PackageFormat::Auto => numng::parse_declaration(raw),
        PackageFormat::Nupm => nupm::parse_declaration(raw),
        PackageFormat::Packer => packer::parse_declaration(raw),
    }
}

/// Reads and normalizes a root package file (numng format).
pub async fn load_package_file(path: &Path) -> Result<PackageDeclaration> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read package file {}", path.display()))?;
    let raw: Value = serde_json::from_str(&content).map_err(|e| NumngError::SpecParse {
        package: None,
        field: "<file>".to_string(),
        reason: format!("{} is not valid JSON: {e}", path.display()),
    })?;
    let root = numng::parse_root(&raw)?;
    tracing::debug!(
        target: "manifest",
        "loaded {} with {} dependencies and {} registries",
        path.display(),
        root.depends.as_ref().map_or(0, Vec::len),
        root.registry.len()
    );
    Ok(root)
}

/// Reads the metadata a fetched package ships about itself.
///
/// `numng.json`, `nupm.nuon` or `meta.nuon` is read depending on `format`; with
/// [`PackageFormat::Auto`] the first file present in that order is used. Returns
/// `None` when the package has no metadata file.
pub fn read_package_metadata(
    package_dir: &Path,
    format: PackageFormat,
) -> Result<Option<PackageDeclaration>> {
    let candidates: &[(&str, PackageFormat)] = match format {
        PackageFormat::Numng => &[(PACKAGE_FILE_NAME, PackageFormat::Numng)],
        PackageFormat::Nupm => &[(NUPM_METADATA_FILE, PackageFormat::Nupm)],
        PackageFormat::Packer => &[(PACKER_METADATA_FILE, PackageFormat::Packer)],
        PackageFormat::Auto => &[
            (PACKAGE_FILE_NAME, PackageFormat::Numng),
            (NUPM_METADATA_FILE, PackageFormat::Nupm),
            (PACKER_METADATA_FILE, PackageFormat::Packer),
        ],
    };

    for (file_name, file_format) in candidates {
        let path = package_dir.join(file_name);
        if !path.is_file() {
            continue;
        }
        let raw = nuon::load_nuon_file(&path)?;
        let declaration = match file_format {
            PackageFormat::Numng => numng::parse_root(&raw)?,
            other => normalize(&raw, *other)?,
        };
        tracing::debug!(target: "manifest", "read package metadata from {}", path.display());
        return Ok(Some(declaration));
    }
    Ok(None)
}
