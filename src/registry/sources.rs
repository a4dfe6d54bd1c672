//! Registry sources on disk and in memory.

use super::{RegistrySource, RegistryValue, VersionTable};
use crate::constants::NUPM_REGISTRY_INDEX;
use crate::core::NumngError;
use crate::manifest::{PackageFormat, nuon, numng, nupm};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Opens the registry checked out at `dir`.
///
/// With [`PackageFormat::Auto`] a directory containing `registry/registry.nuon`
/// is read as a nupm registry and anything else as a numng registry.
pub fn open_registry(format: PackageFormat, dir: &Path) -> Result<Box<dyn RegistrySource>, NumngError> {
    let format = match format {
        PackageFormat::Auto if dir.join(NUPM_REGISTRY_INDEX).is_file() => PackageFormat::Nupm,
        PackageFormat::Auto => PackageFormat::Numng,
        explicit => explicit,
    };
    tracing::debug!(target: "registry", "opening {format} registry at {}", dir.display());
    match format {
        PackageFormat::Nupm => Ok(Box::new(NupmRegistry::open(dir)?)),
        PackageFormat::Numng | PackageFormat::Auto => Ok(Box::new(NumngRegistry::new(dir))),
        PackageFormat::Packer => Err(NumngError::UnsupportedFormat {
            package: None,
            format: "packer.nu registry".to_string(),
        }),
    }
}

/// numng registry: one `<name>.json` version table per package.
///
/// Names containing `/` live in sub-directories (`nu-scripts/git` →
/// `nu-scripts/git.json`).
#[derive(Debug, Clone)]
pub struct NumngRegistry {
    root: PathBuf,
}

impl NumngRegistry {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
        }
    }

    fn table_path(&self, name: &str) -> Result<PathBuf, NumngError> {
        let relative = Path::new(name);
        let safe = !name.is_empty()
            && name.split('/').all(|part| !part.is_empty())
            && relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(NumngError::PathEscape {
                path: name.to_string(),
                base: self.root.clone(),
            });
        }
        Ok(self.root.join(format!("{name}.json")))
    }
}

impl RegistrySource for NumngRegistry {
    fn describe(&self) -> String {
        format!("numng registry {}", self.root.display())
    }

    fn package_names(&self) -> Result<Vec<String>, NumngError> {
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.root).into_iter().filter_entry(|e| {
            e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.')
        }) {
            let entry = entry.map_err(|e| NumngError::Other {
                message: format!("Failed to list {}: {e}", self.root.display()),
            })?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            if let Ok(relative) = path.with_extension("").strip_prefix(&self.root) {
                let parts: Vec<String> =
                    relative.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
                names.push(parts.join("/"));
            }
        }
        names.sort();
        Ok(names)
    }

    fn load_table(&self, name: &str) -> Result<Option<VersionTable>, NumngError> {
        let path = self.table_path(name)?;
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let raw: Value = serde_json::from_str(&content).map_err(|e| NumngError::InvalidRegistryFormat {
            path: path.clone(),
            reason: format!("not valid JSON: {e}"),
        })?;
        let Value::Object(entries) = raw else {
            return Err(NumngError::InvalidRegistryFormat {
                path,
                reason: "a package entry must be a record of versions".to_string(),
            });
        };

        let mut table = BTreeMap::new();
        for (key, value) in entries {
            let value = match value {
                Value::String(target) => RegistryValue::Alias(target),
                object @ Value::Object(_) => RegistryValue::Declaration(
                    numng::parse_declaration(&object).map_err(|e| NumngError::InvalidRegistryFormat {
                        path: path.clone(),
                        reason: format!("version '{key}': {e}"),
                    })?,
                ),
                _ => {
                    return Err(NumngError::InvalidRegistryFormat {
                        path,
                        reason: format!("version '{key}' must be a record or an alias string"),
                    });
                }
            };
            table.insert(key, value);
        }
        Ok(Some(table))
    }
}

/// nupm registry: `registry/registry.nuon` lists `{name, path}` records; each
/// path (relative to `registry/`) holds the version records of one package.
#[derive(Debug, Clone)]
pub struct NupmRegistry {
    root: PathBuf,
    index: Vec<(String, PathBuf)>,
}

impl NupmRegistry {
    /// Reads the registry index of the checkout at `root`.
    pub fn open(root: &Path) -> Result<Self, NumngError> {
        let index_path = root.join(NUPM_REGISTRY_INDEX);
        let raw = nuon::load_nuon_file(&index_path).map_err(|e| NumngError::InvalidRegistryFormat {
            path: index_path.clone(),
            reason: format!("{e:#}"),
        })?;
        let Value::Array(items) = raw else {
            return Err(NumngError::InvalidRegistryFormat {
                path: index_path,
                reason: "the index must be a list of {name, path} records".to_string(),
            });
        };

        let registry_dir = index_path.parent().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
        let mut index = Vec::with_capacity(items.len());
        for item in &items {
            let (Some(name), Some(path)) =
                (item.get("name").and_then(Value::as_str), item.get("path").and_then(Value::as_str))
            else {
                return Err(NumngError::InvalidRegistryFormat {
                    path: index_path,
                    reason: format!("index entry {item} lacks a name or path"),
                });
            };
            let file = crate::utils::safe_join(&registry_dir, path)?;
            index.push((name.to_string(), file));
        }

        tracing::debug!(target: "registry", "nupm registry {} lists {} packages", root.display(), index.len());
        Ok(Self {
            root: root.to_path_buf(),
            index,
        })
    }
}

impl RegistrySource for NupmRegistry {
    fn describe(&self) -> String {
        format!("nupm registry {}", self.root.display())
    }

    fn package_names(&self) -> Result<Vec<String>, NumngError> {
        let mut names: Vec<String> = self.index.iter().map(|(name, _)| name.clone()).collect();
        names.dedup();
        Ok(names)
    }

    fn load_table(&self, name: &str) -> Result<Option<VersionTable>, NumngError> {
        let mut table: Option<VersionTable> = None;
        for (_, file) in self.index.iter().filter(|(entry, _)| entry == name) {
            let raw = nuon::load_nuon_file(file).map_err(|e| NumngError::InvalidRegistryFormat {
                path: file.clone(),
                reason: format!("{e:#}"),
            })?;
            let records = match raw {
                Value::Array(records) => records,
                record @ Value::Object(_) => vec![record],
                _ => {
                    return Err(NumngError::InvalidRegistryFormat {
                        path: file.clone(),
                        reason: "package file must hold a list of records".to_string(),
                    });
                }
            };

            let versions = table.get_or_insert_with(BTreeMap::new);
            for record in &records {
                if record.get("name").and_then(Value::as_str).is_some_and(|n| n != name) {
                    continue;
                }
                let declaration = nupm::parse_declaration(record).map_err(|e| {
                    NumngError::InvalidRegistryFormat {
                        path: file.clone(),
                        reason: e.to_string(),
                    }
                })?;
                let Some(version) = declaration.version.clone() else {
                    tracing::debug!(target: "registry", "skipping {name} record without version in {}", file.display());
                    continue;
                };
                versions.insert(version, RegistryValue::Declaration(declaration));
            }
        }
        Ok(table)
    }
}

/// Registry whose tables are held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    tables: BTreeMap<String, VersionTable>,
}

impl InMemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, table: VersionTable) {
        self.tables.insert(name.into(), table);
    }
}

impl RegistrySource for InMemoryRegistry {
    fn describe(&self) -> String {
        "in-memory registry".to_string()
    }

    fn package_names(&self) -> Result<Vec<String>, NumngError> {
        Ok(self.tables.keys().cloned().collect())
    }

    fn load_table(&self, name: &str) -> Result<Option<VersionTable>, NumngError> {
        Ok(self.tables.get(name).cloned())
    }
}
