//! `numng init`: write a starter package file.
//!
//! The file references the nupm registry so packages can be declared by name.
//! With `--nu-config` it also declares numng itself, which provides the nushell
//! side of the integration.

use super::CommandContext;
use crate::constants::{DEFAULT_REGISTRY_URI, NUMNG_SOURCE_URI};
use crate::utils::{atomic_write, ensure_dir};
use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;
use serde_json::{Value, json};

#[derive(Args, Debug)]
pub struct InitCommand {
    /// Package name (defaults to the directory name)
    #[arg(long)]
    name: Option<String>,

    /// Overwrite an existing package file
    #[arg(short, long)]
    force: bool,
}

impl InitCommand {
    pub async fn execute(self, context: &CommandContext) -> Result<()> {
        let path = &context.package_file;
        if path.exists() && !self.force {
            bail!("Package file already exists at {}. Use --force to overwrite", path.display());
        }

        let name = self.name.or_else(|| {
            if context.nu_config {
                Some("nu_config".to_string())
            } else {
                path.parent()
                    .and_then(|dir| dir.file_name())
                    .map(|name| name.to_string_lossy().into_owned())
            }
        });
        let package = default_package(name.as_deref(), context.nu_config);

        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        let mut content = serde_json::to_string_pretty(&package)?;
        content.push('\n');
        atomic_write(path, content.as_bytes())?;

        if !context.quiet {
            println!("{} Initialized {}", "✓".green(), path.display());
        }
        Ok(())
    }
}

/// The starter package declaration.
#[must_use]
pub fn default_package(name: Option<&str>, nu_config: bool) -> Value {
    let mut depends = Vec::new();
    if nu_config {
        depends.push(json!({
            "name": "numng",
            "source_uri": NUMNG_SOURCE_URI,
            "package_format": "numng"
        }));
    }

    let mut package = json!({
        "registry": [{
            "name": "nupm",
            "source_uri": DEFAULT_REGISTRY_URI,
            "package_format": "nupm"
        }],
        "depends": depends
    });
    if let (Some(name), Some(object)) = (name, package.as_object_mut()) {
        object.insert("name".to_string(), Value::String(name.to_string()));
    }
    package
}
