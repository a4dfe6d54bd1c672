//! Materialization entries that depend on the fetched package contents.
//!
//! - nupm `type: script`: every top-level `*.nu`/`*.nush` file becomes a bin
//!   entry named after the file
//! - packer.nu: `env.nu` is sourced as env, `init.nu` is used with `*`, and
//!   `lib/` is added to the library search path
//!
//! Explicit entries always win over discovered ones.

use crate::manifest::{Discovery, PackageDeclaration, ShellEntryKind};
use std::path::Path;
use walkdir::WalkDir;

/// Returns `declaration` with its discovery entries filled in from `dir`.
#[must_use]
pub fn expand(declaration: &PackageDeclaration, dir: &Path) -> PackageDeclaration {
    let mut expanded = declaration.clone();
    match declaration.discovery {
        Some(Discovery::NupmScripts) => nupm_scripts(&mut expanded, dir),
        Some(Discovery::PackerFiles) => packer_files(&mut expanded, dir),
        None => {}
    }
    expanded
}

fn nupm_scripts(declaration: &mut PackageDeclaration, dir: &Path) {
    let bin = declaration.bin.get_or_insert_with(Default::default);
    let scripts = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry.path().extension().is_some_and(|ext| ext == "nu" || ext == "nush")
        });

    for entry in scripts {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        tracing::trace!(target: "link", "discovered script {file_name} in {}", dir.display());
        bin.entry(file_name.clone()).or_insert(file_name);
    }
}

fn packer_files(declaration: &mut PackageDeclaration, dir: &Path) {
    let probes = [
        ("env.nu", ShellEntryKind::SourceEnv, dir.join("env.nu").is_file()),
        ("init.nu", ShellEntryKind::UseAll, dir.join("init.nu").is_file()),
        ("lib", ShellEntryKind::LibDir, dir.join("lib").is_dir()),
    ];
    let shell = declaration.shell_config.get_or_insert_with(Default::default);
    for (path, kind, present) in probes {
        if !present {
            continue;
        }
        let paths = shell.entry(kind).or_default();
        if !paths.iter().any(|p| p == path) {
            paths.push(path.to_string());
        }
    }
}
