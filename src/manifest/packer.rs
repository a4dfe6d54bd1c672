//! Tolerant adapter for packer.nu `meta.nuon`.
//!
//! `prefixed_modules` become `use` entries, `modules` become `use_all` entries.
//! `env.nu`, `init.nu` and `lib/` are probed on disk once the package is fetched,
//! see [`Discovery::PackerFiles`].

use super::{Discovery, PackageDeclaration, ShellEntryKind};
use crate::core::NumngError;
use serde_json::Value;
use std::collections::BTreeMap;

pub fn parse_declaration(raw: &Value) -> Result<PackageDeclaration, NumngError> {
    let object = raw.as_object().ok_or_else(|| NumngError::SpecParse {
        package: None,
        field: "<meta.nuon>".to_string(),
        reason: "must be a record".to_string(),
    })?;
    let name = object.get("name").and_then(Value::as_str).map(ToString::to_string);

    let list = |key: &str| -> Result<Option<Vec<String>>, NumngError> {
        match object.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(ToString::to_string).ok_or_else(|| NumngError::SpecParse {
                        package: name.clone(),
                        field: key.to_string(),
                        reason: "must be a list of module paths".to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(_) => Err(NumngError::SpecParse {
                package: name.clone(),
                field: key.to_string(),
                reason: "must be a list of module paths".to_string(),
            }),
        }
    };

    let mut shell_config = BTreeMap::new();
    if let Some(prefixed) = list("prefixed_modules")? {
        shell_config.insert(ShellEntryKind::Use, prefixed);
    }
    if let Some(modules) = list("modules")? {
        shell_config.insert(ShellEntryKind::UseAll, modules);
    }

    Ok(PackageDeclaration {
        shell_config: Some(shell_config),
        discovery: Some(Discovery::PackerFiles),
        version: object.get("version").and_then(Value::as_str).map(ToString::to_string),
        name,
        ..PackageDeclaration::default()
    })
}
