//! Tolerant adapter for nupm.
//!
//! Two shapes are accepted:
//!
//! - **Registry records** (`{name, version, type: "git", info: {url, revision}, path}`),
//!   as listed in the package files of a nupm registry
//! - **Package metadata** (`nupm.nuon`: `{name, type: module|script|custom, scripts, dependencies}`)
//!
//! Unknown keys are ignored; known keys with the wrong type are still errors.

use super::{Discovery, PackageDeclaration, PackageFormat, SourceType};
use crate::core::NumngError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Converts a nupm record or `nupm.nuon` value into a declaration.
pub fn parse_declaration(raw: &Value) -> Result<PackageDeclaration, NumngError> {
    let object = raw.as_object().ok_or_else(|| invalid(None, "<nupm>", "must be a record"))?;
    let is_record = object.contains_key("info")
        || object.get("type").and_then(Value::as_str) == Some("git");
    if is_record {
        parse_registry_record(object)
    } else {
        parse_package_metadata(object)
    }
}

fn parse_registry_record(object: &Map<String, Value>) -> Result<PackageDeclaration, NumngError> {
    let name = opt_str(None, object, "name")?;
    let pkg = name.as_deref();

    let source_type = opt_str(pkg, object, "type")?
        .map(|text| SourceType::parse(&text, pkg))
        .transpose()?;
    let info = match object.get("info") {
        None | Some(Value::Null) => None,
        Some(Value::Object(info)) => Some(info),
        Some(_) => return Err(invalid(pkg, "info", "must be a record")),
    };
    let (source_uri, git_ref) = match info {
        Some(info) => (opt_str(pkg, info, "url")?, opt_str(pkg, info, "revision")?),
        None => (None, None),
    };
    let path_offset = opt_str(pkg, object, "path")?.filter(|p| !p.is_empty() && p != ".");

    Ok(PackageDeclaration {
        source_type: source_type.or(source_uri.as_ref().map(|_| SourceType::Git)),
        source_uri,
        git_ref,
        path_offset,
        package_format: Some(PackageFormat::Nupm),
        version: opt_str(pkg, object, "version")?,
        name,
        ..PackageDeclaration::default()
    })
}

fn parse_package_metadata(object: &Map<String, Value>) -> Result<PackageDeclaration, NumngError> {
    let name = opt_str(None, object, "name")?;
    let pkg = name.as_deref();

    let mut declaration = PackageDeclaration {
        version: opt_str(pkg, object, "version")?,
        ..PackageDeclaration::default()
    };

    match opt_str(pkg, object, "type")?.as_deref() {
        Some("module") => {
            let module = name
                .clone()
                .ok_or_else(|| invalid(pkg, "name", "is required for module packages"))?;
            declaration.lib_dirs = Some(BTreeMap::from([(module.clone(), module)]));
        }
        Some("script") => declaration.discovery = Some(Discovery::NupmScripts),
        Some("custom") | None => {
            tracing::debug!(
                target: "manifest",
                "nupm package {} has no module or script entry",
                pkg.unwrap_or("<unnamed>")
            );
        }
        Some(other) => {
            return Err(invalid(pkg, "type", &format!("unknown nupm package type '{other}'")));
        }
    }

    if let Some(scripts) = opt_str_list(pkg, object, "scripts")? {
        let mut bin = BTreeMap::new();
        for script in scripts {
            let file_name = Path::new(&script)
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .ok_or_else(|| invalid(pkg, "scripts", &format!("'{script}' has no file name")))?;
            bin.insert(file_name, script);
        }
        declaration.bin = Some(bin);
    }

    if let Some(dependencies) = opt_str_list(pkg, object, "dependencies")? {
        declaration.depends =
            Some(dependencies.iter().map(|dep| dependency_reference(dep)).collect());
    }

    declaration.name = name;
    Ok(declaration)
}

/// `name/version` or `name` → bare reference with an optional version constraint.
fn dependency_reference(text: &str) -> PackageDeclaration {
    match text.rsplit_once('/') {
        Some((name, version)) if !name.is_empty() && !version.is_empty() => PackageDeclaration {
            version: Some(version.to_string()),
            ..PackageDeclaration::named(name)
        },
        _ => PackageDeclaration::named(text),
    }
}

fn opt_str(
    pkg: Option<&str>,
    object: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, NumngError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(invalid(pkg, key, "must be a string")),
    }
}

fn opt_str_list(
    pkg: Option<&str>,
    object: &Map<String, Value>,
    key: &str,
) -> Result<Option<Vec<String>>, NumngError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(ToString::to_string)
                    .ok_or_else(|| invalid(pkg, key, "must be a list of strings"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(invalid(pkg, key, "must be a list of strings")),
    }
}

fn invalid(pkg: Option<&str>, field: &str, reason: &str) -> NumngError {
    NumngError::SpecParse {
        package: pkg.map(ToString::to_string),
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
