//! Strict adapter for the native numng JSON format.
//!
//! Every known key is type-checked and unknown keys are rejected, so typos in a
//! package file surface immediately instead of silently changing behavior.

use super::{PackageDeclaration, PackageFormat, ShellEntryKind, SourceType};
use crate::constants::{CARGO_BUILD_COMMAND, VALID_SHELL_CONFIG_KEYS};
use crate::core::NumngError;
use crate::version::VersionConstraint;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Keys accepted on every declaration.
const DECLARATION_KEYS: &[&str] = &[
    "name",
    "source_type",
    "source_uri",
    "git_ref",
    "path_offset",
    "package_format",
    "depends",
    "linkin",
    "ignore_registry",
    "version",
    "nu_plugins",
    "nu_libs",
    "shell_config",
    "bin",
    "build_command",
    "do_cargo_build",
    "allow_build_commands",
];

/// Parses the root package declaration, including its `registry` sources.
pub fn parse_root(raw: &Value) -> Result<PackageDeclaration, NumngError> {
    let object = as_object(raw, None, "<root>")?;
    let mut root = parse_object(object, true)?;
    root.registry = match object.get("registry") {
        None | Some(Value::Null) => Vec::new(),
        Some(value @ Value::Object(_)) => vec![parse_registry_source(value)?],
        Some(Value::Array(items)) => {
            items.iter().map(parse_registry_source).collect::<Result<Vec<_>, _>>()?
        }
        Some(other) => {
            return Err(invalid(root.name.as_deref(), "registry", &expected("a record or list", other)));
        }
    };
    Ok(root)
}

/// Parses one (non-root) declaration.
pub fn parse_declaration(raw: &Value) -> Result<PackageDeclaration, NumngError> {
    let object = as_object(raw, None, "<declaration>")?;
    parse_object(object, false)
}

fn parse_registry_source(raw: &Value) -> Result<PackageDeclaration, NumngError> {
    Ok(parse_declaration(raw)?.into_registry_source())
}

fn parse_object(object: &Map<String, Value>, is_root: bool) -> Result<PackageDeclaration, NumngError> {
    let name = get_opt_str(None, object, "name")?;
    let pkg = name.as_deref();

    for key in object.keys() {
        let known = DECLARATION_KEYS.contains(&key.as_str()) || (is_root && key == "registry");
        if !known {
            let reason = if key == "registry" {
                "is only allowed in the root package".to_string()
            } else {
                "is not a known key".to_string()
            };
            return Err(invalid(pkg, key, &reason));
        }
    }

    let source_type = get_opt_str(pkg, object, "source_type")?
        .map(|text| SourceType::parse(&text, pkg))
        .transpose()?;
    let package_format = get_opt_str(pkg, object, "package_format")?
        .map(|text| PackageFormat::parse(&text, pkg))
        .transpose()?;
    let version = get_opt_str(pkg, object, "version")?;
    if let Some(version) = &version {
        VersionConstraint::parse(version)?;
    }

    let build_command = parse_build_command(pkg, object)?;

    Ok(PackageDeclaration {
        source_type,
        source_uri: get_opt_str(pkg, object, "source_uri")?,
        git_ref: get_opt_str(pkg, object, "git_ref")?,
        path_offset: get_opt_str(pkg, object, "path_offset")?,
        package_format,
        depends: parse_depends(pkg, object.get("depends"))?,
        link_in: parse_link_in(pkg, object.get("linkin"))?,
        ignore_registry: get_opt_bool(pkg, object, "ignore_registry")?,
        version,
        plugin_paths: get_opt_str_or_list(pkg, object, "nu_plugins")?,
        lib_dirs: get_opt_str_map(pkg, object, "nu_libs")?,
        shell_config: parse_shell_config(pkg, object.get("shell_config"))?,
        bin: get_opt_str_map(pkg, object, "bin")?,
        build_command,
        discovery: None,
        allow_build_commands: get_opt_bool(pkg, object, "allow_build_commands")?,
        registry: Vec::new(),
        name,
    })
}

/// `build_command`, or the cargo release build when `do_cargo_build` is true.
fn parse_build_command(pkg: Option<&str>, object: &Map<String, Value>) -> Result<Option<String>, NumngError> {
    let command = get_opt_str(pkg, object, "build_command")?;
    match (get_opt_bool(pkg, object, "do_cargo_build")?, command) {
        (Some(true), Some(_)) => Err(invalid(pkg, "do_cargo_build", "cannot be combined with build_command")),
        (Some(true), None) => Ok(Some(CARGO_BUILD_COMMAND.to_string())),
        (_, command) => Ok(command),
    }
}

fn parse_depends(
    pkg: Option<&str>,
    value: Option<&Value>,
) -> Result<Option<Vec<PackageDeclaration>>, NumngError> {
    let item = |value: &Value| -> Result<PackageDeclaration, NumngError> {
        match value {
            Value::String(name) => Ok(PackageDeclaration::named(name.clone())),
            Value::Object(_) => parse_declaration(value),
            other => Err(invalid(pkg, "depends", &expected("a name or a record", other))),
        }
    };

    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items.iter().map(item).collect::<Result<_, _>>()?)),
        Some(single @ (Value::String(_) | Value::Object(_))) => Ok(Some(vec![item(single)?])),
        Some(other) => Err(invalid(pkg, "depends", &expected("a list, a name or a record", other))),
    }
}

fn parse_link_in(
    pkg: Option<&str>,
    value: Option<&Value>,
) -> Result<Option<BTreeMap<String, PackageDeclaration>>, NumngError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(entries)) => {
            let mut link_in = BTreeMap::new();
            for (path, declaration) in entries {
                if !declaration.is_object() {
                    return Err(invalid(
                        pkg,
                        &format!("linkin.{path}"),
                        &expected("a record (package)", declaration),
                    ));
                }
                link_in.insert(path.clone(), parse_declaration(declaration)?);
            }
            Ok(Some(link_in))
        }
        Some(other) => Err(invalid(pkg, "linkin", &expected("a record", other))),
    }
}

fn parse_shell_config(
    pkg: Option<&str>,
    value: Option<&Value>,
) -> Result<Option<BTreeMap<ShellEntryKind, Vec<String>>>, NumngError> {
    let entries = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(entries)) => entries,
        Some(other) => return Err(invalid(pkg, "shell_config", &expected("a record", other))),
    };

    let mut config = BTreeMap::new();
    for (key, value) in entries {
        let kind = ShellEntryKind::from_config_key(key).ok_or_else(|| {
            invalid(
                pkg,
                &format!("shell_config.{key}"),
                &format!("is not one of: {}", VALID_SHELL_CONFIG_KEYS.join(", ")),
            )
        })?;
        let field = format!("shell_config.{key}");
        let paths = match value {
            Value::String(path) => vec![path.clone()],
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(path) => Ok(path.clone()),
                    other => Err(invalid(pkg, &field, &expected("a string", other))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            other => return Err(invalid(pkg, &field, &expected("a string or list", other))),
        };
        config.insert(kind, paths);
    }
    Ok(Some(config))
}

fn as_object<'a>(
    value: &'a Value,
    pkg: Option<&str>,
    field: &str,
) -> Result<&'a Map<String, Value>, NumngError> {
    value.as_object().ok_or_else(|| invalid(pkg, field, &expected("a record", value)))
}

fn get_opt_str(
    pkg: Option<&str>,
    object: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, NumngError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(invalid(pkg, key, &expected("a string", other))),
    }
}

fn get_opt_bool(
    pkg: Option<&str>,
    object: &Map<String, Value>,
    key: &str,
) -> Result<Option<bool>, NumngError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(invalid(pkg, key, &expected("a boolean", other))),
    }
}

/// A list of strings; a single string counts as a list of one.
fn get_opt_str_or_list(
    pkg: Option<&str>,
    object: &Map<String, Value>,
    key: &str,
) -> Result<Option<Vec<String>>, NumngError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(vec![s.clone()])),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(invalid(pkg, key, &expected("a list of strings", other))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(other) => Err(invalid(pkg, key, &expected("a string or a list of strings", other))),
    }
}

fn get_opt_str_map(
    pkg: Option<&str>,
    object: &Map<String, Value>,
    key: &str,
) -> Result<Option<BTreeMap<String, String>>, NumngError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(entries)) => entries
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => Ok((k.clone(), s.clone())),
                other => Err(invalid(pkg, &format!("{key}.{k}"), &expected("a string", other))),
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Some),
        Some(other) => Err(invalid(pkg, key, &expected("a record of strings", other))),
    }
}

fn expected(what: &str, found: &Value) -> String {
    format!("must be {what}, found {found}")
}

fn invalid(pkg: Option<&str>, field: &str, reason: &str) -> NumngError {
    NumngError::SpecParse {
        package: pkg.map(ToString::to_string),
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_declaration() {
        let decl = parse_declaration(&json!({
            "name": "tools",
            "source_type": "git",
            "source_uri": "https://example.com/tools",
            "git_ref": "v1.0.0",
            "path_offset": "nu",
            "package_format": "numng",
            "ignore_registry": true,
            "version": "^1",
            "nu_plugins": ["target/release/nu_plugin_x"],
            "nu_libs": {"tools": "lib"},
            "shell_config": {"use": "a.nu", "source_env": ["env.nu", "env2.nu"]},
            "bin": {"tool": "bin/tool.nu"},
            "build_command": "cargo build --release"
        }))
        .unwrap();

        assert_eq!(decl.name.as_deref(), Some("tools"));
        assert_eq!(decl.source_type, Some(SourceType::Git));
        assert_eq!(decl.package_format, Some(PackageFormat::Numng));
        assert_eq!(decl.ignore_registry, Some(true));
        assert_eq!(decl.plugin_paths.as_ref().map(Vec::len), Some(1));
        let shell = decl.shell_config.unwrap();
        assert_eq!(shell[&ShellEntryKind::Use], vec!["a.nu".to_string()]);
        assert_eq!(shell[&ShellEntryKind::SourceEnv].len(), 2);
        assert_eq!(decl.bin.unwrap()["tool"], "bin/tool.nu");
    }

    #[test]
    fn test_do_cargo_build() {
        let cargo = parse_declaration(&json!({"name": "p", "do_cargo_build": true})).unwrap();
        assert_eq!(cargo.build_command.as_deref(), Some("cargo build --release"));

        let off = parse_declaration(&json!({"name": "p", "do_cargo_build": false})).unwrap();
        assert_eq!(off.build_command, None);

        assert!(matches!(
            parse_declaration(&json!({"do_cargo_build": true, "build_command": "make"})),
            Err(NumngError::SpecParse { field, .. }) if field == "do_cargo_build"
        ));
        assert!(parse_declaration(&json!({"do_cargo_build": "yes"})).is_err());
    }

    #[test]
    fn test_plugins_accept_single_path() {
        let single = parse_declaration(&json!({"nu_plugins": "target/release/nu_plugin_x"})).unwrap();
        assert_eq!(single.plugin_paths, Some(vec!["target/release/nu_plugin_x".to_string()]));
        assert!(parse_declaration(&json!({"nu_plugins": 3})).is_err());
        assert!(parse_declaration(&json!({"nu_plugins": ["a", 1]})).is_err());
    }

    #[test]
    fn test_depends_shapes() {
        let single_name = parse_declaration(&json!({"depends": "a"})).unwrap();
        assert_eq!(single_name.depends.unwrap()[0].name.as_deref(), Some("a"));

        let single_object =
            parse_declaration(&json!({"depends": {"name": "b", "version": "1"}})).unwrap();
        assert_eq!(single_object.depends.unwrap()[0].version.as_deref(), Some("1"));

        let list = parse_declaration(&json!({
            "depends": ["a", {"name": "b", "source_uri": "https://example.com/b"}]
        }))
        .unwrap();
        let deps = list.depends.unwrap();
        assert_eq!(deps.len(), 2);
        assert!(deps[0].needs_registry());
        assert!(!deps[1].needs_registry());

        assert!(parse_declaration(&json!({"depends": [1]})).is_err());
        assert!(parse_declaration(&json!({"depends": true})).is_err());
    }

    #[test]
    fn test_strictness() {
        for bad in [
            json!({"nmae": "typo"}),
            json!({"name": 1}),
            json!({"ignore_registry": "yes"}),
            json!({"shell_config": {"include": "x.nu"}}),
            json!({"shell_config": {"use": [1]}}),
            json!({"bin": {"a": 1}}),
            json!({"linkin": {"a": "name"}}),
            json!({"registry": []}),
            json!({"source_type": "svn"}),
        ] {
            assert!(
                matches!(parse_declaration(&bad), Err(NumngError::SpecParse { .. })),
                "expected SpecParse for {bad}"
            );
        }
        assert!(matches!(
            parse_declaration(&json!({"package_format": "cargo"})),
            Err(NumngError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            parse_declaration(&json!({"version": ">>1"})),
            Err(NumngError::InvalidVersionSyntax { .. })
        ));
    }

    #[test]
    fn test_root_registry_shapes() {
        let single = parse_root(&json!({
            "registry": {"source_uri": "https://example.com/r", "package_format": "nupm", "depends": ["x"]}
        }))
        .unwrap();
        assert_eq!(single.registry.len(), 1);
        assert!(single.registry[0].depends.is_none());

        let list = parse_root(&json!({
            "allow_build_commands": true,
            "registry": [{"source_uri": "https://example.com/a"}, {"source_uri": "https://example.com/b"}]
        }))
        .unwrap();
        assert_eq!(list.registry.len(), 2);
        assert!(list.allows_build_commands());

        assert!(parse_root(&json!({"registry": "x"})).is_err());
        assert!(parse_root(&json!([])).is_err());
    }

    #[test]
    fn test_link_in_nested() {
        let decl = parse_declaration(&json!({
            "linkin": {"vendor:lib/x": {"source_uri": "https://example.com/x", "git_ref": "v2"}}
        }))
        .unwrap();
        let link_in = decl.link_in.unwrap();
        assert_eq!(link_in["vendor:lib/x"].git_ref.as_deref(), Some("v2"));
    }
}
