//! Format auto-detection for raw declarations.

use super::PackageFormat;
use crate::core::NumngError;
use serde_json::Value;

/// Keys that only appear in nupm records and `nupm.nuon`.
const NUPM_KEYS: &[&str] = &["info", "type", "scripts", "dependencies"];

/// Keys that only appear in packer.nu `meta.nuon`.
const PACKER_KEYS: &[&str] = &["prefixed_modules", "modules"];

/// Keys that only appear in numng declarations.
const NUMNG_ONLY_KEYS: &[&str] = &[
    "source_uri",
    "source_type",
    "path_offset",
    "depends",
    "linkin",
    "ignore_registry",
    "nu_plugins",
    "nu_libs",
    "shell_config",
    "bin",
    "build_command",
    "do_cargo_build",
    "allow_build_commands",
    "registry",
];

/// Picks the adapter for `raw`.
///
/// Order: an explicit `package_format` key, then format-distinguishing keys,
/// then `numng`. A `version` without `git_ref` and without numng-only keys is
/// taken as a nupm record.
pub fn detect_format(raw: &Value) -> Result<PackageFormat, NumngError> {
    let Some(object) = raw.as_object() else {
        return Ok(PackageFormat::Numng);
    };

    if let Some(format) = object.get("package_format").and_then(Value::as_str) {
        let name = object.get("name").and_then(Value::as_str);
        let format = PackageFormat::parse(format, name)?;
        if format != PackageFormat::Auto {
            return Ok(format);
        }
    }

    let has = |keys: &[&str]| keys.iter().any(|key| object.contains_key(*key));

    if has(NUPM_KEYS) {
        return Ok(PackageFormat::Nupm);
    }
    if has(PACKER_KEYS) {
        return Ok(PackageFormat::Packer);
    }
    if object.contains_key("version") && !object.contains_key("git_ref") && !has(NUMNG_ONLY_KEYS)
    {
        return Ok(PackageFormat::Nupm);
    }
    Ok(PackageFormat::Numng)
}
