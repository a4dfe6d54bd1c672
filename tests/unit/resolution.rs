//! Registry-backed resolution.

use numng::core::NumngError;
use numng::manifest::PackageDeclaration;
use numng::registry::{InMemoryRegistry, RegistryIndex, RegistryValue, VersionTable};
use numng::resolver::{ResolvedGraph, Resolver};
use std::path::Path;

fn decl(value: serde_json::Value) -> PackageDeclaration {
    numng::manifest::numng::parse_declaration(&value).unwrap()
}

fn table(entries: Vec<(&str, RegistryValue)>) -> VersionTable {
    entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn alias(target: &str) -> RegistryValue {
    RegistryValue::Alias(target.to_string())
}

fn registry() -> RegistryIndex {
    let mut memory = InMemoryRegistry::new();
    memory.insert(
        "webserver",
        table(vec![
            ("_", RegistryValue::Declaration(decl(serde_json::json!({"source_uri": "https://x.org/webserver"})))),
            ("latest", alias("0.8")),
            ("0.8", alias("0.8.1")),
            ("0.8.1", RegistryValue::Declaration(decl(serde_json::json!({"git_ref": "v0.8.1"})))),
            (
                "0.7.0",
                RegistryValue::Declaration(decl(serde_json::json!({
                    "git_ref": "v0.7.0",
                    "depends": [{"name": "router", "version": "^1"}]
                }))),
            ),
        ]),
    );
    memory.insert(
        "router",
        table(vec![
            ("_", RegistryValue::Declaration(decl(serde_json::json!({"source_uri": "https://x.org/router"})))),
            ("1.0.0", RegistryValue::Declaration(decl(serde_json::json!({"git_ref": "v1.0.0"})))),
            ("1.4.2", RegistryValue::Declaration(decl(serde_json::json!({"git_ref": "v1.4.2"})))),
            ("2.0.0", RegistryValue::Declaration(decl(serde_json::json!({"git_ref": "v2.0.0"})))),
        ]),
    );
    RegistryIndex::new(vec![Box::new(memory)])
}

fn resolve(root: serde_json::Value) -> Result<ResolvedGraph, NumngError> {
    let root = numng::manifest::numng::parse_root(&root).unwrap();
    Resolver::new(&registry()).resolve(&root, Path::new("/project"))
}

#[test]
fn test_alias_chain_picks_concrete_version() {
    let graph = resolve(serde_json::json!({"depends": [{"name": "webserver", "version": "latest"}]})).unwrap();
    let node = graph.find("webserver").unwrap();
    assert_eq!(node.key.git_ref, "v0.8.1");
    assert_eq!(node.registry_version.as_deref(), Some("0.8.1"));
    assert_eq!(node.declaration.source_uri.as_deref(), Some("https://x.org/webserver"));
}

#[test]
fn test_registry_dependencies_are_expanded() {
    let graph = resolve(serde_json::json!({"depends": [{"name": "webserver", "version": "0.7"}]})).unwrap();
    let names: Vec<&str> = graph.nodes().iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, ["router", "webserver", "root"]);
    assert_eq!(graph.find("router").unwrap().key.git_ref, "v1.4.2");
}

#[test]
fn test_explicit_fields_win_over_registry() {
    let graph = resolve(serde_json::json!({
        "depends": [{"name": "router", "version": "^1", "git_ref": "my-fork"}]
    }))
    .unwrap();
    assert_eq!(graph.find("router").unwrap().key.git_ref, "my-fork");
}

#[test]
fn test_ignore_registry_requires_source() {
    let error = resolve(serde_json::json!({
        "depends": [{"name": "router", "ignore_registry": true}]
    }))
    .unwrap_err();
    assert_eq!(error.exit_code(), numng::core::EXIT_RESOLUTION);
}

#[test]
fn test_no_matching_version_lists_candidates() {
    let error = resolve(serde_json::json!({"depends": [{"name": "router", "version": "^3"}]})).unwrap_err();
    match error {
        NumngError::NoMatchingVersion {
            available,
            ..
        } => assert!(available.contains(&"2.0.0".to_string())),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_resolution_is_deterministic() {
    let root = serde_json::json!({
        "depends": [
            {"name": "webserver", "version": "0.7"},
            {"name": "router", "version": "2"},
            {"name": "direct", "source_uri": "https://x.org/direct"}
        ]
    });
    let first = resolve(root.clone()).unwrap();
    let second = resolve(root).unwrap();
    let keys = |graph: &ResolvedGraph| graph.nodes().iter().map(|n| n.key.to_string()).collect::<Vec<_>>();
    assert_eq!(keys(&first), keys(&second));
    assert_eq!(first.nodes().iter().filter(|n| n.name == "router").count(), 2);
}
