//! Package metadata feeding the link planner.

use numng::config::BinMode;
use numng::link::{self, Artifact, LinkAction, LinkOptions, PackageLocation, Registration};
use numng::manifest::{self, PackageDeclaration, PackageFormat, ShellEntryKind};
use numng::registry::RegistryIndex;
use numng::resolver::{ResolvedGraph, Resolver};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn single_dependency_graph(format: PackageFormat) -> ResolvedGraph {
    let root = PackageDeclaration {
        depends: Some(vec![PackageDeclaration {
            source_uri: Some("https://x.org/pkg".to_string()),
            package_format: Some(format),
            ..PackageDeclaration::named("pkg")
        }]),
        ..PackageDeclaration::named("root")
    };
    Resolver::new(&RegistryIndex::default()).resolve(&root, Path::new("/project")).unwrap()
}

/// Locations with the package's own metadata merged in, as the engine does.
fn locations(graph: &ResolvedGraph, dir: &Path, format: PackageFormat) -> Vec<Option<PackageLocation>> {
    let mut declaration = graph.nodes()[0].declaration.clone();
    if let Some(metadata) = manifest::read_package_metadata(dir, format).unwrap() {
        declaration.fill_materialization(&metadata);
    }
    vec![
        Some(PackageLocation {
            dir: dir.to_path_buf(),
            declaration,
        }),
        None,
    ]
}

#[test]
fn test_nupm_module_package() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("nupm.nuon"),
        r#"{"name": "pkg", "type": "module", "scripts": ["tools/pkg-cli.nu"]}"#,
    )
    .unwrap();
    let graph = single_dependency_graph(PackageFormat::Nupm);
    let home = PathBuf::from("/home/u/.local/numng-home");
    let options = LinkOptions {
        home: Some(home.clone()),
        bin_mode: BinMode::Copy,
    };

    let plan = link::plan(&graph, &locations(&graph, temp.path(), PackageFormat::Nupm), &options);
    assert!(plan.failures.is_empty());
    assert!(plan.actions.contains(&LinkAction::Copy {
        node: 0,
        source: temp.path().join("tools/pkg-cli.nu"),
        target: home.join("bin/pkg-cli.nu"),
    }));
    assert!(plan.actions.contains(&LinkAction::Symlink {
        node: 0,
        source: temp.path().join("pkg"),
        target: home.join("modules/pkg"),
    }));

    let registrations = plan.registrations_without(&BTreeSet::new());
    assert_eq!(registrations.for_artifact(Artifact::Script).entries.len(), 1);
    assert!(registrations.for_artifact(Artifact::Overlay).entries.is_empty());
    assert_eq!(plan.unavailable, BTreeSet::from([1]));
}

#[test]
fn test_packer_package_discovers_files() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("meta.nuon"),
        r#"{"name": "pkg", "prefixed_modules": ["pkg/mod.nu"]}"#,
    )
    .unwrap();
    std::fs::write(temp.path().join("env.nu"), "").unwrap();
    std::fs::write(temp.path().join("init.nu"), "").unwrap();

    let graph = single_dependency_graph(PackageFormat::Packer);
    let options = LinkOptions {
        home: None,
        bin_mode: BinMode::Symlink,
    };
    let plan = link::plan(&graph, &locations(&graph, temp.path(), PackageFormat::Packer), &options);

    assert!(plan.actions.is_empty());
    let kinds: Vec<ShellEntryKind> = plan
        .registrations
        .iter()
        .filter_map(|(_, entry)| match entry {
            Registration::Shell {
                entry,
                ..
            } => Some(*entry),
            _ => None,
        })
        .collect();
    assert!(kinds.contains(&ShellEntryKind::Use));
    assert!(kinds.contains(&ShellEntryKind::UseAll));
    assert!(kinds.contains(&ShellEntryKind::SourceEnv));
}

#[test]
fn test_declared_fields_beat_metadata() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("numng.json"), r#"{"shell_config": {"use": "from-metadata.nu"}}"#).unwrap();

    let root = manifest::numng::parse_root(&serde_json::json!({
        "depends": [{
            "name": "pkg",
            "source_uri": "https://x.org/pkg",
            "shell_config": {"source": "declared.nu"}
        }]
    }))
    .unwrap();
    let graph = Resolver::new(&RegistryIndex::default()).resolve(&root, Path::new("/project")).unwrap();
    let options = LinkOptions {
        home: None,
        bin_mode: BinMode::Symlink,
    };
    let plan = link::plan(&graph, &locations(&graph, temp.path(), PackageFormat::Auto), &options);

    assert_eq!(
        plan.registrations,
        vec![(0, Registration::Shell {
            package: "pkg".to_string(),
            entry: ShellEntryKind::Source,
            path: temp.path().join("declared.nu"),
        })]
    );
}
