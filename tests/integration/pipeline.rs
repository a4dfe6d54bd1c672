//! End-to-end runs of the engine against local git repositories.

use anyhow::Result;
use numng::core::{EXIT_BUILD, EXIT_FETCH, FailureStage, NumngError};
use numng::engine::NodeStatus;
use numng::link::Registration;
use numng::manifest::ShellEntryKind;
use numng::store::{ContentStore, EntryState};
use serde_json::json;

use crate::common::{TestProject, read_installed};

#[tokio::test]
async fn test_install_links_and_registers() -> Result<()> {
    let project = TestProject::new()?;
    let tools = project.create_source_repo(
        "tools",
        &[("tools/mod.nu", "export def hi [] { 'hi' }"), ("greet.nu", "#!/usr/bin/env nu\nprint hello")],
    )?;
    project.write_package(&json!({
        "name": "demo",
        "depends": [{
            "name": "tools",
            "source_uri": tools.file_url(),
            "shell_config": {"use": "tools"},
            "bin": {"greet": "greet.nu"}
        }]
    }))?;

    let mut options = project.engine_options();
    options.home = Some(project.home());
    options.script_file = Some(project.project_dir().join("load.json"));
    let report = project.run_engine(options.clone()).await?;

    assert!(report.is_success(), "statuses: {:?}", report.statuses);
    assert_eq!(report.graph.len(), 2);
    let greet = project.home().join("bin/greet");
    assert!(greet.symlink_metadata()?.file_type().is_symlink());
    assert_eq!(std::fs::read_to_string(&greet)?, "#!/usr/bin/env nu\nprint hello");

    let written: numng::link::Registrations =
        serde_json::from_str(&std::fs::read_to_string(project.project_dir().join("load.json"))?)?;
    assert_eq!(written.entries.len(), 1);
    match &written.entries[0] {
        Registration::Shell {
            package,
            entry,
            path,
        } => {
            assert_eq!(package, "tools");
            assert_eq!(*entry, ShellEntryKind::Use);
            assert!(path.ends_with("tools"));
            assert!(path.join("mod.nu").is_file());
        }
        other => panic!("unexpected registration {other:?}"),
    }

    // Nothing changes on an unchanged graph
    let again = project.run_engine(options).await?;
    assert!(again.is_success());
    assert_eq!(again.link_changes, 0);
    Ok(())
}

#[tokio::test]
async fn test_two_versions_coexist() -> Result<()> {
    let project = TestProject::new()?;
    let lib = project.create_source_repo("lib", &[("version.txt", "one")])?;
    lib.tag("v1")?;
    lib.commit_file("version.txt", "two", "second")?;
    lib.tag("v2")?;
    let app = project.create_source_repo("app", &[("app.nu", "")])?;

    project.write_package(&json!({
        "depends": [
            {"name": "lib", "source_uri": lib.file_url(), "git_ref": "v1"},
            {
                "name": "app",
                "source_uri": app.file_url(),
                "depends": [{"name": "lib", "source_uri": lib.file_url(), "git_ref": "v2"}]
            }
        ]
    }))?;

    let options = project.engine_options();
    let store = ContentStore::new(&options.store_dir);
    let report = project.run_engine(options).await?;
    assert!(report.is_success(), "statuses: {:?}", report.statuses);

    let libs: Vec<_> = report.graph.nodes().iter().filter(|n| n.name == "lib").collect();
    assert_eq!(libs.len(), 2);
    let refs: Vec<&str> = libs.iter().map(|n| n.key.git_ref.as_str()).collect();
    assert!(refs.contains(&"v1") && refs.contains(&"v2"));

    let entries = store.list().await?;
    let lib_entries: Vec<_> = entries.iter().filter(|(_, r)| r.identity.contains("repos/lib")).collect();
    assert_eq!(lib_entries.len(), 2);
    let contents: Vec<String> = lib_entries
        .iter()
        .map(|(_, record)| std::fs::read_to_string(record.path.join("version.txt")).unwrap())
        .collect();
    assert!(contents.contains(&"one".to_string()));
    assert!(contents.contains(&"two".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_diamond_fetches_once() -> Result<()> {
    let project = TestProject::new()?;
    let shared = project.create_source_repo("shared", &[("shared.nu", "")])?;
    let left = project.create_source_repo("left", &[("left.nu", "")])?;
    let right = project.create_source_repo("right", &[("right.nu", "")])?;
    let shared_dep = json!({"name": "shared", "source_uri": shared.file_url()});

    project.write_package(&json!({
        "depends": [
            {"name": "left", "source_uri": left.file_url(), "depends": [shared_dep.clone()]},
            {"name": "right", "source_uri": right.file_url(), "depends": [shared_dep]}
        ]
    }))?;

    let options = project.engine_options();
    let store = ContentStore::new(&options.store_dir);
    let report = project.run_engine(options).await?;
    assert!(report.is_success());
    assert_eq!(report.graph.nodes().iter().filter(|n| n.name == "shared").count(), 1);
    assert_eq!(store.list().await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_fetch_failure_is_isolated() -> Result<()> {
    let project = TestProject::new()?;
    let good = project.create_source_repo("good", &[("good.nu", "")])?;
    let missing = format!("file://{}", project.project_dir().join("no-such-repo").display());

    project.write_package(&json!({
        "depends": [
            {"name": "good", "source_uri": good.file_url(), "bin": {"good": "good.nu"}},
            {"name": "broken", "source_uri": missing},
            {"name": "badref", "source_uri": good.file_url(), "git_ref": "no-such-branch"}
        ]
    }))?;

    let mut options = project.engine_options();
    options.home = Some(project.home());
    let report = project.run_engine(options).await?;

    let status_of = |name: &str| {
        let index = report.graph.nodes().iter().position(|n| n.name == name).unwrap();
        report.statuses[index].clone()
    };
    assert!(status_of("good").is_ready());
    assert_eq!(status_of("broken").stage(), Some(FailureStage::Fetch));
    assert_eq!(status_of("badref").stage(), Some(FailureStage::Fetch));
    assert!(project.home().join("bin/good").exists());

    let failure = report.into_result().unwrap_err();
    assert_eq!(failure.exit_code(), EXIT_FETCH);
    Ok(())
}

#[tokio::test]
async fn test_failed_dependency_blocks_dependents() -> Result<()> {
    let project = TestProject::new()?;
    let parent = project.create_source_repo("parent", &[("parent.nu", "")])?;
    let missing = format!("file://{}", project.project_dir().join("gone").display());

    project.write_package(&json!({
        "depends": [{
            "name": "parent",
            "source_uri": parent.file_url(),
            "depends": [{"name": "gone", "source_uri": missing}]
        }]
    }))?;

    let report = project.run_engine(project.engine_options()).await?;
    let parent_index = report.graph.nodes().iter().position(|n| n.name == "parent").unwrap();
    assert_eq!(
        report.statuses[parent_index],
        NodeStatus::Blocked {
            stage: FailureStage::Fetch,
            by: "gone".to_string(),
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_build_commands_need_permission() -> Result<()> {
    let project = TestProject::new()?;
    let plugin = project.create_source_repo("plugin", &[("plugin.nu", "")])?;
    let package = |allow: bool| {
        json!({
            "allow_build_commands": allow,
            "depends": [{
                "name": "plugin",
                "source_uri": plugin.file_url(),
                "build_command": "echo built > built.txt"
            }]
        })
    };

    project.write_package(&package(false))?;
    let options = project.engine_options();
    let store = ContentStore::new(&options.store_dir);
    let denied = project.run_engine(options.clone()).await?;
    assert!(denied.is_success());
    assert_eq!(denied.warnings.len(), 1);
    assert!(matches!(denied.warnings[0], NumngError::BuildPermissionDenied { .. }));
    assert!(read_installed(&denied, &store, "plugin", "built.txt").is_err());

    project.write_package(&package(true))?;
    let allowed = project.run_engine(options).await?;
    assert!(allowed.is_success());
    assert!(allowed.warnings.is_empty());
    assert_eq!(read_installed(&allowed, &store, "plugin", "built.txt")?.trim(), "built");
    Ok(())
}

#[tokio::test]
async fn test_failing_build_reports_build_stage() -> Result<()> {
    let project = TestProject::new()?;
    let plugin = project.create_source_repo("plugin", &[("plugin.nu", "")])?;
    project.write_package(&json!({
        "allow_build_commands": true,
        "depends": [{"name": "plugin", "source_uri": plugin.file_url(), "build_command": "exit 7"}]
    }))?;

    let report = project.run_engine(project.engine_options()).await?;
    let failure = report.into_result().unwrap_err();
    assert_eq!(failure.exit_code(), EXIT_BUILD);
    assert!(failure.to_string().contains("plugin"));
    Ok(())
}

#[tokio::test]
async fn test_link_in_places_dependency_inside_package() -> Result<()> {
    let project = TestProject::new()?;
    let helper = project.create_source_repo("helper", &[("lib/util.nu", "export def util [] {}")])?;
    let host = project.create_source_repo("host", &[("mod.nu", "use vendor/util.nu")])?;

    project.write_package(&json!({
        "depends": [{
            "name": "host",
            "source_uri": host.file_url(),
            "linkin": {"lib:vendor": {"name": "helper", "source_uri": helper.file_url()}}
        }]
    }))?;

    let options = project.engine_options();
    let store = ContentStore::new(&options.store_dir);
    let report = project.run_engine(options).await?;
    assert!(report.is_success(), "statuses: {:?}", report.statuses);
    assert_eq!(
        read_installed(&report, &store, "host", "vendor/util.nu")?,
        "export def util [] {}"
    );
    Ok(())
}

#[tokio::test]
async fn test_pull_updates_refreshes_entries() -> Result<()> {
    let project = TestProject::new()?;
    let lib = project.create_source_repo("lib", &[("version.txt", "one")])?;
    project.write_package(&json!({
        "depends": [{"name": "lib", "source_uri": lib.file_url()}]
    }))?;

    let options = project.engine_options();
    let store = ContentStore::new(&options.store_dir);
    let first = project.run_engine(options.clone()).await?;
    assert_eq!(read_installed(&first, &store, "lib", "version.txt")?, "one");

    lib.commit_file("version.txt", "two", "update")?;
    let cached = project.run_engine(options.clone()).await?;
    assert_eq!(read_installed(&cached, &store, "lib", "version.txt")?, "one");

    let mut pull = options;
    pull.pull_updates = true;
    let pulled = project.run_engine(pull).await?;
    assert!(pulled.is_success());
    assert_eq!(read_installed(&pulled, &store, "lib", "version.txt")?, "two");
    assert!(store.list().await?.iter().all(|(_, record)| record.state == EntryState::Ready));
    Ok(())
}

#[tokio::test]
async fn test_registry_resolves_by_name() -> Result<()> {
    let project = TestProject::new()?;
    let webserver = project.create_source_repo("webserver", &[("webserver.nu", "")])?;
    webserver.tag("v0.8.1")?;
    webserver.commit_file("webserver.nu", "# next", "next")?;

    let table = json!({
        "_": {"source_uri": webserver.file_url(), "bin": {"webserver": "webserver.nu"}},
        "latest": "0.8",
        "0.8": "0.8.1",
        "0.8.1": {"git_ref": "v0.8.1"}
    });
    let registry = project.create_source_repo(
        "registry",
        &[("webserver.json", &serde_json::to_string_pretty(&table)?)],
    )?;

    project.write_package(&json!({
        "registry": {"source_uri": registry.file_url(), "package_format": "numng"},
        "depends": [{"name": "webserver", "version": "latest"}]
    }))?;

    let mut options = project.engine_options();
    options.home = Some(project.home());
    let report = project.run_engine(options).await?;
    assert!(report.is_success(), "statuses: {:?}", report.statuses);

    let node = report.graph.find("webserver").unwrap();
    assert_eq!(node.key.git_ref, "v0.8.1");
    assert_eq!(node.registry_version.as_deref(), Some("0.8.1"));
    assert_eq!(std::fs::read_to_string(project.home().join("bin/webserver"))?, "");
    Ok(())
}

#[tokio::test]
async fn test_unknown_package_aborts() -> Result<()> {
    let project = TestProject::new()?;
    let registry = project.create_source_repo("registry", &[("other.json", "{}")])?;
    project.write_package(&json!({
        "registry": {"source_uri": registry.file_url(), "package_format": "numng"},
        "depends": [{"name": "missing"}]
    }))?;

    let error = project.run_engine(project.engine_options()).await.unwrap_err();
    assert!(matches!(
        numng::core::find_numng_error(&error),
        Some(NumngError::PackageNotFound { .. })
    ));
    assert_eq!(numng::core::exit_code_for(&error), numng::core::EXIT_RESOLUTION);
    Ok(())
}

fn status_of(report: &numng::engine::EngineReport, name: &str) -> NodeStatus {
    let index = report.graph.nodes().iter().position(|n| n.name == name).unwrap();
    report.statuses[index].clone()
}

#[tokio::test]
async fn test_failed_build_spares_independent_sibling() -> Result<()> {
    let project = TestProject::new()?;
    let broken = project.create_source_repo("broken", &[("broken.nu", "")])?;
    let app = project.create_source_repo("app", &[("app.nu", "")])?;
    let good = project.create_source_repo("good", &[("good.nu", "")])?;
    let package = |allow: bool| {
        json!({
            "allow_build_commands": allow,
            "depends": [
                {
                    "name": "app",
                    "source_uri": app.file_url(),
                    "shell_config": {"use": "app.nu"},
                    "depends": [{"name": "broken", "source_uri": broken.file_url(), "build_command": "exit 3"}]
                },
                {
                    "name": "good",
                    "source_uri": good.file_url(),
                    "bin": {"good": "good.nu"},
                    "shell_config": {"use": "good.nu"}
                }
            ]
        })
    };

    let mut options = project.engine_options();
    options.home = Some(project.home());
    options.script_file = Some(project.project_dir().join("load.json"));
    let read_registered = || -> Result<Vec<String>> {
        let written: numng::link::Registrations =
            serde_json::from_str(&std::fs::read_to_string(project.project_dir().join("load.json"))?)?;
        Ok(written
            .entries
            .iter()
            .map(|entry| match entry {
                Registration::Shell {
                    package,
                    ..
                }
                | Registration::LibDir {
                    package,
                    ..
                }
                | Registration::Plugin {
                    package,
                    ..
                } => package.clone(),
            })
            .collect())
    };

    project.write_package(&package(true))?;
    let failed = project.run_engine(options.clone()).await?;
    assert_eq!(status_of(&failed, "broken").stage(), Some(FailureStage::Build));
    assert_eq!(
        status_of(&failed, "app"),
        NodeStatus::Blocked {
            stage: FailureStage::Build,
            by: "broken".to_string(),
        }
    );
    assert!(status_of(&failed, "good").is_ready());
    assert!(project.home().join("bin/good").exists());
    assert_eq!(read_registered()?, vec!["good"]);

    project.write_package(&package(false))?;
    let denied = project.run_engine(options).await?;
    assert!(denied.is_success(), "statuses: {:?}", denied.statuses);
    assert_eq!(denied.warnings.len(), 1);
    assert!(project.home().join("bin/good").exists());
    let mut registered = read_registered()?;
    registered.sort();
    assert_eq!(registered, vec!["app", "good"]);
    Ok(())
}

#[tokio::test]
async fn test_link_conflict_fails_only_the_conflicting_version() -> Result<()> {
    let project = TestProject::new()?;
    let lib = project.create_source_repo("lib", &[("lib.nu", "one")])?;
    lib.tag("v1")?;
    lib.commit_file("lib.nu", "two", "second")?;
    lib.tag("v2")?;
    let app = project.create_source_repo("app", &[("app.nu", "")])?;

    project.write_package(&json!({
        "depends": [
            {"name": "lib", "source_uri": lib.file_url(), "git_ref": "v1", "shell_config": {"use": "lib.nu"}},
            {
                "name": "app",
                "source_uri": app.file_url(),
                "depends": [{
                    "name": "lib",
                    "source_uri": lib.file_url(),
                    "git_ref": "v2",
                    "shell_config": {"use": "lib.nu"},
                    "bin": {"tool": "lib.nu"}
                }]
            }
        ]
    }))?;
    std::fs::create_dir_all(project.home().join("bin"))?;
    std::fs::write(project.home().join("bin/tool"), "foreign")?;

    let mut options = project.engine_options();
    options.home = Some(project.home());
    let report = project.run_engine(options).await?;

    let status_at = |git_ref: &str| {
        let index = report.graph.nodes().iter().position(|n| n.key.git_ref == git_ref).unwrap();
        report.statuses[index].clone()
    };
    assert!(status_at("v1").is_ready());
    assert_eq!(status_at("v2").stage(), Some(FailureStage::Link));
    assert_eq!(std::fs::read_to_string(project.home().join("bin/tool"))?, "foreign");

    assert_eq!(report.registrations.entries.len(), 1);
    match &report.registrations.entries[0] {
        Registration::Shell {
            package,
            path,
            ..
        } => {
            assert_eq!(package, "lib");
            assert_eq!(std::fs::read_to_string(path)?, "one");
        }
        other => panic!("unexpected registration {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_failed_rebuild_keeps_previous_links() -> Result<()> {
    let project = TestProject::new()?;
    let good = project.create_source_repo("good", &[("good.nu", "print good")])?;
    let other = project.create_source_repo("other", &[("other.nu", "")])?;
    let package = |build: &str, with_other: bool| {
        let mut depends = vec![json!({
            "name": "good",
            "source_uri": good.file_url(),
            "bin": {"good": "good.nu"},
            "build_command": build
        })];
        if with_other {
            depends.push(json!({"name": "other", "source_uri": other.file_url(), "bin": {"other": "other.nu"}}));
        }
        json!({"allow_build_commands": true, "depends": depends})
    };

    let mut options = project.engine_options();
    options.home = Some(project.home());
    let good_bin = project.home().join("bin/good");

    project.write_package(&package("true", true))?;
    assert!(project.run_engine(options.clone()).await?.is_success());
    assert!(good_bin.exists());

    project.write_package(&package("exit 1", false))?;
    let failed = project.run_engine(options.clone()).await?;
    assert_eq!(status_of(&failed, "good").stage(), Some(FailureStage::Build));
    assert!(good_bin.exists());
    assert_eq!(std::fs::read_to_string(&good_bin)?, "print good");
    assert!(!project.home().join("bin/other").exists());

    project.write_package(&json!({"depends": []}))?;
    assert!(project.run_engine(options).await?.is_success());
    assert!(!good_bin.exists());
    Ok(())
}

#[tokio::test]
async fn test_dependencies_from_package_metadata_are_installed() -> Result<()> {
    let project = TestProject::new()?;
    let helper = project.create_source_repo("helper", &[("helper.nu", "print helper")])?;
    let metadata = json!({
        "name": "app",
        "depends": [{"name": "helper", "source_uri": helper.file_url(), "bin": {"helper": "helper.nu"}}]
    });
    let app = project.create_source_repo(
        "app",
        &[("app.nu", ""), ("numng.json", &serde_json::to_string_pretty(&metadata)?)],
    )?;

    project.write_package(&json!({
        "depends": [{"name": "app", "source_uri": app.file_url()}]
    }))?;

    let mut options = project.engine_options();
    options.home = Some(project.home());
    let report = project.run_engine(options).await?;
    assert!(report.is_success(), "statuses: {:?}", report.statuses);

    let names: Vec<&str> = report.graph.nodes().iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["helper", "app", "root"]);
    assert_eq!(std::fs::read_to_string(project.home().join("bin/helper"))?, "print helper");
    Ok(())
}
