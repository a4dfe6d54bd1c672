//! The `numng` binary: flags, output and exit codes.

use anyhow::Result;
use predicates::prelude::*;
use serde_json::json;

use crate::common::TestProject;

#[test]
fn test_init_then_refuse_overwrite() -> Result<()> {
    let project = TestProject::new()?;
    project.run_numng(&["init"]).success().stdout(predicate::str::contains("Initialized"));

    let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(project.package_file())?)?;
    assert_eq!(written["registry"][0]["source_uri"], "https://github.com/nushell/nupm");

    project.run_numng(&["i"]).failure().code(1).stderr(predicate::str::contains("already exists"));
    project.run_numng(&["init", "--force"]).success();
    Ok(())
}

#[test]
fn test_init_nu_config() -> Result<()> {
    let project = TestProject::new()?;
    project.run_numng(&["-n", "init"]).success();

    let package_file = project.paths().nu_config_package_file();
    let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(package_file)?)?;
    assert_eq!(written["depends"][0]["name"], "numng");
    Ok(())
}

#[test]
fn test_build_writes_script_file() -> Result<()> {
    let project = TestProject::new()?;
    let tools = project.create_source_repo("tools", &[("tools.nu", "export def t [] {}")])?;
    project.write_package(&json!({
        "depends": [{"name": "tools", "source_uri": tools.file_url(), "shell_config": {"use_all": "tools.nu"}}]
    }))?;

    project
        .run_numng(&["build", "-s", "load.json"])
        .success()
        .stdout(predicate::str::contains("2/2 packages ready"));

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(project.project_dir().join("load.json"))?)?;
    assert_eq!(written["entries"][0]["kind"], "shell");
    assert_eq!(written["entries"][0]["entry"], "use_all");

    project.run_numng(&["store", "list"]).success().stdout(predicate::str::contains("ready"));
    Ok(())
}

#[test]
fn test_exit_codes_per_stage() -> Result<()> {
    let project = TestProject::new()?;
    project.write_sh_config()?;

    project.write_package(&json!({"depends": [{"name": "x", "source_uri": "file:///x", "version": "^^1"}]}))?;
    project.run_numng(&["b"]).code(2);

    let missing = format!("file://{}", project.project_dir().join("missing").display());
    project.write_package(&json!({"depends": [{"name": "missing", "source_uri": missing}]}))?;
    project.run_numng(&["b", "-q"]).code(3).stderr(predicate::str::contains("missing"));

    let failing = project.create_source_repo("failing", &[("f.nu", "")])?;
    project.write_package(&json!({
        "allow_build_commands": true,
        "depends": [{"name": "failing", "source_uri": failing.file_url(), "build_command": "exit 1"}]
    }))?;
    project.run_numng(&["b", "-q"]).code(4);
    Ok(())
}

#[test]
fn test_link_conflict_exit_code_and_force() -> Result<()> {
    let project = TestProject::new()?;
    let tool = project.create_source_repo("tool", &[("tool.nu", "")])?;
    project.write_package(&json!({
        "depends": [{"name": "tool", "source_uri": tool.file_url(), "bin": {"tool": "tool.nu"}}]
    }))?;
    let home = project.home();
    std::fs::create_dir_all(home.join("bin"))?;
    std::fs::write(home.join("bin/tool"), "not managed")?;
    let home_arg = home.display().to_string();

    project.run_numng(&["build", "--nupm-home", &home_arg]).code(5);
    assert_eq!(std::fs::read_to_string(home.join("bin/tool"))?, "not managed");

    project.run_numng(&["build", "--nupm-home", &home_arg, "--force"]).success();
    assert!(home.join("bin/tool").symlink_metadata()?.file_type().is_symlink());
    Ok(())
}

#[test]
fn test_shallow_home_rejected() -> Result<()> {
    let project = TestProject::new()?;
    project.write_package(&json!({}))?;
    project.run_numng(&["build", "--nupm-home", "/tmp"]).code(1);
    Ok(())
}

#[test]
fn test_store_gc_and_clean() -> Result<()> {
    let project = TestProject::new()?;
    let tools = project.create_source_repo("tools", &[("tools.nu", "")])?;
    project.write_package(&json!({"depends": [{"name": "tools", "source_uri": tools.file_url()}]}))?;
    project.run_numng(&["build"]).success();

    project.run_numng(&["store", "gc"]).success().stdout(predicate::str::contains("Removed 0"));
    project.run_numng(&["store", "clean"]).success();
    assert!(!project.store_dir().join("worktrees").exists());
    project.run_numng(&["store", "list"]).success().stdout(predicate::str::contains("empty"));
    Ok(())
}
