//! Common test utilities for numng integration tests
//!
//! [`TestProject`] owns a temporary directory holding a project, its source
//! repositories and an isolated numng base directory (store, home, config).

// Not every suite uses every helper
#![allow(dead_code)]

use anyhow::Result;
use assert_cmd::Command;
use numng::config::{GlobalConfig, NumngPaths};
use numng::engine::{EngineOptions, EngineReport};
use numng::test_utils::TestGit;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestProject {
    _temp: TempDir,
    root: PathBuf,
    paths: NumngPaths,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        // Canonical so paths compare equal to what the engine records
        let root = temp.path().canonicalize()?;
        std::fs::create_dir_all(root.join("project"))?;
        let paths = NumngPaths::under(&root.join("numng"));
        Ok(Self {
            _temp: temp,
            root,
            paths,
        })
    }

    pub fn project_dir(&self) -> PathBuf {
        self.root.join("project")
    }

    pub fn package_file(&self) -> PathBuf {
        self.project_dir().join("numng.json")
    }

    pub fn store_dir(&self) -> &Path {
        &self.paths.store_dir
    }

    /// Managed home with enough path depth to pass validation.
    pub fn home(&self) -> PathBuf {
        self.root.join("numng/homes/default")
    }

    pub fn paths(&self) -> &NumngPaths {
        &self.paths
    }

    /// Creates a committed repository under `repos/<name>`.
    pub fn create_source_repo(&self, name: &str, files: &[(&str, &str)]) -> Result<TestGit> {
        TestGit::create_package(self.root.join("repos").join(name), files)
    }

    pub fn write_package(&self, package: &Value) -> Result<()> {
        std::fs::write(self.package_file(), serde_json::to_string_pretty(package)?)?;
        Ok(())
    }

    /// Engine options with an isolated store and `sh -c` as build shell.
    pub fn engine_options(&self) -> EngineOptions {
        let config = GlobalConfig {
            max_parallel: Some(4),
            build_shell: vec!["sh".to_string(), "-c".to_string()],
            ..GlobalConfig::default()
        };
        EngineOptions::new(self.package_file(), self.store_dir(), &config)
    }

    pub async fn run_engine(&self, options: EngineOptions) -> Result<EngineReport> {
        numng::engine::Engine::new(options).run().await
    }

    /// Runs the `numng` binary in the project directory with isolated locations.
    pub fn run_numng(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        Command::cargo_bin("numng")
            .expect("numng binary is built for integration tests")
            .args(args)
            .current_dir(self.project_dir())
            .env("NUMNG_HOME", &self.paths.base_dir)
            .env("NUMNG_STORE_DIR", &self.paths.store_dir)
            .env("NUMNG_CONFIG_DIR", &self.paths.nu_config_dir)
            .env_remove("RUST_LOG")
            .assert()
    }

    /// Writes `<base>/config.toml` so binary runs build with `sh -c`.
    pub fn write_sh_config(&self) -> Result<()> {
        std::fs::create_dir_all(&self.paths.base_dir)?;
        std::fs::write(self.paths.config_file(), "build_shell = [\"sh\", \"-c\"]\n")?;
        Ok(())
    }
}

/// Content of `relative` inside the store worktree of `name` in `report`.
pub fn read_installed(report: &EngineReport, store: &numng::store::ContentStore, name: &str, relative: &str) -> Result<String> {
    let node = report
        .graph
        .nodes()
        .iter()
        .find(|node| node.name == name)
        .ok_or_else(|| anyhow::anyhow!("no node named {name}"))?;
    let key = numng::store::ContentStore::store_key(&node.key.identity, &node.key.git_ref);
    Ok(std::fs::read_to_string(store.worktree_dir(&key).join(relative))?)
}
