//! Git test helper utilities
//!
//! Builds small local repositories that tests reference through `file://` URLs.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Git command builder for tests
///
/// Wraps `git` invocations on one working repository with error reporting.
pub struct TestGit {
    repo_path: PathBuf,
}

impl TestGit {
    fn run_git_command(&self, args: &[&str], action: &str) -> Result<std::process::Output> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .with_context(|| action.to_string())?;

        if !output.status.success() {
            bail!("{} failed: {}", action, String::from_utf8_lossy(&output.stderr));
        }

        Ok(output)
    }

    /// Create a new TestGit instance for the given repository path
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    /// Creates `repo_path`, initializes it on branch `main`, writes `files` and
    /// commits them.
    pub fn create_package(repo_path: impl Into<PathBuf>, files: &[(&str, &str)]) -> Result<Self> {
        let git = Self::new(repo_path);
        std::fs::create_dir_all(&git.repo_path)
            .with_context(|| format!("Failed to create {}", git.repo_path.display()))?;
        git.init()?;
        git.config_user()?;
        for (path, content) in files {
            git.write_file(path, content)?;
        }
        git.add_all()?;
        git.commit("initial")?;
        Ok(git)
    }

    /// Initialize a new git repository with `main` as the initial branch
    pub fn init(&self) -> Result<()> {
        self.run_git_command(&["init", "--quiet"], "Failed to initialize git repository")?;
        self.run_git_command(
            &["symbolic-ref", "HEAD", "refs/heads/main"],
            "Failed to set initial branch",
        )?;
        Ok(())
    }

    /// Configure git user for tests
    pub fn config_user(&self) -> Result<()> {
        self.run_git_command(
            &["config", "user.email", "test@numng.example"],
            "Failed to configure git user email",
        )?;
        self.run_git_command(&["config", "user.name", "Test User"], "Failed to configure git user name")?;
        self.run_git_command(&["config", "commit.gpgsign", "false"], "Failed to disable signing")?;
        Ok(())
    }

    /// Writes `content` to `relative` inside the repository, creating parents.
    pub fn write_file(&self, relative: &str, content: &str) -> Result<()> {
        let path = self.repo_path.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Add all files to staging
    pub fn add_all(&self) -> Result<()> {
        self.run_git_command(&["add", "--all"], "Failed to add files")?;
        Ok(())
    }

    /// Create a commit
    pub fn commit(&self, message: &str) -> Result<()> {
        self.run_git_command(&["commit", "--quiet", "-m", message], "Failed to commit")?;
        Ok(())
    }

    /// Create a tag at HEAD
    pub fn tag(&self, tag_name: &str) -> Result<()> {
        self.run_git_command(&["tag", tag_name], &format!("Failed to create tag {tag_name}"))?;
        Ok(())
    }

    /// Writes, stages and commits in one step.
    pub fn commit_file(&self, relative: &str, content: &str, message: &str) -> Result<()> {
        self.write_file(relative, content)?;
        self.add_all()?;
        self.commit(message)
    }

    /// Checkout a branch, tag or commit
    pub fn checkout(&self, ref_name: &str) -> Result<()> {
        self.run_git_command(&["checkout", "--quiet", ref_name], &format!("Failed to checkout {ref_name}"))?;
        Ok(())
    }

    /// Create and checkout a new branch
    pub fn create_branch(&self, branch_name: &str) -> Result<()> {
        self.run_git_command(
            &["checkout", "--quiet", "-b", branch_name],
            &format!("Failed to create branch {branch_name}"),
        )?;
        Ok(())
    }

    /// Full hash of HEAD
    pub fn rev_parse_head(&self) -> Result<String> {
        let output = self.run_git_command(&["rev-parse", "HEAD"], "Failed to get HEAD commit")?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Get the repository path
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// `file://` URL of the repository
    pub fn file_url(&self) -> String {
        format!("file://{}", self.repo_path.display())
    }
}
