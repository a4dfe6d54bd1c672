//! Builder for `git` invocations with consistent logging and error mapping.
//!
//! Every git call in numng goes through [`GitCommand`]: it runs the binary
//! located with `which`, passes the repository with `-C`, disables interactive
//! credential prompts, captures output and maps failures onto [`NumngError`]:
//!
//! - `clone`/`fetch` failures become [`NumngError::Fetch`], or
//!   [`NumngError::RefNotFound`] when the remote reports a missing ref
//! - everything else becomes [`NumngError::GitCommand`]
//!
//! No timeout is imposed; a hanging remote is the user's to interrupt.

use crate::core::NumngError;
use crate::utils::platform::find_git;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;

/// Phrases git uses when the remote lacks a requested ref.
const MISSING_REF_MARKERS: &[&str] = &[
    "couldn't find remote ref",
    "not our ref",
    "unadvertised object",
    "no such remote ref",
    "invalid refspec",
];

fn git_binary() -> Result<PathBuf, NumngError> {
    static GIT: OnceLock<Result<PathBuf, NumngError>> = OnceLock::new();
    GIT.get_or_init(find_git).clone()
}

/// Fluent builder for one git command.
///
/// ```rust,ignore
/// let commit = GitCommand::rev_parse("FETCH_HEAD^{commit}")
///     .current_dir(&bare_repo)
///     .with_context("webserver")
///     .execute_stdout()
///     .await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct GitCommand {
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    env_vars: Vec<(String, String)>,
    /// Label prefixed to log lines (usually the package name)
    context: Option<String>,
    /// Remote URI for fetch/clone error messages
    source_uri: Option<String>,
    /// Ref being fetched, for [`NumngError::RefNotFound`]
    reference: Option<String>,
}

/// Captured output of a successful command.
#[derive(Debug, Clone)]
pub struct GitCommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl GitCommand {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs git against the repository at `dir` (`git -C <dir>`).
    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Sets a label included in log lines, to tell concurrent operations apart.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Names the remote a fetch talks to, for error messages.
    #[must_use]
    pub fn with_source(mut self, source_uri: impl Into<String>) -> Self {
        self.source_uri = Some(super::strip_auth_from_url(&source_uri.into()));
        self
    }

    /// The arguments after `-C <dir>`.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    fn label(&self) -> String {
        self.context.as_ref().map(|ctx| format!("({ctx}) ")).unwrap_or_default()
    }

    /// Executes the command and returns its captured output.
    pub async fn execute(self) -> Result<GitCommandOutput, NumngError> {
        let git = git_binary()?;
        let mut full_args = Vec::new();
        if let Some(dir) = &self.current_dir {
            full_args.push("-C".to_string());
            full_args.push(dir.display().to_string());
        }
        full_args.extend(self.args.iter().cloned());

        let label = self.label();
        let printable: Vec<String> = full_args.iter().map(|a| super::strip_auth_from_url(a)).collect();
        tracing::debug!(target: "git", "{label}Executing command: git {}", printable.join(" "));
        let start = std::time::Instant::now();

        let mut cmd = Command::new(&git);
        cmd.args(&full_args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.env_vars {
            tracing::trace!(target: "git", "Setting env var: {key}={value}");
            cmd.env(key, value);
        }

        let output = cmd.output().await.map_err(|e| NumngError::GitCommand {
            operation: self.operation(),
            stderr: format!("failed to run {}: {e}", git.display()),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            tracing::debug!(
                target: "git",
                "{label}Command failed with exit code {:?}: {}",
                output.status.code(),
                stderr.trim()
            );
            return Err(self.failure(if stderr.trim().is_empty() { stdout } else { stderr }));
        }

        if !stdout.trim().is_empty() {
            tracing::trace!(target: "git", "{label}{}", stdout.trim());
        }
        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::debug!(
                target: "git::perf",
                "{label}Git {} took {:.2}s",
                self.operation(),
                elapsed.as_secs_f64()
            );
        }

        Ok(GitCommandOutput {
            stdout,
            stderr,
        })
    }

    /// Executes the command and returns trimmed stdout.
    pub async fn execute_stdout(self) -> Result<String, NumngError> {
        Ok(self.execute().await?.stdout.trim().to_string())
    }

    /// Executes the command, discarding output.
    pub async fn execute_success(self) -> Result<(), NumngError> {
        self.execute().await.map(|_| ())
    }

    fn operation(&self) -> String {
        self.args.iter().take(2).cloned().collect::<Vec<_>>().join(" ")
    }

    fn failure(&self, stderr: String) -> NumngError {
        let stderr = stderr.trim().to_string();
        let is_transfer = matches!(self.args.first().map(String::as_str), Some("clone" | "fetch"));
        if !is_transfer {
            return NumngError::GitCommand {
                operation: self.operation(),
                stderr,
            };
        }

        let source_uri = self.source_uri.clone().unwrap_or_else(|| "<unknown>".to_string());
        let lowered = stderr.to_lowercase();
        match &self.reference {
            Some(reference) if MISSING_REF_MARKERS.iter().any(|m| lowered.contains(m)) => {
                NumngError::RefNotFound {
                    source_uri,
                    reference: reference.clone(),
                }
            }
            _ => NumngError::Fetch {
                source_uri,
                reason: stderr,
            },
        }
    }
}

// Constructors for the operations the store performs.
impl GitCommand {
    /// `git clone --bare --depth=1 <url> <target>`
    #[must_use]
    pub fn clone_bare(url: &str, target: impl AsRef<Path>) -> Self {
        Self::new()
            .args(["clone", "--bare", "--depth=1", url])
            .arg(target.as_ref().display().to_string())
            .with_source(url)
    }

    /// `git fetch --depth=1 --tags origin <ref>`
    #[must_use]
    pub fn fetch_ref(reference: &str) -> Self {
        let mut cmd = Self::new().args(["fetch", "--depth=1", "--tags", "origin", reference]);
        cmd.reference = Some(reference.to_string());
        cmd
    }

    /// `git fetch --unshallow --tags origin`
    #[must_use]
    pub fn fetch_unshallow() -> Self {
        Self::new().args(["fetch", "--unshallow", "--tags", "origin"])
    }

    /// `git fetch --tags origin`
    #[must_use]
    pub fn fetch_tags() -> Self {
        Self::new().args(["fetch", "--tags", "origin"])
    }

    /// `git rev-parse --verify <rev>`
    #[must_use]
    pub fn rev_parse(rev: &str) -> Self {
        Self::new().args(["rev-parse", "--verify", "--quiet", rev])
    }

    /// `git worktree add --detach <path> <commit>`
    #[must_use]
    pub fn worktree_add_detached(path: impl AsRef<Path>, commit: &str) -> Self {
        Self::new()
            .args(["worktree", "add", "--detach"])
            .arg(path.as_ref().display().to_string())
            .arg(commit)
    }

    /// `git worktree remove --force <path>`
    #[must_use]
    pub fn worktree_remove(path: impl AsRef<Path>) -> Self {
        Self::new().args(["worktree", "remove", "--force"]).arg(path.as_ref().display().to_string())
    }

    /// `git worktree prune`
    #[must_use]
    pub fn worktree_prune() -> Self {
        Self::new().args(["worktree", "prune"])
    }

    /// `git clean -fdx -e <preserved>`
    #[must_use]
    pub fn clean(preserved: &str) -> Self {
        Self::new().args(["clean", "-fdx", "-e", preserved])
    }

    /// `git checkout --detach --force <commit>`
    #[must_use]
    pub fn checkout_detached(commit: &str) -> Self {
        Self::new().args(["checkout", "--detach", "--force", commit])
    }
}
