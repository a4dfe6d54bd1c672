//! Per-package build commands.
//!
//! A package may declare one opaque `build_command`. It runs inside the package
//! directory after the package and all of its prerequisites are in place:
//!
//! - `cargo build --release` runs cargo directly (with `--quiet`)
//! - anything else runs through the configured build shell, by default
//!   `nu --no-history --no-config-file --commands <command>`
//!
//! Only the root package may run commands unless the root sets
//! `allow_build_commands`; a skipped command is reported as
//! [`NumngError::BuildPermissionDenied`], which never fails the run.
//!
//! Builds run every time the pipeline runs; numng does not track whether a
//! package is up to date.

use crate::constants::CARGO_BUILD_COMMAND;
use crate::core::NumngError;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

/// Result of a build step that did not fail.
#[derive(Debug)]
pub enum BuildOutcome {
    /// The package declares no build command.
    NoCommand,
    Built,
    /// The command was skipped; the error is a warning.
    Denied(NumngError),
}

/// Runs build commands with a fixed shell and permission setting.
#[derive(Debug, Clone)]
pub struct BuildRunner {
    shell: Vec<String>,
    allow_dependency_builds: bool,
}

impl BuildRunner {
    /// `shell` is the argv prefix the command is appended to.
    #[must_use]
    pub const fn new(shell: Vec<String>, allow_dependency_builds: bool) -> Self {
        Self {
            shell,
            allow_dependency_builds,
        }
    }

    /// The argv a command is executed with.
    #[must_use]
    pub fn argv(&self, command: &str) -> Vec<String> {
        if command.trim() == CARGO_BUILD_COMMAND {
            return ["cargo", "build", "--release", "--quiet"].map(ToString::to_string).to_vec();
        }
        let mut argv = self.shell.clone();
        argv.push(command.to_string());
        argv
    }

    /// Runs `command` for `package` in `dir`, honoring the permission flag.
    ///
    /// # Errors
    ///
    /// [`NumngError::BuildCommandFailed`] when the command cannot be started or
    /// exits unsuccessfully.
    pub async fn build(
        &self,
        package: &str,
        dir: &Path,
        command: Option<&str>,
        is_root: bool,
    ) -> Result<BuildOutcome, NumngError> {
        let Some(command) = command.filter(|c| !c.trim().is_empty()) else {
            return Ok(BuildOutcome::NoCommand);
        };

        if !is_root && !self.allow_dependency_builds {
            let denied = NumngError::BuildPermissionDenied {
                package: package.to_string(),
                command: command.to_string(),
            };
            tracing::warn!(target: "build", "{denied}");
            return Ok(BuildOutcome::Denied(denied));
        }

        let argv = self.argv(command);
        let Some((program, args)) = argv.split_first() else {
            return Err(NumngError::BuildCommandFailed {
                package: package.to_string(),
                command: command.to_string(),
                code: None,
                stderr: "build shell is empty".to_string(),
            });
        };

        tracing::info!(target: "build", "building {package}");
        tracing::debug!(target: "build", "({package}) running {} in {}", argv.join(" "), dir.display());
        let start = Instant::now();

        let output = Command::new(program)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| NumngError::BuildCommandFailed {
                package: package.to_string(),
                command: command.to_string(),
                code: None,
                stderr: format!("failed to start {program}: {e}"),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            tracing::trace!(target: "build", "({package}) {}", stdout.trim());
        }

        if !output.status.success() {
            return Err(NumngError::BuildCommandFailed {
                package: package.to_string(),
                command: command.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        tracing::debug!(target: "build", "({package}) built in {:.2}s", start.elapsed().as_secs_f64());
        Ok(BuildOutcome::Built)
    }
}
