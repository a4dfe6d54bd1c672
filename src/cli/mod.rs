//! Command-line interface for numng.
//!
//! # Available Commands
//!
//! - `build` (`b`) - Install everything the package file declares
//! - `init` (`i`) - Write a starter package file
//! - `store` - Inspect and prune the content store
//!
//! # Global Options
//!
//! - `-v/--verbose` - Debug output
//! - `-q/--quiet` - Errors only, no progress bar
//! - `-p/--package-file` - Package file to use instead of `./numng.json`
//! - `-n/--nu-config` - Operate on the nushell configuration package
//!
//! ```bash
//! # Install the project's packages and write a load script
//! numng build -s load.nu
//!
//! # Update the packages loaded by the nushell configuration
//! numng -n build -u
//! ```

mod build;
mod init;
mod store;

pub use init::default_package;

use crate::config::NumngPaths;
use crate::constants::PACKAGE_FILE_NAME;
use crate::utils::{absolutize, resolve_path};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub paths: NumngPaths,
    /// Absolute path of the package file in use
    pub package_file: PathBuf,
    pub nu_config: bool,
    pub quiet: bool,
}

/// Expands and absolutizes a path given on the command line.
pub(crate) fn user_path(raw: &str) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    Ok(absolutize(&resolve_path(raw)?, &cwd))
}

#[derive(Parser, Debug)]
#[command(
    name = "numng",
    about = "NUshell MaNaGer - declarative, multi-version package management for nushell",
    version,
    long_about = "numng installs the nushell packages declared in a numng.json file. \
                  Several versions of one package can be installed side by side."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Package file to use instead of ./numng.json
    #[arg(short, long, global = true, conflicts_with = "nu_config")]
    package_file: Option<String>,

    /// Use the nushell configuration package file, home and load script
    #[arg(short, long, global = true)]
    nu_config: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch, build and link every declared package
    #[command(visible_alias = "b")]
    Build(build::BuildCommand),

    /// Create a package file
    #[command(visible_alias = "i")]
    Init(init::InitCommand),

    /// Manage the content store
    Store(store::StoreCommand),
}

impl Cli {
    /// Log filter for the verbosity flags; `RUST_LOG` takes precedence.
    #[must_use]
    pub const fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }

    /// Runs the selected subcommand.
    pub async fn execute(self) -> Result<()> {
        let paths = NumngPaths::from_env()?;
        let context = self.context(paths)?;
        tracing::debug!(target: "cli", "using package file {}", context.package_file.display());

        match self.command {
            Commands::Build(cmd) => cmd.execute(&context).await,
            Commands::Init(cmd) => cmd.execute(&context).await,
            Commands::Store(cmd) => cmd.execute(&context).await,
        }
    }

    fn context(&self, paths: NumngPaths) -> Result<CommandContext> {
        let package_file = if self.nu_config {
            paths.nu_config_package_file()
        } else {
            user_path(self.package_file.as_deref().unwrap_or(PACKAGE_FILE_NAME))?
        };
        Ok(CommandContext {
            paths,
            package_file,
            nu_config: self.nu_config,
            quiet: self.quiet,
        })
    }
}
