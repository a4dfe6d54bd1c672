//! numng - NUshell MaNaGer
//!
//! A declarative package manager for nushell. A `numng.json` package file states
//! the packages a project or shell configuration needs; numng converges the
//! filesystem to that state. Several versions of one package can be installed
//! side by side.
//!
//! # Architecture Overview
//!
//! One run of the [`engine`] goes through these stages:
//!
//! 1. [`manifest`] normalizes declarations in numng, nupm or packer.nu format
//!    into one [`manifest::PackageDeclaration`] model
//! 2. [`registry`] answers "best declaration for name and version constraint",
//!    using the selectors of [`version`]
//! 3. [`resolver`] expands the root declaration into a deterministic graph,
//!    deduplicating packages by source identity and git ref
//! 4. [`store`] fetches every package into a content-addressed store: one bare
//!    [`git`] clone per source, one worktree per version
//! 5. [`build`] runs package build commands in dependency order, gated by the
//!    root's `allow_build_commands`
//! 6. [`link`] plans and applies symlinks (`linkin`, bin entries, modules) and
//!    produces the registrations the shell loads
//!
//! Fetch, build and link failures only affect the failing package and the
//! packages that need it; everything else is still installed.
//!
//! # Package File
//!
//! ```json
//! {
//!   "name": "my_config",
//!   "registry": {"source_uri": "https://github.com/nushell/nupm", "package_format": "nupm"},
//!   "depends": [
//!     {"name": "nu-git-manager", "version": "^0.7"},
//!     {"source_uri": "https://github.com/user/helpers", "git_ref": "v2", "shell_config": {"use": "helpers"}}
//!   ]
//! }
//! ```
//!
//! # Supporting Modules
//!
//! - [`cli`] - The `numng` command line
//! - [`config`] - Well-known locations and `config.toml`
//! - [`constants`] - Shared constants
//! - [`core`] - Error taxonomy and exit codes
//! - [`utils`] - Filesystem, path and progress helpers

pub mod build;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod engine;
pub mod git;
pub mod link;
pub mod manifest;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod utils;
pub mod version;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
