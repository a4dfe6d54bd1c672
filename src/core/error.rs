//! Error handling for numng
//!
//! This module provides the error taxonomy of the engine and user-friendly error
//! reporting for the CLI. It follows two principles:
//! 1. **Strongly-typed errors** so callers (and tests) can match on the exact failure
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Error Categories
//!
//! - **Declarations**: [`NumngError::SpecParse`], [`NumngError::UnsupportedFormat`]
//! - **Versions**: [`NumngError::InvalidVersionSyntax`], [`NumngError::NoMatchingVersion`]
//! - **Registries**: [`NumngError::AliasCycle`], [`NumngError::PackageNotFound`],
//!   [`NumngError::InvalidRegistryFormat`]
//! - **Graph**: [`NumngError::CyclicDependency`]
//! - **Store**: [`NumngError::Fetch`], [`NumngError::RefNotFound`], [`NumngError::GitCommand`]
//! - **Build**: [`NumngError::BuildPermissionDenied`] (never fatal), [`NumngError::BuildCommandFailed`]
//! - **Materialization**: [`NumngError::LinkConflict`], [`NumngError::PathEscape`]
//!
//! Every variant maps to a process exit code through [`NumngError::exit_code`], so
//! scripts can tell a resolution failure from a fetch, build or link failure.
//!
//! # Examples
//!
//! ```rust,no_run
//! use numng::core::{NumngError, user_friendly_error};
//!
//! let err = NumngError::PackageNotFound {
//!     name: "webserver".to_string(),
//!     suggestion: Some("webserver.nu".to_string()),
//! };
//! let ctx = user_friendly_error(anyhow::Error::from(err));
//! ctx.display(); // colored error with suggestion
//! ```

use colored::Colorize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage a subgraph failure belongs to.
///
/// Stages are ordered the way the pipeline runs them; when several subgraphs fail
/// in different stages the earliest one decides the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FailureStage {
    Fetch,
    Build,
    Link,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => write!(f, "fetch"),
            Self::Build => write!(f, "build"),
            Self::Link => write!(f, "link"),
        }
    }
}

/// The main error type for numng operations.
#[derive(Error, Debug)]
pub enum NumngError {
    /// A declaration could not be normalized.
    ///
    /// Raised by the format adapters for wrong value types, unknown keys (numng
    /// format only) and malformed nested declarations.
    #[error("Invalid declaration for {}: field '{field}' {reason}", package_label(.package))]
    SpecParse {
        /// Name of the declaring package, when already known
        package: Option<String>,
        /// The offending field
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// `package_format` names a format that has no adapter (or no registry reader).
    #[error("Unsupported package format '{format}' for {}", package_label(.package))]
    UnsupportedFormat {
        /// Name of the declaring package, when already known
        package: Option<String>,
        /// The format string as written
        format: String,
    },

    /// A version or version constraint is malformed.
    #[error("Invalid version '{text}': {issue}")]
    InvalidVersionSyntax {
        /// The text that failed to parse
        text: String,
        /// Short description of the problem
        issue: String,
    },

    /// The package exists but no version satisfies the constraint.
    #[error("No version of '{name}' matches '{constraint}' (available: {})", .available.join(", "))]
    NoMatchingVersion {
        /// Package name
        name: String,
        /// The constraint as written
        constraint: String,
        /// Versions the registries offered, best first
        available: Vec<String>,
    },

    /// Registry aliases point back at each other.
    #[error("Alias cycle in registry entry '{name}': {}", .chain.join(" -> "))]
    AliasCycle {
        /// Package name
        name: String,
        /// Version keys visited, in order, ending with the repeated one
        chain: Vec<String>,
    },

    /// A package reference could not be filled from any registry.
    #[error("Package '{name}' not found in any registry and declares no source_uri")]
    PackageNotFound {
        /// Package name
        name: String,
        /// Closest known registry name
        suggestion: Option<String>,
    },

    /// A dependency chain returns to a package already being expanded.
    #[error("Circular dependency detected: {chain}")]
    CyclicDependency {
        /// The cycle, rendered as `a@ref -> b@ref -> a@ref`
        chain: String,
    },

    /// Cloning or fetching a source failed (network, authentication, bad URL).
    #[error("Failed to fetch '{source_uri}': {reason}")]
    Fetch {
        /// The source URI
        source_uri: String,
        /// The provider's error output
        reason: String,
    },

    /// The requested ref does not exist in the source, even after fetching.
    #[error("Reference '{reference}' not found in '{source_uri}'")]
    RefNotFound {
        /// The source URI
        source_uri: String,
        /// The branch, tag or commit that was requested
        reference: String,
    },

    /// A non-root package wants to run a build command but the root does not allow it.
    ///
    /// This is the only non-fatal error: it is reported as a warning and the
    /// run continues.
    #[error("Build command of '{package}' was not run: allow_build_commands is not enabled on the root package")]
    BuildPermissionDenied {
        /// Package that declared the command
        package: String,
        /// The command that was skipped
        command: String,
    },

    /// A build command exited unsuccessfully.
    #[error("Build command '{command}' of '{package}' failed ({})", exit_label(.code))]
    BuildCommandFailed {
        /// Package that declared the command
        package: String,
        /// The command
        command: String,
        /// Exit code, `None` when terminated by a signal
        code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// A planned link target is occupied by something else.
    #[error("Link conflict at {}: {reason}", .target.display())]
    LinkConflict {
        /// The path that was to be created
        target: PathBuf,
        /// Why the existing entry (or the other planned action) conflicts
        reason: String,
    },

    /// A registry package does not follow the registry layout.
    #[error("Invalid registry at {}: {reason}", .path.display())]
    InvalidRegistryFormat {
        /// File or directory at fault
        path: PathBuf,
        /// What is wrong with it
        reason: String,
    },

    /// A user-supplied path tries to leave the directory it is confined to.
    #[error("Path '{path}' escapes {}", .base.display())]
    PathEscape {
        /// The offending relative path or name
        path: String,
        /// The directory it must stay inside
        base: PathBuf,
    },

    /// Git ran but an operation other than clone/fetch failed.
    #[error("Git operation failed: {operation}")]
    GitCommand {
        /// The git subcommand (e.g. "worktree add")
        operation: String,
        /// The error output from git
        stderr: String,
    },

    /// The `git` executable could not be located.
    #[error("Git is not installed or not found in PATH")]
    GitNotFound,

    /// The managed home directory is too close to the filesystem root.
    #[error("Refusing to manage {}: path is too close to the filesystem root", .path.display())]
    NupmHomeTooShallow {
        /// The rejected path
        path: PathBuf,
    },

    /// One or more independent subgraphs failed after resolution succeeded.
    #[error("{} package(s) failed during {stage}:\n{}", .failures.len(), render_failures(.failures))]
    SubgraphFailures {
        /// Earliest stage among the failures
        stage: FailureStage,
        /// `(package, message)` pairs in pipeline order
        failures: Vec<(String, String)>,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anything else, carried as a message.
    #[error("{message}")]
    Other {
        /// The error message
        message: String,
    },
}

fn package_label(package: &Option<String>) -> String {
    package.as_deref().map_or_else(|| "<unnamed package>".to_string(), |p| format!("'{p}'"))
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "terminated by signal".to_string(), |c| format!("exit code {c}"))
}

fn render_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(package, message)| format!("  - {package}: {message}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Clone for NumngError {
    fn clone(&self) -> Self {
        match self {
            Self::SpecParse {
                package,
                field,
                reason,
            } => Self::SpecParse {
                package: package.clone(),
                field: field.clone(),
                reason: reason.clone(),
            },
            Self::UnsupportedFormat {
                package,
                format,
            } => Self::UnsupportedFormat {
                package: package.clone(),
                format: format.clone(),
            },
            Self::InvalidVersionSyntax {
                text,
                issue,
            } => Self::InvalidVersionSyntax {
                text: text.clone(),
                issue: issue.clone(),
            },
            Self::NoMatchingVersion {
                name,
                constraint,
                available,
            } => Self::NoMatchingVersion {
                name: name.clone(),
                constraint: constraint.clone(),
                available: available.clone(),
            },
            Self::AliasCycle {
                name,
                chain,
            } => Self::AliasCycle {
                name: name.clone(),
                chain: chain.clone(),
            },
            Self::PackageNotFound {
                name,
                suggestion,
            } => Self::PackageNotFound {
                name: name.clone(),
                suggestion: suggestion.clone(),
            },
            Self::CyclicDependency {
                chain,
            } => Self::CyclicDependency {
                chain: chain.clone(),
            },
            Self::Fetch {
                source_uri,
                reason,
            } => Self::Fetch {
                source_uri: source_uri.clone(),
                reason: reason.clone(),
            },
            Self::RefNotFound {
                source_uri,
                reference,
            } => Self::RefNotFound {
                source_uri: source_uri.clone(),
                reference: reference.clone(),
            },
            Self::BuildPermissionDenied {
                package,
                command,
            } => Self::BuildPermissionDenied {
                package: package.clone(),
                command: command.clone(),
            },
            Self::BuildCommandFailed {
                package,
                command,
                code,
                stderr,
            } => Self::BuildCommandFailed {
                package: package.clone(),
                command: command.clone(),
                code: *code,
                stderr: stderr.clone(),
            },
            Self::LinkConflict {
                target,
                reason,
            } => Self::LinkConflict {
                target: target.clone(),
                reason: reason.clone(),
            },
            Self::InvalidRegistryFormat {
                path,
                reason,
            } => Self::InvalidRegistryFormat {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::PathEscape {
                path,
                base,
            } => Self::PathEscape {
                path: path.clone(),
                base: base.clone(),
            },
            Self::GitCommand {
                operation,
                stderr,
            } => Self::GitCommand {
                operation: operation.clone(),
                stderr: stderr.clone(),
            },
            Self::GitNotFound => Self::GitNotFound,
            Self::NupmHomeTooShallow {
                path,
            } => Self::NupmHomeTooShallow {
                path: path.clone(),
            },
            Self::SubgraphFailures {
                stage,
                failures,
            } => Self::SubgraphFailures {
                stage: *stage,
                failures: failures.clone(),
            },
            // io::Error is not Clone; keep kind and message
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), e.to_string())),
            Self::Json(e) => Self::Other {
                message: format!("JSON error: {e}"),
            },
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Exit code for successful runs (including runs with permission-denied warnings).
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for errors outside the categories below.
pub const EXIT_OTHER: i32 = 1;
/// Exit code for parse, format, version and resolution failures.
pub const EXIT_RESOLUTION: i32 = 2;
/// Exit code for fetch failures.
pub const EXIT_FETCH: i32 = 3;
/// Exit code for build failures.
pub const EXIT_BUILD: i32 = 4;
/// Exit code for link conflicts.
pub const EXIT_LINK: i32 = 5;

impl NumngError {
    /// Process exit code for this error's category.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::SpecParse {
                ..
            }
            | Self::UnsupportedFormat {
                ..
            }
            | Self::InvalidVersionSyntax {
                ..
            }
            | Self::NoMatchingVersion {
                ..
            }
            | Self::AliasCycle {
                ..
            }
            | Self::PackageNotFound {
                ..
            }
            | Self::CyclicDependency {
                ..
            }
            | Self::InvalidRegistryFormat {
                ..
            } => EXIT_RESOLUTION,
            Self::Fetch {
                ..
            }
            | Self::RefNotFound {
                ..
            }
            | Self::GitCommand {
                ..
            }
            | Self::GitNotFound => EXIT_FETCH,
            Self::BuildCommandFailed {
                ..
            } => EXIT_BUILD,
            Self::LinkConflict {
                ..
            } => EXIT_LINK,
            Self::SubgraphFailures {
                stage,
                ..
            } => match stage {
                FailureStage::Fetch => EXIT_FETCH,
                FailureStage::Build => EXIT_BUILD,
                FailureStage::Link => EXIT_LINK,
            },
            Self::BuildPermissionDenied {
                ..
            } => EXIT_SUCCESS,
            Self::PathEscape {
                ..
            }
            | Self::NupmHomeTooShallow {
                ..
            }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other {
                ..
            } => EXIT_OTHER,
        }
    }

    /// Whether this error should stop the run (or its subgraph).
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::BuildPermissionDenied {
                ..
            }
        )
    }

    /// Pipeline stage a store/build/link error belongs to, if any.
    #[must_use]
    pub const fn stage(&self) -> Option<FailureStage> {
        match self {
            Self::Fetch {
                ..
            }
            | Self::RefNotFound {
                ..
            }
            | Self::GitCommand {
                ..
            }
            | Self::GitNotFound => Some(FailureStage::Fetch),
            Self::BuildCommandFailed {
                ..
            } => Some(FailureStage::Build),
            Self::LinkConflict {
                ..
            } => Some(FailureStage::Link),
            _ => None,
        }
    }
}

/// Finds the first [`NumngError`] in an `anyhow` error chain.
#[must_use]
pub fn find_numng_error(error: &anyhow::Error) -> Option<&NumngError> {
    error.chain().find_map(|cause| cause.downcast_ref::<NumngError>())
}

/// Exit code for an arbitrary error: the category of the first [`NumngError`] in
/// its chain, or [`EXIT_OTHER`].
#[must_use]
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    find_numng_error(error).map_or(EXIT_OTHER, NumngError::exit_code)
}

/// Error with a user-facing suggestion and optional details.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: NumngError,
    /// What the user can do about it
    pub suggestion: Option<String>,
    /// Extra background, such as the wrapped context chain
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub const fn new(error: NumngError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Adds a suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Adds details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Prints the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }

    /// Exit code for the wrapped error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.error.exit_code()
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Converts any error into an [`ErrorContext`] with a suggestion.
///
/// The chain is searched for a [`NumngError`]; outer context messages become the
/// details. Errors without one are reported as [`NumngError::Other`] with their
/// full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(numng_error) = find_numng_error(&error) {
        let outer: Vec<String> = error
            .chain()
            .take_while(|cause| cause.downcast_ref::<NumngError>().is_none())
            .map(ToString::to_string)
            .collect();
        let ctx = create_error_context(numng_error.clone());
        return if outer.is_empty() || ctx.details.is_some() {
            ctx
        } else {
            ctx.with_details(outer.join(": "))
        };
    }

    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(NumngError::Other {
        message,
    })
}

fn create_error_context(error: NumngError) -> ErrorContext {
    match &error {
        NumngError::SpecParse {
            ..
        } => ErrorContext::new(error).with_suggestion(
            "Check the package file: numng declarations only accept the documented keys and value types",
        ),
        NumngError::UnsupportedFormat {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Use one of the supported formats: numng, nupm, packer.nu"),
        NumngError::InvalidVersionSyntax {
            ..
        } => ErrorContext::new(error).with_suggestion(
            "Versions look like 1, 1.2 or 1.2.3, optionally prefixed by one of ^ ~ < >, or are 'latest' or a tag name",
        ),
        NumngError::NoMatchingVersion {
            available,
            ..
        } => {
            let suggestion = if available.is_empty() {
                "The registry lists no versions for this package".to_string()
            } else {
                format!("Relax the version constraint; available versions: {}", available.join(", "))
            };
            ErrorContext::new(error).with_suggestion(suggestion)
        }
        NumngError::AliasCycle {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Fix the registry entry so that aliases end at a concrete version"),
        NumngError::PackageNotFound {
            suggestion,
            ..
        } => {
            let hint = match suggestion {
                Some(close) => format!("Did you mean '{close}'? Otherwise add a source_uri to the declaration"),
                None => "Add a source_uri to the declaration or a registry that provides the package".to_string(),
            };
            ErrorContext::new(error).with_suggestion(hint)
        }
        NumngError::CyclicDependency {
            ..
        } => ErrorContext::new(error).with_suggestion(
            "Break the cycle by removing one of the dependencies, or pin one side to a different git_ref",
        ),
        NumngError::Fetch {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check the URL, your network connection and repository access")
            .with_details("Network timeouts and authentication are handled by git's own configuration"),
        NumngError::RefNotFound {
            ..
        } => ErrorContext::new(error).with_suggestion(
            "Verify the branch, tag or commit exists: git ls-remote <source_uri>",
        ),
        NumngError::BuildCommandFailed {
            stderr,
            ..
        } => {
            let details = stderr.trim().to_string();
            let ctx = ErrorContext::new(error)
                .with_suggestion("Run the build command manually inside the package directory");
            if details.is_empty() {
                ctx
            } else {
                ctx.with_details(details)
            }
        }
        NumngError::LinkConflict {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Remove the conflicting path or rerun with --force to replace it"),
        NumngError::GitNotFound => ErrorContext::new(error)
            .with_suggestion("Install git from https://git-scm.com/ or your package manager"),
        NumngError::GitCommand {
            stderr,
            ..
        } => {
            let details = stderr.trim().to_string();
            ErrorContext::new(error)
                .with_suggestion("Run 'numng store gc' or 'numng store clean' if the store looks corrupted")
                .with_details(details)
        }
        NumngError::NupmHomeTooShallow {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Pick a dedicated directory such as ~/.local/share/nushell/numng/home"),
        NumngError::SubgraphFailures {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Packages that did not depend on the failures were still installed; rerun after fixing them"),
        _ => ErrorContext::new(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_codes_are_distinct_per_category() {
        let resolution = NumngError::CyclicDependency {
            chain: "a -> b -> a".to_string(),
        };
        let fetch = NumngError::Fetch {
            source_uri: "https://example.com/x".to_string(),
            reason: "offline".to_string(),
        };
        let build = NumngError::BuildCommandFailed {
            package: "x".to_string(),
            command: "make".to_string(),
            code: Some(2),
            stderr: String::new(),
        };
        let link = NumngError::LinkConflict {
            target: PathBuf::from("/tmp/x"),
            reason: "exists".to_string(),
        };

        let codes = [resolution.exit_code(), fetch.exit_code(), build.exit_code(), link.exit_code()];
        assert_eq!(codes, [EXIT_RESOLUTION, EXIT_FETCH, EXIT_BUILD, EXIT_LINK]);
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn test_permission_denied_is_not_fatal() {
        let err = NumngError::BuildPermissionDenied {
            package: "x".to_string(),
            command: "make".to_string(),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.exit_code(), EXIT_SUCCESS);
    }

    #[test]
    fn test_subgraph_failures_use_stage_exit_code() {
        let err = NumngError::SubgraphFailures {
            stage: FailureStage::Build,
            failures: vec![("a".to_string(), "boom".to_string())],
        };
        assert_eq!(err.exit_code(), EXIT_BUILD);
        assert!(err.to_string().contains("  - a: boom"));
    }

    #[test]
    fn test_exit_code_found_through_context() {
        let err: anyhow::Result<()> = Err(NumngError::RefNotFound {
            source_uri: "file:///repo".to_string(),
            reference: "v9".to_string(),
        })
        .context("Failed to prepare package foo");
        let err = err.unwrap_err();
        assert_eq!(exit_code_for(&err), EXIT_FETCH);

        let ctx = user_friendly_error(err);
        assert!(matches!(ctx.error, NumngError::RefNotFound { .. }));
        assert!(ctx.suggestion.is_some());
        assert_eq!(ctx.details.as_deref(), Some("Failed to prepare package foo"));
    }

    #[test]
    fn test_generic_error_keeps_chain() {
        let err = anyhow::anyhow!("inner").context("outer");
        let ctx = user_friendly_error(err);
        assert_eq!(ctx.exit_code(), EXIT_OTHER);
        assert!(ctx.to_string().contains("Caused by"));
    }

    #[test]
    fn test_package_not_found_suggests_close_name() {
        let ctx = user_friendly_error(anyhow::Error::from(NumngError::PackageNotFound {
            name: "webservr".to_string(),
            suggestion: Some("webserver".to_string()),
        }));
        assert!(ctx.suggestion.unwrap().contains("webserver"));
    }
}
