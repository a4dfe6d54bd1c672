//! Source identities.
//!
//! Two declarations that point at the same repository and sub-directory must map
//! to the same identity, however the URI was spelled. An identity plus a git ref
//! names one physical store entry.

use super::{PackageDeclaration, SourceType};
use crate::core::NumngError;
use crate::utils::fs::normalize_relative;
use std::fmt;
use std::path::{Path, PathBuf};

/// Canonical `(source type, URI, path offset)` of a package.
///
/// Rendered as `git+<uri>` or `git+<uri>#<offset>`; the root package uses
/// `local:<absolute dir>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceIdentity {
    source_type: Option<SourceType>,
    uri: String,
    offset: Option<String>,
}

impl SourceIdentity {
    /// Identity of a declaration with a source URI.
    pub fn from_declaration(declaration: &PackageDeclaration) -> Result<Self, NumngError> {
        let uri = declaration.source_uri.as_deref().ok_or_else(|| NumngError::PackageNotFound {
            name: declaration.display_name().to_string(),
            suggestion: None,
        })?;
        Self::new(
            declaration.source_type.unwrap_or_default(),
            uri,
            declaration.path_offset.as_deref(),
        )
    }

    /// Builds an identity from its parts, normalizing both URI and offset.
    pub fn new(source_type: SourceType, uri: &str, offset: Option<&str>) -> Result<Self, NumngError> {
        let uri = normalize_uri(uri);
        let offset = match offset {
            Some(offset) => {
                let normalized = normalize_relative(offset, Path::new(&uri))?;
                let parts: Vec<String> = normalized
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                if parts.is_empty() { None } else { Some(parts.join("/")) }
            }
            None => None,
        };
        Ok(Self {
            source_type: Some(source_type),
            uri,
            offset,
        })
    }

    /// Identity of the root package living in `dir`.
    #[must_use]
    pub fn local(dir: &Path) -> Self {
        Self {
            source_type: None,
            uri: dir.to_string_lossy().into_owned(),
            offset: None,
        }
    }

    /// Whether this is the root's `local:` identity.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        self.source_type.is_none()
    }

    /// The normalized URI (or directory for local identities).
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The normalized path offset.
    #[must_use]
    pub fn offset(&self) -> Option<&str> {
        self.offset.as_deref()
    }

    /// Directory of the package inside a checkout at `root`.
    #[must_use]
    pub fn package_dir(&self, root: &Path) -> PathBuf {
        match &self.offset {
            Some(offset) => root.join(offset),
            None => root.to_path_buf(),
        }
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.source_type, &self.offset) {
            (None, _) => write!(f, "local:{}", self.uri),
            (Some(kind), None) => write!(f, "{kind}+{}", self.uri),
            (Some(kind), Some(offset)) => write!(f, "{kind}+{}#{offset}", self.uri),
        }
    }
}

/// Trims trailing `/` and `.git`, and lowercases scheme and host.
///
/// Handles `scheme://[user@]host/path`, scp-like `user@host:path` and plain
/// paths (left as they are apart from the trimming).
#[must_use]
pub fn normalize_uri(uri: &str) -> String {
    let mut trimmed = uri.trim().trim_end_matches('/');
    while let Some(stripped) = trimmed.strip_suffix(".git") {
        trimmed = stripped.trim_end_matches('/');
    }

    if let Some((scheme, rest)) = trimmed.split_once("://") {
        let (authority, path) = match rest.find('/') {
            Some(index) => rest.split_at(index),
            None => (rest, ""),
        };
        let authority = match authority.rsplit_once('@') {
            Some((user, host)) => format!("{user}@{}", host.to_lowercase()),
            None => authority.to_lowercase(),
        };
        return format!("{}://{authority}{path}", scheme.to_lowercase());
    }

    if let Some((user_host, path)) = trimmed.split_once(':')
        && let Some((user, host)) = user_host.split_once('@')
        && !user_host.contains('/')
    {
        return format!("{user}@{}:{path}", host.to_lowercase());
    }

    trimmed.to_string()
}
