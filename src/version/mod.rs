//! Version parsing, ordering and constraint matching.
//!
//! Registry tables are keyed by free-form version strings. numng understands three
//! kinds of them:
//!
//! - **Numeric versions**: one to three dot-separated unsigned integers (`1`, `1.2`, `1.2.3`)
//! - **`latest`**: a sentinel that sorts above every numeric version
//! - **Tags**: anything else (`git`, `nightly`), only ever selected by name
//!
//! # Constraints
//!
//! | Constraint | Meaning |
//! |---|---|
//! | `""`, `*`, `any` | every numeric version and `latest` |
//! | `latest` | same as `>0`: every numeric version and `latest` |
//! | `1.2` | exact match; missing components are wildcards (`1.2.0`, `1.2.7`) |
//! | `^1.2.3` | `>=1.2.3`, `<2.0.0` |
//! | `~1.2.3` | `>=1.2.3`, `<1.3.0` |
//! | `>1.2`, `<1.2` | strict comparison after zero-padding |
//! | `nightly` | the tag `nightly` and nothing else |
//!
//! # Examples
//!
//! ```rust
//! use numng::version::VersionConstraint;
//!
//! let constraint = VersionConstraint::parse("^1.2").unwrap();
//! let best = constraint.select_best(["1.1.0", "1.9.2", "2.0.0", "latest"]);
//! assert_eq!(best, Some("1.9.2"));
//! ```

pub mod constraints;

pub use constraints::{Operator, VersionConstraint, select_best};

use crate::core::NumngError;
use std::cmp::Ordering;
use std::fmt;

/// Maximum number of numeric components.
pub const MAX_COMPONENTS: usize = 3;

/// A numeric version with one to three written components.
///
/// The value is held as a zero-padded [`semver::Version`]; the number of
/// written components is kept so `1.2` and `1.2.0` stay distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionNumber {
    version: semver::Version,
    written: usize,
}

impl VersionNumber {
    /// Parses `1`, `1.2` or `1.2.3`.
    ///
    /// `original` is only used for error messages.
    pub fn parse(text: &str, original: &str) -> Result<Self, NumngError> {
        let invalid = |issue: &str| NumngError::InvalidVersionSyntax {
            text: original.to_string(),
            issue: issue.to_string(),
        };

        let mut parts = [0u64; MAX_COMPONENTS];
        let mut written = 0;
        for component in text.split('.') {
            if written == MAX_COMPONENTS {
                return Err(invalid("more than three components"));
            }
            if component.is_empty() {
                return Err(invalid("empty version component"));
            }
            if !component.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid(&format!("component '{component}' is not a number")));
            }
            parts[written] =
                component.parse::<u64>().map_err(|_| invalid("version component is too large"))?;
            written += 1;
        }
        Ok(Self {
            version: semver::Version::new(parts[0], parts[1], parts[2]),
            written,
        })
    }

    /// The zero-padded semantic version.
    #[must_use]
    pub const fn semver(&self) -> &semver::Version {
        &self.version
    }

    /// Number of explicitly written components.
    #[must_use]
    pub const fn written(&self) -> usize {
        self.written
    }

    /// The written components as optional minor and patch, for partial comparators.
    #[must_use]
    pub const fn partial(&self) -> (u64, Option<u64>, Option<u64>) {
        let v = &self.version;
        match self.written {
            1 => (v.major, None, None),
            2 => (v.major, Some(v.minor), None),
            _ => (v.major, Some(v.minor), Some(v.patch)),
        }
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.partial() {
            (major, None, _) => write!(f, "{major}"),
            (major, Some(minor), None) => write!(f, "{major}.{minor}"),
            _ => write!(f, "{}", self.version),
        }
    }
}

/// A candidate version as found in a registry table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    Numeric(VersionNumber),
    Latest,
    Tag(String),
}

impl Version {
    /// Classifies a registry key. Never fails: anything that is neither numeric
    /// nor `latest` is a tag.
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        let key = key.trim();
        if key == "latest" {
            return Self::Latest;
        }
        match VersionNumber::parse(key, key) {
            Ok(number) => Self::Numeric(number),
            Err(_) => Self::Tag(key.to_string()),
        }
    }
}

/// Orders candidates: numeric by padded version, then component count, then
/// raw text; `latest` above every numeric. Tags sort below everything and only
/// compare among themselves by text.
#[must_use]
pub fn compare_candidates(a: (&Version, &str), b: (&Version, &str)) -> Ordering {
    fn rank(v: &Version) -> u8 {
        match v {
            Version::Tag(_) => 0,
            Version::Numeric(_) => 1,
            Version::Latest => 2,
        }
    }

    match (a.0, b.0) {
        (Version::Numeric(x), Version::Numeric(y)) => x
            .semver()
            .cmp(y.semver())
            .then_with(|| x.written().cmp(&y.written()))
            .then_with(|| a.1.cmp(b.1)),
        (x, y) => rank(x).cmp(&rank(y)).then_with(|| a.1.cmp(b.1)),
    }
}
