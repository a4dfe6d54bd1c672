//! Version constraints and best-candidate selection.
//!
//! Numeric constraints compile to a [`semver::VersionReq`] over zero-padded
//! versions. `^` and `~` bound by the next major and next minor regardless of
//! leading zeros, so they are spelled out as explicit comparator pairs.

use super::{Version, VersionNumber, compare_candidates};
use crate::core::NumngError;
use semver::{Comparator, Op, Prerelease, VersionReq};
use std::fmt;

/// Comparison operator of a numeric constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// No prefix (or `=`): missing components are wildcards
    Exact,
    /// `^`: same major, not lower
    Caret,
    /// `~`: same major and minor, not lower
    Tilde,
    /// `>`
    Greater,
    /// `<`
    Less,
}

impl Operator {
    const fn symbol(self) -> &'static str {
        match self {
            Self::Exact => "",
            Self::Caret => "^",
            Self::Tilde => "~",
            Self::Greater => ">",
            Self::Less => "<",
        }
    }

    fn from_prefix(c: char) -> Option<Self> {
        match c {
            '^' => Some(Self::Caret),
            '~' => Some(Self::Tilde),
            '>' => Some(Self::Greater),
            '<' => Some(Self::Less),
            '=' => Some(Self::Exact),
            _ => None,
        }
    }

    fn requirement(self, version: &VersionNumber) -> VersionReq {
        let padded = version.semver();
        let (major, minor, patch) = (padded.major, padded.minor, padded.patch);
        let comparators = match self {
            Self::Exact => {
                let (major, minor, patch) = version.partial();
                vec![comparator(Op::Exact, major, minor, patch)]
            }
            Self::Caret => vec![
                comparator(Op::GreaterEq, major, Some(minor), Some(patch)),
                comparator(Op::Less, major.saturating_add(1), Some(0), Some(0)),
            ],
            Self::Tilde => vec![
                comparator(Op::GreaterEq, major, Some(minor), Some(patch)),
                comparator(Op::Less, major, Some(minor.saturating_add(1)), Some(0)),
            ],
            Self::Greater => vec![comparator(Op::Greater, major, Some(minor), Some(patch))],
            Self::Less => vec![comparator(Op::Less, major, Some(minor), Some(patch))],
        };
        VersionReq {
            comparators,
        }
    }
}

const fn comparator(op: Op, major: u64, minor: Option<u64>, patch: Option<u64>) -> Comparator {
    Comparator {
        op,
        major,
        minor,
        patch,
        pre: Prerelease::EMPTY,
    }
}

/// A predicate over registry version keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionConstraint {
    Any,
    Latest,
    Numeric {
        operator: Operator,
        version: VersionNumber,
        requirement: VersionReq,
    },
    Tag(String),
}

impl VersionConstraint {
    /// Parses a constraint.
    ///
    /// # Errors
    ///
    /// [`NumngError::InvalidVersionSyntax`] for doubled operators, empty or
    /// non-numeric components and more than three components.
    pub fn parse(text: &str) -> Result<Self, NumngError> {
        let trimmed = text.trim();
        match trimmed {
            "" | "*" | "any" => return Ok(Self::Any),
            "latest" => return Ok(Self::Latest),
            _ => {}
        }

        let mut chars = trimmed.chars();
        let first = chars.next();
        let operator = first.and_then(Operator::from_prefix);

        if operator.is_none() && !trimmed.chars().any(|c| c.is_ascii_digit()) {
            return Ok(Self::Tag(trimmed.to_string()));
        }

        let (operator, rest) = match operator {
            Some(op) => (op, chars.as_str()),
            None => (Operator::Exact, trimmed),
        };

        if rest.starts_with(|c: char| Operator::from_prefix(c).is_some()) {
            return Err(NumngError::InvalidVersionSyntax {
                text: trimmed.to_string(),
                issue: "doubled operator".to_string(),
            });
        }
        if rest.is_empty() {
            return Err(NumngError::InvalidVersionSyntax {
                text: trimmed.to_string(),
                issue: "operator without a version".to_string(),
            });
        }

        let version = VersionNumber::parse(rest, trimmed)?;
        Ok(Self::Numeric {
            requirement: operator.requirement(&version),
            operator,
            version,
        })
    }

    /// Whether `candidate` satisfies this constraint.
    #[must_use]
    pub fn matches(&self, candidate: &Version) -> bool {
        match (self, candidate) {
            (Self::Tag(wanted), Version::Tag(tag)) => wanted == tag,
            (_, Version::Tag(_)) | (Self::Tag(_), _) => false,
            (Self::Any | Self::Latest, _) => true,
            (
                Self::Numeric {
                    operator,
                    ..
                },
                Version::Latest,
            ) => *operator == Operator::Greater,
            (
                Self::Numeric {
                    requirement,
                    ..
                },
                Version::Numeric(candidate),
            ) => requirement.matches(candidate.semver()),
        }
    }

    /// Picks the highest candidate satisfying this constraint.
    ///
    /// The result does not depend on the order of `candidates`.
    pub fn select_best<'a, I>(&self, candidates: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .map(|key| (Version::from_key(key), key))
            .filter(|(version, _)| self.matches(version))
            .max_by(|a, b| compare_candidates((&a.0, a.1), (&b.0, b.1)))
            .map(|(_, key)| key)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Latest => write!(f, "latest"),
            Self::Numeric {
                operator,
                version,
                ..
            } => write!(f, "{}{version}", operator.symbol()),
            Self::Tag(tag) => write!(f, "{tag}"),
        }
    }
}

/// Selects the best of `candidates` for `constraint` on behalf of package `name`.
///
/// # Errors
///
/// [`NumngError::InvalidVersionSyntax`] when the constraint does not parse,
/// [`NumngError::NoMatchingVersion`] when nothing matches.
pub fn select_best(name: &str, constraint: &str, candidates: &[String]) -> Result<String, NumngError> {
    let parsed = VersionConstraint::parse(constraint)?;
    parsed.select_best(candidates.iter().map(String::as_str)).map(ToString::to_string).ok_or_else(
        || {
            let mut available: Vec<&String> = candidates.iter().collect();
            available.sort_by(|a, b| {
                compare_candidates((&Version::from_key(b), b), (&Version::from_key(a), a))
            });
            NumngError::NoMatchingVersion {
                name: name.to_string(),
                constraint: constraint.to_string(),
                available: available.into_iter().cloned().collect(),
            }
        },
    )
}
