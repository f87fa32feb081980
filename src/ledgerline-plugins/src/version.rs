//! Version parsing and dependency constraint matching.
//!
//! Four constraint forms are understood, checked in this order:
//!
//! | Form      | Accepts                            |
//! |-----------|------------------------------------|
//! | `^X.Y.Z`  | `>= X.Y.Z` and `< (X+1).0.0`       |
//! | `~X.Y.Z`  | `>= X.Y.Z` and `< X.(Y+1).0`       |
//! | `>=X.Y.Z` | `>= X.Y.Z`                         |
//! | anything  | exactly that version               |
//!
//! The caret form always bumps the major segment, including for `0.x`
//! versions. This differs from Cargo's caret requirements.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;

static VERSION_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)\.([0-9]+)\.([0-9]+)").unwrap());

/// Whether a version string starts with a `MAJOR.MINOR.PATCH` triple.
///
/// Pre-release and build suffixes are tolerated.
pub fn is_valid_version(version: &str) -> bool {
    VERSION_PREFIX.is_match(version)
}

/// Parse a version leniently.
///
/// Full semver strings keep their pre-release segment so that precedence
/// rules apply. Anything else is reduced to its numeric prefix.
pub fn parse_version(version: &str) -> Option<Version> {
    let version = version.trim();
    if let Ok(parsed) = Version::parse(version) {
        return Some(parsed);
    }

    let caps = VERSION_PREFIX.captures(version)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = caps.get(2)?.as_str().parse().ok()?;
    let patch = caps.get(3)?.as_str().parse().ok()?;
    Some(Version::new(major, minor, patch))
}

/// A parsed dependency constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// `^X.Y.Z`
    Caret(Version),
    /// `~X.Y.Z`
    Tilde(Version),
    /// `>=X.Y.Z`
    AtLeast(Version),
    /// Exact version match
    Exact(String),
    /// An operator followed by something that is not a version
    Invalid(String),
}

impl Constraint {
    /// Parse a constraint string.
    pub fn parse(constraint: &str) -> Self {
        let constraint = constraint.trim();
        let bounded = |base: &str, build: fn(Version) -> Self| match parse_version(base) {
            Some(version) => build(version),
            None => Self::Invalid(constraint.to_string()),
        };

        if let Some(rest) = constraint.strip_prefix('^') {
            bounded(rest, Self::Caret)
        } else if let Some(rest) = constraint.strip_prefix('~') {
            bounded(rest, Self::Tilde)
        } else if let Some(rest) = constraint.strip_prefix(">=") {
            bounded(rest, Self::AtLeast)
        } else {
            Self::Exact(constraint.to_string())
        }
    }

    /// Check whether an installed version satisfies this constraint.
    pub fn matches(&self, installed: &str) -> bool {
        let Some(installed_version) = parse_version(installed) else {
            return matches!(self, Self::Exact(expected) if expected == installed.trim());
        };

        match self {
            Self::Caret(base) => {
                let upper = Version::new(base.major.saturating_add(1), 0, 0);
                installed_version >= *base && installed_version < upper
            }
            Self::Tilde(base) => {
                let upper = Version::new(base.major, base.minor.saturating_add(1), 0);
                installed_version >= *base && installed_version < upper
            }
            Self::AtLeast(base) => installed_version >= *base,
            Self::Exact(expected) => match parse_version(expected) {
                Some(expected) => same_precedence(&installed_version, &expected),
                None => expected == installed.trim(),
            },
            Self::Invalid(_) => false,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caret(v) => write!(f, "^{v}"),
            Self::Tilde(v) => write!(f, "~{v}"),
            Self::AtLeast(v) => write!(f, ">={v}"),
            Self::Exact(v) | Self::Invalid(v) => write!(f, "{v}"),
        }
    }
}

/// Check whether `installed` satisfies `constraint`.
pub fn satisfies_constraint(installed: &str, constraint: &str) -> bool {
    Constraint::parse(constraint).matches(installed)
}

// Build metadata does not take part in precedence.
fn same_precedence(a: &Version, b: &Version) -> bool {
    a.major == b.major && a.minor == b.minor && a.patch == b.patch && a.pre == b.pre
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_version() {
        assert!(is_valid_version("1.2.3"));
        assert!(is_valid_version("1.2.3-beta.1"));
        assert!(is_valid_version("10.20.30+build.5"));
        assert!(!is_valid_version("1.2"));
        assert!(!is_valid_version("v1.2.3"));
        assert!(!is_valid_version(""));
    }

    #[test]
    fn test_only_ascii_digits_count() {
        assert!(!is_valid_version("١.٢.٣"));
        assert!(!is_valid_version("1.2.٣"));
        assert_eq!(parse_version("१.०.०"), None);
    }

    #[test]
    fn test_parse_version_lenient() {
        assert_eq!(parse_version("1.2.3.4"), Some(Version::new(1, 2, 3)));
        assert_eq!(parse_version(" 2.0.0 "), Some(Version::new(2, 0, 0)));
        assert!(parse_version("2.0.0-rc.1").unwrap().pre.as_str() == "rc.1");
        assert_eq!(parse_version("latest"), None);
    }

    #[test]
    fn test_caret_bounds() {
        assert!(satisfies_constraint("2.0.0", "^2.0.0"));
        assert!(satisfies_constraint("2.3.1", "^2.0.0"));
        assert!(satisfies_constraint("2.99.99", "^2.0.0"));
        assert!(!satisfies_constraint("3.0.0", "^2.0.0"));
        assert!(!satisfies_constraint("1.9.9", "^2.0.0"));
        assert!(!satisfies_constraint("2.3.1", "^3.0.0"));
    }

    #[test]
    fn test_caret_zero_major_bumps_major() {
        assert!(satisfies_constraint("0.9.0", "^0.2.0"));
        assert!(!satisfies_constraint("1.0.0", "^0.2.0"));
    }

    #[test]
    fn test_tilde_bounds() {
        assert!(satisfies_constraint("1.4.0", "~1.4.0"));
        assert!(satisfies_constraint("1.4.9", "~1.4.2"));
        assert!(!satisfies_constraint("1.5.0", "~1.4.0"));
        assert!(!satisfies_constraint("1.4.1", "~1.4.2"));
    }

    #[test]
    fn test_at_least() {
        assert!(satisfies_constraint("1.0.0", ">=1.0.0"));
        assert!(satisfies_constraint("9.0.0", ">= 1.0.0"));
        assert!(!satisfies_constraint("0.9.9", ">=1.0.0"));
    }

    #[test]
    fn test_exact() {
        assert!(satisfies_constraint("1.2.3", "1.2.3"));
        assert!(satisfies_constraint("1.2.3+build.7", "1.2.3"));
        assert!(!satisfies_constraint("1.2.4", "1.2.3"));
        assert!(!satisfies_constraint("1.2.3-beta", "1.2.3"));
        assert!(satisfies_constraint("dev-main", "dev-main"));
    }

    #[test]
    fn test_invalid_operator_target_never_matches() {
        assert_eq!(
            Constraint::parse("^latest"),
            Constraint::Invalid("^latest".to_string())
        );
        assert!(!satisfies_constraint("1.0.0", "^latest"));
    }

    #[test]
    fn test_display_round_trip() {
        assert_eq!(Constraint::parse("^2.0.0").to_string(), "^2.0.0");
        assert_eq!(Constraint::parse(">=1.2.3").to_string(), ">=1.2.3");
    }
}
