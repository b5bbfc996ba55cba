//! Semantic version validation
//!
//! Accepts `MAJOR.MINOR.PATCH[-PRERELEASE][+BUILD]` per Semantic Versioning
//! 2.0.0. Numeric components and numeric pre-release identifiers must not
//! have leading zeros; build metadata is unrestricted apart from its
//! character set.

use regex::Regex;
use std::sync::OnceLock;

static SEMVER_PATTERN: OnceLock<Regex> = OnceLock::new();

fn semver_pattern() -> &'static Regex {
    SEMVER_PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)",
            r"(?:-((?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*))?",
            r"(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$",
        ))
        .expect("Invalid semver pattern")
    })
}

/// Whether `version` is a well-formed semantic version
///
/// Never panics; any non-match returns `false`.
///
/// # Examples
///
/// ```
/// use registry_engine::semver::is_valid_semver;
///
/// assert!(is_valid_semver("1.2.3-beta.1+build.5"));
/// assert!(!is_valid_semver("01.2.3"));
/// ```
pub fn is_valid_semver(version: &str) -> bool {
    semver_pattern().is_match(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_core_versions() {
        for version in ["0.0.0", "1.0.0", "10.20.30", "0.1.12"] {
            assert!(is_valid_semver(version), "{}", version);
        }
    }

    #[test]
    fn test_accepts_prerelease_and_build() {
        for version in [
            "1.0.0-alpha",
            "1.0.0-alpha.1",
            "1.0.0-0.3.7",
            "1.0.0-x.7.z.92",
            "1.0.0-x-y-z.--",
            "1.0.0-alpha+001",
            "1.0.0+20130313144700",
            "1.0.0-beta+exp.sha.5114f85",
            "1.0.0-0a.1",
        ] {
            assert!(is_valid_semver(version), "{}", version);
        }
    }

    #[test]
    fn test_rejects_leading_zeros() {
        for version in ["01.2.3", "1.02.3", "1.2.03", "1.0.0-01", "1.0.0-alpha.01"] {
            assert!(!is_valid_semver(version), "{}", version);
        }
    }

    #[test]
    fn test_rejects_malformed() {
        for version in [
            "",
            "1",
            "1.2",
            "1.2.3.4",
            "v1.2.3",
            "1.2.3-",
            "1.2.3+",
            "1.2.3-alpha..1",
            "1.2.3-alpha_1",
            " 1.2.3",
            "1.2.3\n",
            "-1.2.3",
        ] {
            assert!(!is_valid_semver(version), "{:?}", version);
        }
    }
}
