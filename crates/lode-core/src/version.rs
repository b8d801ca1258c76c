//! Package versions with semantic-version precedence.
//!
//! Versions are parsed leniently and compared with semver rules:
//! - Missing minor/patch components default to zero (`1.2` == `1.2.0`)
//! - A leading `v` is ignored
//! - Pre-release versions sort before their final release
//! - PEP 440 style suffixes (`1.0a1`, `2.0rc2`) become pre-release identifiers
//!
//! The text a source used for a version is kept verbatim so the same string
//! can be sent back to that source.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use semver::{BuildMetadata, Prerelease};
use serde::{Deserialize, Serialize};

/// A comparable package version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    original: String,
    inner: semver::Version,
}

/// Error returned when a version string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version `{input}`: {reason}")]
pub struct VersionParseError {
    pub input: String,
    pub reason: String,
}

impl Version {
    /// Parse a version string.
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let original = input.trim();
        let err = |reason: &str| VersionParseError {
            input: input.to_string(),
            reason: reason.to_string(),
        };
        if original.is_empty() {
            return Err(err("empty version"));
        }
        let body = original.strip_prefix('v').unwrap_or(original);

        let (release, build) = match body.split_once('+') {
            Some((r, b)) => (r, Some(b)),
            None => (body, None),
        };
        let (numbers, pre) = split_prerelease(release);

        let mut parts = [0u64; 3];
        let mut count = 0;
        for piece in numbers.split('.') {
            if count == 3 {
                return Err(err("more than three numeric components"));
            }
            parts[count] = piece
                .parse::<u64>()
                .map_err(|_| err("components must be non-negative integers"))?;
            count += 1;
        }

        let mut inner = semver::Version::new(parts[0], parts[1], parts[2]);
        if let Some(pre) = pre {
            inner.pre = Prerelease::new(&pre).map_err(|e| err(&e.to_string()))?;
        }
        if let Some(build) = build {
            inner.build = BuildMetadata::new(build).map_err(|e| err(&e.to_string()))?;
        }

        Ok(Self {
            original: original.to_string(),
            inner,
        })
    }

    /// Build a final-release version from numeric components.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        let inner = semver::Version::new(major, minor, patch);
        Self {
            original: inner.to_string(),
            inner,
        }
    }

    /// The lowest possible version with the given numeric components
    /// (`X.Y.Z-0`), which sorts before every pre-release of `X.Y.Z`.
    pub fn lowest(major: u64, minor: u64, patch: u64) -> Self {
        let mut inner = semver::Version::new(major, minor, patch);
        inner.pre = Prerelease::new("0").unwrap_or(Prerelease::EMPTY);
        Self {
            original: inner.to_string(),
            inner,
        }
    }

    pub fn major(&self) -> u64 {
        self.inner.major
    }

    pub fn minor(&self) -> u64 {
        self.inner.minor
    }

    pub fn patch(&self) -> u64 {
        self.inner.patch
    }

    pub fn is_prerelease(&self) -> bool {
        !self.inner.pre.is_empty()
    }

    /// The version string exactly as the source wrote it.
    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// The normalized `MAJOR.MINOR.PATCH[-PRE][+BUILD]` rendering.
    pub fn normalized(&self) -> String {
        self.inner.to_string()
    }
}

/// Split `1.0rc1` / `1.0-rc.1` into the numeric part and a pre-release tag.
fn split_prerelease(release: &str) -> (&str, Option<String>) {
    if let Some((numbers, pre)) = release.split_once('-') {
        return (numbers, Some(pre.to_string()));
    }
    // PEP 440 style: first alphabetic character starts the pre-release.
    match release.find(|c: char| c.is_ascii_alphabetic()) {
        Some(idx) => {
            let (numbers, suffix) = release.split_at(idx);
            let letters: String = suffix
                .chars()
                .take_while(|c| c.is_ascii_alphabetic())
                .collect();
            let digits = &suffix[letters.len()..];
            let pre = if digits.is_empty() {
                letters
            } else {
                format!("{letters}.{}", digits.trim_start_matches('.'))
            };
            (numbers.trim_end_matches('.'), Some(pre))
        }
        None => (release, None),
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.inner.cmp(&other.inner)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.original
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn basic_ordering() {
        assert!(v("1.0") < v("2.0"));
        assert!(v("1.0.0") < v("1.0.1"));
        assert!(v("1.0.1") < v("1.1.0"));
    }

    #[test]
    fn missing_components_equal() {
        assert_eq!(v("1"), v("1.0.0"));
        assert_eq!(v("1.2"), v("1.2.0"));
    }

    #[test]
    fn prerelease_before_release() {
        assert!(v("1.0.0-alpha") < v("1.0.0-beta"));
        assert!(v("1.0.0-beta") < v("1.0.0-rc.1"));
        assert!(v("1.0.0-rc.1") < v("1.0.0"));
        assert!(v("1.0.0-rc.2") < v("1.0.0-rc.10"));
    }

    #[test]
    fn pep440_suffixes() {
        let a = v("1.0a1");
        assert!(a.is_prerelease());
        assert_eq!(a.normalized(), "1.0.0-a.1");
        assert!(v("2.0rc2") < v("2.0"));
        assert!(v("2.0b1") < v("2.0rc1"));
    }

    #[test]
    fn leading_v_and_original_text() {
        let ver = v("v1.4");
        assert_eq!(ver, v("1.4.0"));
        assert_eq!(ver.to_string(), "v1.4");
    }

    #[test]
    fn lowest_sorts_before_prereleases() {
        let lo = Version::lowest(2, 0, 0);
        assert!(lo < v("2.0.0-alpha"));
        assert!(lo > v("1.99.99"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("one.two").is_err());
        assert!(Version::parse("1.2.3.4").is_err());
    }
}
