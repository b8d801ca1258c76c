use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dependency::Dependency;
use crate::marker::TargetEnvironment;
use crate::version::Version;

/// A case-normalized package identifier.
///
/// `Requests`, `requests` and `requests_` style variants (`_` and `.` are
/// treated as `-`) all name the same package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageName(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid package name `{0}`")]
pub struct PackageNameError(pub String);

impl PackageName {
    pub fn new(raw: &str) -> Result<Self, PackageNameError> {
        let trimmed = raw.trim();
        let valid = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && trimmed.starts_with(|c: char| c.is_ascii_alphanumeric());
        if !valid {
            return Err(PackageNameError(raw.to_string()));
        }
        let normalized = trimmed
            .chars()
            .map(|c| match c {
                '_' | '.' => '-',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PackageName {
    type Err = PackageNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PackageName {
    type Error = PackageNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<PackageName> for String {
    fn from(value: PackageName) -> Self {
        value.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Supported content-hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashAlgorithm {
    Sha256,
    Sha1,
    Md5,
}

impl HashAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Md5 => "md5",
        }
    }

    fn hex_len(self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Md5 => 32,
        }
    }

    pub fn digest(self, data: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha256 => lode_util::hash::sha256_bytes(data),
            HashAlgorithm::Sha1 => lode_util::hash::sha1_bytes(data),
            HashAlgorithm::Md5 => lode_util::hash::md5_bytes(data),
        }
    }
}

/// An `algo:hex` content hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash {
    algorithm: HashAlgorithm,
    hex: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid content hash `{input}`: {reason}")]
pub struct ContentHashError {
    pub input: String,
    pub reason: String,
}

impl ContentHash {
    pub fn parse(input: &str) -> Result<Self, ContentHashError> {
        let err = |reason: &str| ContentHashError {
            input: input.to_string(),
            reason: reason.to_string(),
        };
        let (algo, hex) = input
            .split_once(':')
            .ok_or_else(|| err("expected `algorithm:hex`"))?;
        let algorithm = match algo.to_ascii_lowercase().as_str() {
            "sha256" => HashAlgorithm::Sha256,
            "sha1" => HashAlgorithm::Sha1,
            "md5" => HashAlgorithm::Md5,
            _ => return Err(err("unsupported algorithm")),
        };
        let hex = hex.to_ascii_lowercase();
        if hex.len() != algorithm.hex_len() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(err("digest has the wrong length or is not hex"));
        }
        Ok(Self { algorithm, hex })
    }

    /// Hash `data` with SHA-256.
    pub fn sha256(data: &[u8]) -> Self {
        Self::compute(HashAlgorithm::Sha256, data)
    }

    pub fn compute(algorithm: HashAlgorithm, data: &[u8]) -> Self {
        Self {
            algorithm,
            hex: algorithm.digest(data),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Check `data` against this hash. On mismatch, returns the hash the
    /// data actually has, computed with the same algorithm.
    pub fn verify(&self, data: &[u8]) -> Result<(), ContentHash> {
        let actual = Self::compute(self.algorithm, data);
        if actual == *self {
            Ok(())
        } else {
            Err(actual)
        }
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.hex)
    }
}

impl FromStr for ContentHash {
    type Err = ContentHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = ContentHashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentHash> for String {
    fn from(value: ContentHash) -> Self {
        value.to_string()
    }
}

/// Where a resolved package came from, precise enough to fetch it again.
///
/// Rendered as `registry+<url>`, `path+<dir>` or `git+<url>#<commit>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceLocator {
    Registry { url: String },
    Path { path: PathBuf },
    Git { url: String, commit: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid source locator `{0}`")]
pub struct SourceLocatorError(pub String);

impl SourceLocator {
    pub fn parse(input: &str) -> Result<Self, SourceLocatorError> {
        let err = || SourceLocatorError(input.to_string());
        let (kind, rest) = input.split_once('+').ok_or_else(err)?;
        if rest.is_empty() {
            return Err(err());
        }
        match kind {
            "registry" => Ok(SourceLocator::Registry {
                url: rest.to_string(),
            }),
            "path" => Ok(SourceLocator::Path {
                path: PathBuf::from(rest),
            }),
            "git" => {
                let (url, commit) = rest.rsplit_once('#').ok_or_else(err)?;
                if url.is_empty() || commit.is_empty() {
                    return Err(err());
                }
                Ok(SourceLocator::Git {
                    url: url.to_string(),
                    commit: commit.to_string(),
                })
            }
            _ => Err(err()),
        }
    }

    pub fn is_registry(&self) -> bool {
        matches!(self, SourceLocator::Registry { .. })
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocator::Registry { url } => write!(f, "registry+{url}"),
            SourceLocator::Path { path } => write!(f, "path+{}", path.display()),
            SourceLocator::Git { url, commit } => write!(f, "git+{url}#{commit}"),
        }
    }
}

impl TryFrom<String> for SourceLocator {
    type Error = SourceLocatorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SourceLocator> for String {
    fn from(value: SourceLocator) -> Self {
        value.to_string()
    }
}

/// One entry of a version listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: Version,
    #[serde(default)]
    pub prebuilt: bool,
}

/// A specific `(name, version)` with its declared dependencies.
/// Immutable once fetched from a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageCandidate {
    pub name: PackageName,
    pub version: Version,
    pub dependencies: Vec<Dependency>,
    /// Additional dependencies activated by each named extra.
    pub extras: BTreeMap<String, Vec<Dependency>>,
    pub source: SourceLocator,
    pub hash: ContentHash,
    pub prebuilt: bool,
}

impl PackageCandidate {
    /// Dependencies whose markers may hold on `env`.
    pub fn active_dependencies<'a>(
        &'a self,
        env: &'a TargetEnvironment,
    ) -> impl Iterator<Item = &'a Dependency> + 'a {
        self.dependencies
            .iter()
            .filter(move |d| d.marker.is_active(env))
    }

    /// Dependencies contributed by `extras`, filtered by `env`. Unknown extra
    /// names contribute nothing.
    pub fn extra_dependencies<'a>(
        &'a self,
        extras: &'a BTreeSet<String>,
        env: &'a TargetEnvironment,
    ) -> impl Iterator<Item = &'a Dependency> + 'a {
        extras
            .iter()
            .filter_map(|extra| self.extras.get(extra))
            .flatten()
            .filter(move |d| d.marker.is_active(env))
    }
}

impl fmt::Display for PackageCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_normalize() {
        let a = PackageName::new("Foo_Bar.baz").unwrap();
        assert_eq!(a.as_str(), "foo-bar-baz");
        assert_eq!(a, PackageName::new("foo-bar-baz").unwrap());
        assert!(PackageName::new("").is_err());
        assert!(PackageName::new("-leading").is_err());
        assert!(PackageName::new("has space").is_err());
    }

    #[test]
    fn content_hash_parse_and_verify() {
        let hash = ContentHash::sha256(b"hello");
        let parsed = ContentHash::parse(&hash.to_string()).unwrap();
        assert_eq!(parsed, hash);
        assert!(hash.verify(b"hello").is_ok());
        let actual = hash.verify(b"tampered").unwrap_err();
        assert_eq!(actual, ContentHash::sha256(b"tampered"));

        let md5 = ContentHash::compute(HashAlgorithm::Md5, b"hello");
        assert_eq!(md5.to_string(), "md5:5d41402abc4b2a76b9719d911017c592");
        assert!(ContentHash::parse("sha256:abc").is_err());
        assert!(ContentHash::parse("crc32:00000000").is_err());
        assert!(ContentHash::parse("nohash").is_err());
    }

    #[test]
    fn source_locators() {
        for text in [
            "registry+https://index.example.com",
            "path+/work/local-lib",
            "git+https://example.com/tool.git#0123abcd",
        ] {
            let locator = SourceLocator::parse(text).unwrap();
            assert_eq!(locator.to_string(), text);
        }
        assert!(SourceLocator::parse("git+https://example.com/tool.git").is_err());
        assert!(SourceLocator::parse("ftp+x").is_err());
    }
}
