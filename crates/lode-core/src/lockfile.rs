//! `Lode.lock`: the durable, fully pinned result of one resolution.
//!
//! Reading fails closed. Anything this version cannot interpret with
//! certainty is a [`LodeError::Format`] and no partial result is returned.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use lode_util::errors::{LodeError, LodeResult};

use crate::marker::EnvironmentMarker;
use crate::package::{ContentHash, PackageName, SourceLocator};
use crate::version::Version;

/// The major/minor format version this build writes.
pub const FORMAT_MAJOR: u64 = 1;
pub const FORMAT_MINOR: u64 = 0;

const HEADER: &str = "# This file is generated by lode. Do not edit it by hand.\n";

/// A parsed lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockFile {
    #[serde(rename = "format-version")]
    pub format_version: String,
    /// `sha256:<hex>` of the manifest this lock was produced from.
    pub fingerprint: String,
    #[serde(default, rename = "package")]
    pub packages: Vec<LockEntry>,
}

/// One pinned package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    pub name: PackageName,
    pub version: Version,
    pub source: SourceLocator,
    pub hash: ContentHash,
    #[serde(default)]
    pub prebuilt: bool,
    /// When this package is needed; omitted when always.
    #[serde(default, skip_serializing_if = "EnvironmentMarker::is_any")]
    pub markers: EnvironmentMarker,
    /// Names of the locked direct dependencies.
    #[serde(default)]
    pub dependencies: Vec<PackageName>,
}

impl LockFile {
    /// Build a lock file, putting entries and dependency lists in canonical order.
    pub fn new(fingerprint: impl Into<String>, mut packages: Vec<LockEntry>) -> Self {
        packages.sort_by(|a, b| a.name.cmp(&b.name));
        for entry in &mut packages {
            entry.dependencies.sort();
            entry.dependencies.dedup();
        }
        Self {
            format_version: format!("{FORMAT_MAJOR}.{FORMAT_MINOR}"),
            fingerprint: fingerprint.into(),
            packages,
        }
    }

    /// Load and parse a `Lode.lock` file from the given path.
    pub fn from_path(path: &Path) -> LodeResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| LodeError::Format {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::parse(&content)
    }

    /// Parse and validate lock file text.
    pub fn parse(content: &str) -> LodeResult<Self> {
        let format = |message: String| LodeError::Format { message };

        // Check the format tag before interpreting anything else, so a
        // future layout is reported as a version mismatch and not as
        // whatever field it happens to trip over.
        let table: toml::Table = toml::from_str(content)
            .map_err(|e| format(format!("Failed to parse Lode.lock: {e}")))?;
        let tag = table
            .get("format-version")
            .and_then(toml::Value::as_str)
            .ok_or_else(|| format("missing `format-version`".to_string()))?;
        check_format_version(tag)?;

        let lock: LockFile = toml::from_str(content)
            .map_err(|e| format(format!("Failed to parse Lode.lock: {e}")))?;
        lock.validate()?;
        Ok(lock)
    }

    fn validate(&self) -> LodeResult<()> {
        let format = |message: String| LodeError::Format { message };

        if !self.fingerprint.starts_with("sha256:") || self.fingerprint.len() <= "sha256:".len() {
            return Err(format(format!(
                "invalid fingerprint `{}`",
                self.fingerprint
            )));
        }

        for pair in self.packages.windows(2) {
            match pair[0].name.cmp(&pair[1].name) {
                std::cmp::Ordering::Less => {}
                std::cmp::Ordering::Equal => {
                    return Err(format(format!("duplicate entry for `{}`", pair[0].name)));
                }
                std::cmp::Ordering::Greater => {
                    return Err(format(format!(
                        "entries out of order: `{}` before `{}`",
                        pair[0].name, pair[1].name
                    )));
                }
            }
        }

        let known: BTreeSet<&PackageName> = self.packages.iter().map(|p| &p.name).collect();
        for entry in &self.packages {
            if let Some(missing) = entry.dependencies.iter().find(|d| !known.contains(d)) {
                return Err(format(format!(
                    "`{}` depends on `{missing}`, which has no entry",
                    entry.name
                )));
            }
        }
        Ok(())
    }

    /// Canonical TOML text.
    pub fn to_toml_string(&self) -> LodeResult<String> {
        let body = toml::to_string_pretty(self).map_err(|e| LodeError::Format {
            message: format!("Failed to serialize Lode.lock: {e}"),
        })?;
        Ok(format!("{HEADER}{body}"))
    }

    /// Write the lock file atomically.
    pub fn write_to(&self, path: &Path) -> LodeResult<()> {
        let text = self.to_toml_string()?;
        lode_util::fs::atomic_write(path, text.as_bytes())?;
        tracing::debug!("wrote {} ({} packages)", path.display(), self.packages.len());
        Ok(())
    }

    /// Whether this lock was produced from a manifest with `fingerprint`.
    pub fn is_fresh(&self, fingerprint: &str) -> bool {
        self.fingerprint == fingerprint
    }

    pub fn get(&self, name: &PackageName) -> Option<&LockEntry> {
        self.packages
            .binary_search_by(|p| p.name.cmp(name))
            .ok()
            .map(|idx| &self.packages[idx])
    }
}

/// Accept `1.x` for any `x`; a newer minor only adds optional fields.
fn check_format_version(tag: &str) -> LodeResult<()> {
    let mismatch = || LodeError::Format {
        message: format!(
            "unsupported format-version `{tag}` (this lode reads {FORMAT_MAJOR}.x)"
        ),
    };
    let (major, minor) = tag.split_once('.').ok_or_else(mismatch)?;
    let major: u64 = major.parse().map_err(|_| mismatch())?;
    let _minor: u64 = minor.parse().map_err(|_| mismatch())?;
    if major != FORMAT_MAJOR {
        return Err(mismatch());
    }
    Ok(())
}
