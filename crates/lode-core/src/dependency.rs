use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constraint::VersionConstraint;
use crate::marker::EnvironmentMarker;
use crate::package::PackageName;

/// A dependency edge: which package, which versions, under which conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub name: PackageName,
    pub constraint: VersionConstraint,
    pub marker: EnvironmentMarker,
    pub extras: BTreeSet<String>,
    pub source: SourceSpec,
}

impl Dependency {
    /// A registry dependency with no marker and no extras.
    pub fn new(name: PackageName, constraint: VersionConstraint) -> Self {
        Self {
            name,
            constraint,
            marker: EnvironmentMarker::Any,
            extras: BTreeSet::new(),
            source: SourceSpec::Registry,
        }
    }

    pub fn with_marker(mut self, marker: EnvironmentMarker) -> Self {
        self.marker = marker;
        self
    }

    pub fn with_extras<I, S>(mut self, extras: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extras = extras.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_source(mut self, source: SourceSpec) -> Self {
        self.source = source;
        self
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        write!(f, " ({})", self.constraint)?;
        if !self.marker.is_any() {
            write!(f, " ; {}", self.marker)?;
        }
        Ok(())
    }
}

/// Where the versions of a dependency come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceSpec {
    #[default]
    Registry,
    Path(PathBuf),
    Git { url: String, reference: GitReference },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GitReference {
    DefaultBranch,
    Branch(String),
    Tag(String),
    Rev(String),
}

impl GitReference {
    /// The argument handed to `git checkout`, if any.
    pub fn as_checkout(&self) -> Option<&str> {
        match self {
            GitReference::DefaultBranch => None,
            GitReference::Branch(r) | GitReference::Tag(r) | GitReference::Rev(r) => Some(r),
        }
    }
}

/// A dependency as written in `Lode.toml`.
///
/// Supports both a bare constraint string (`"^2.31"`) and a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    Short(String),
    Detailed(DetailedDependency),
}

/// A dependency with explicit source, extras, or markers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailedDependency {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extras: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markers: Option<String>,
}

impl DependencySpec {
    /// Turn a manifest entry into a [`Dependency`]. Relative paths are
    /// resolved against `base_dir`, the directory holding the manifest.
    pub fn to_dependency(&self, name: &str, base_dir: &Path) -> Result<Dependency, String> {
        let name = PackageName::new(name).map_err(|e| e.to_string())?;
        let detailed = match self {
            DependencySpec::Short(constraint) => {
                let constraint =
                    VersionConstraint::parse(constraint).map_err(|e| format!("{name}: {e}"))?;
                return Ok(Dependency::new(name, constraint));
            }
            DependencySpec::Detailed(d) => d,
        };

        let constraint = match &detailed.version {
            Some(text) => VersionConstraint::parse(text).map_err(|e| format!("{name}: {e}"))?,
            None => VersionConstraint::any(),
        };
        let marker = match &detailed.markers {
            Some(text) => EnvironmentMarker::parse(text).map_err(|e| format!("{name}: {e}"))?,
            None => EnvironmentMarker::Any,
        };

        let refs = [&detailed.rev, &detailed.branch, &detailed.tag]
            .iter()
            .filter(|r| r.is_some())
            .count();
        if refs > 1 {
            return Err(format!(
                "{name}: only one of `rev`, `branch` or `tag` may be given"
            ));
        }

        let source = match (&detailed.path, &detailed.git) {
            (Some(_), Some(_)) => {
                return Err(format!("{name}: `path` and `git` are mutually exclusive"));
            }
            (Some(path), None) => SourceSpec::Path(base_dir.join(path)),
            (None, Some(url)) => {
                let reference = if let Some(rev) = &detailed.rev {
                    GitReference::Rev(rev.clone())
                } else if let Some(branch) = &detailed.branch {
                    GitReference::Branch(branch.clone())
                } else if let Some(tag) = &detailed.tag {
                    GitReference::Tag(tag.clone())
                } else {
                    GitReference::DefaultBranch
                };
                SourceSpec::Git {
                    url: url.clone(),
                    reference,
                }
            }
            (None, None) => {
                if refs > 0 {
                    return Err(format!("{name}: `rev`/`branch`/`tag` require `git`"));
                }
                SourceSpec::Registry
            }
        };

        Ok(Dependency {
            name,
            constraint,
            marker,
            extras: detailed.extras.iter().cloned().collect(),
            source,
        })
    }
}
