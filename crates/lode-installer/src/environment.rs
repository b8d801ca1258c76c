//! The target environment: what is installed, and how packages are
//! staged, promoted and removed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use lode_core::package::{ContentHash, PackageName};
use lode_core::version::Version;
use lode_util::errors::{LodeError, LodeResult};

use crate::extract;

/// Metadata file written into every installed package directory.
pub const RECORD_FILE: &str = ".lode-record.json";
const STAGING_DIR: &str = ".lode-staging";
const TRASH_DIR: &str = ".lode-trash";

/// What the environment knows about one installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
    pub name: PackageName,
    pub version: Version,
    pub hash: ContentHash,
    #[serde(default)]
    pub dependencies: Vec<PackageName>,
}

/// Introspection and mutation of an install target.
///
/// Every package owns a disjoint part of the environment, so operations on
/// different packages may run concurrently.
pub trait Environment: Send + Sync {
    /// A package unpacked but not yet visible in the environment.
    type Staged: Send;

    /// Every package currently installed, by name.
    fn installed(&self) -> LodeResult<BTreeMap<PackageName, InstallRecord>>;

    /// Unpack `archive` for `record` somewhere invisible to readers.
    fn stage(&self, record: &InstallRecord, archive: &[u8]) -> LodeResult<Self::Staged>;

    /// Make a staged package visible, replacing any installed version.
    fn commit(&self, staged: Self::Staged) -> LodeResult<()>;

    /// Remove an installed package. Removing an absent package is a no-op.
    fn remove(&self, name: &PackageName) -> LodeResult<()>;
}

/// A staged package directory. Dropping it without committing deletes it.
#[derive(Debug)]
pub struct StagedPackage {
    record: InstallRecord,
    dir: TempDir,
}

impl StagedPackage {
    pub fn record(&self) -> &InstallRecord {
        &self.record
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// A directory holding one subdirectory per installed package.
#[derive(Debug, Clone)]
pub struct SiteEnvironment {
    root: PathBuf,
}

impl SiteEnvironment {
    /// Open (creating if needed) the environment at `root`, clearing any
    /// staging or trash left behind by an interrupted run.
    pub fn open(root: impl Into<PathBuf>) -> LodeResult<Self> {
        let root = root.into();
        lode_util::fs::ensure_dir(&root)?;
        for leftover in [STAGING_DIR, TRASH_DIR] {
            let path = root.join(leftover);
            if path.exists() {
                tracing::debug!("clearing leftover {}", path.display());
                fs::remove_dir_all(&path)?;
            }
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory `name` is (or would be) installed in.
    pub fn package_dir(&self, name: &PackageName) -> PathBuf {
        self.root.join(name.as_str())
    }

    fn read_record(dir: &Path) -> Option<InstallRecord> {
        let content = fs::read_to_string(dir.join(RECORD_FILE)).ok()?;
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("ignoring unreadable record in {}: {e}", dir.display());
                None
            }
        }
    }

    /// Move `dir` into the trash and delete it there.
    fn discard(&self, name: &PackageName, dir: &Path) -> LodeResult<()> {
        let trash = self.trash_slot(name)?;
        fs::rename(dir, trash.path().join("old")).map_err(|e| env_error(name, "discard", e))?;
        trash.close().map_err(|e| env_error(name, "delete", e))
    }

    fn trash_slot(&self, name: &PackageName) -> LodeResult<TempDir> {
        let trash = self.root.join(TRASH_DIR);
        lode_util::fs::ensure_dir(&trash)?;
        tempfile::Builder::new()
            .prefix(&format!("{name}-"))
            .tempdir_in(&trash)
            .map_err(|e| env_error(name, "prepare removal of", e))
    }
}

fn env_error(name: &PackageName, action: &str, e: std::io::Error) -> LodeError {
    LodeError::Environment {
        package: name.to_string(),
        message: format!("failed to {action} {name}: {e}"),
    }
}

impl Environment for SiteEnvironment {
    type Staged = StagedPackage;

    fn installed(&self) -> LodeResult<BTreeMap<PackageName, InstallRecord>> {
        let mut installed = BTreeMap::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with('.') || !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(record) = Self::read_record(&entry.path()) else {
                continue;
            };
            if record.name.as_str() != file_name {
                tracing::warn!(
                    "record in {} names {}, skipping",
                    entry.path().display(),
                    record.name
                );
                continue;
            }
            installed.insert(record.name.clone(), record);
        }
        Ok(installed)
    }

    fn stage(&self, record: &InstallRecord, archive: &[u8]) -> LodeResult<StagedPackage> {
        let name = &record.name;
        let staging = self.root.join(STAGING_DIR);
        lode_util::fs::ensure_dir(&staging)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{name}-"))
            .tempdir_in(&staging)
            .map_err(|e| env_error(name, "stage", e))?;

        extract::extract_zip(name, archive, dir.path())?;
        extract::flatten_wrapper(dir.path(), &format!("{name}-{}", record.version))?;

        let json = serde_json::to_string_pretty(record).map_err(|e| LodeError::Environment {
            package: name.to_string(),
            message: e.to_string(),
        })?;
        fs::write(dir.path().join(RECORD_FILE), json)
            .map_err(|e| env_error(name, "write record for", e))?;

        Ok(StagedPackage {
            record: record.clone(),
            dir,
        })
    }

    fn commit(&self, staged: StagedPackage) -> LodeResult<()> {
        let name = &staged.record.name;
        let dest = self.package_dir(name);

        let previous = if dest.exists() {
            let slot = self.trash_slot(name)?;
            let parked = slot.path().join("old");
            fs::rename(&dest, &parked).map_err(|e| env_error(name, "replace", e))?;
            Some((slot, parked))
        } else {
            None
        };

        if let Err(e) = fs::rename(staged.dir.path(), &dest) {
            if let Some((_, parked)) = &previous {
                if let Err(restore) = fs::rename(parked, &dest) {
                    tracing::warn!("could not restore previous {name}: {restore}");
                }
            }
            return Err(env_error(name, "promote", e));
        }

        if let Some((slot, _)) = previous {
            if let Err(e) = slot.close() {
                tracing::warn!("could not delete replaced {name}: {e}");
            }
        }
        Ok(())
    }

    fn remove(&self, name: &PackageName) -> LodeResult<()> {
        let dir = self.package_dir(name);
        if !dir.exists() {
            return Ok(());
        }
        self.discard(name, &dir)
    }
}
