//! Operation: resolve the manifest and write Lode.lock.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use lode_core::config::GlobalConfig;
use lode_core::lockfile::LockFile;
use lode_core::package::PackageName;
use lode_core::version::Version;
use lode_resolver::resolver;
use lode_resolver::solver::SolverOptions;
use lode_source::set::SourceSet;
use lode_util::errors::{LodeError, LodeResult};

use crate::project::{Project, LOCK_FILE};

/// Options for `lode lock`.
#[derive(Debug, Default)]
pub struct LockOptions {
    /// Only compare the lock's fingerprint with the manifest.
    pub check: bool,
}

/// Which locked versions a resolution may move away from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Refresh {
    /// Prefer every locked version that still satisfies the manifest.
    #[default]
    Keep,
    /// Ignore the previous lock entirely.
    All,
    /// Ignore the locked versions of these packages only.
    Only(BTreeSet<PackageName>),
}

/// Resolve the project in `project_root` and write `Lode.lock`.
pub async fn lock(
    project_root: &Path,
    config: &GlobalConfig,
    opts: &LockOptions,
) -> miette::Result<()> {
    let project = Project::load(project_root, config)?;
    if opts.check {
        return Ok(check(&project)?);
    }
    let sources = project.sources()?;
    relock(&project, &sources, &Refresh::Keep).await?;
    Ok(())
}

/// Fail unless the lock file was produced from the current manifest.
pub fn check(project: &Project) -> LodeResult<()> {
    let lock = project.require_lock()?;
    if lock.is_fresh(&project.manifest.fingerprint()) {
        lode_util::progress::status_info("Fresh", &format!("{LOCK_FILE} matches the manifest"));
        Ok(())
    } else {
        Err(LodeError::Generic {
            message: format!("{LOCK_FILE} is out of date with the manifest; run `lode lock`"),
        })
    }
}

/// Resolve `project` against `sources`, seeded by its current lock, and
/// write the result when it differs from what is on disk.
pub async fn relock(
    project: &Project,
    sources: &SourceSet,
    refresh: &Refresh,
) -> LodeResult<LockFile> {
    let previous = match project.read_lock() {
        Ok(lock) => lock,
        Err(e) => {
            lode_util::progress::status_warn("Warning", &format!("ignoring existing lock: {e}"));
            None
        }
    };

    let root = project.root_package()?;
    sources.register_all(&root.dependencies);
    let options = solver_options(project, previous.as_ref(), refresh);

    let sp = lode_util::progress::spinner("Resolving dependencies...");
    let resolution = resolver::resolve(&root, sources, &options).await;
    sp.finish_and_clear();
    let resolution = resolution?;

    let lock = resolution.graph.to_lock(project.manifest.fingerprint());
    for change in lock_changes(previous.as_ref(), &lock) {
        change.print();
    }
    if previous.as_ref() != Some(&lock) {
        lock.write_to(&project.lock_path())?;
    }
    lode_util::progress::status(
        "Locked",
        &format!(
            "{} packages in {:.2}s",
            lock.packages.len(),
            resolution.elapsed.as_secs_f64()
        ),
    );
    Ok(lock)
}

fn solver_options(project: &Project, previous: Option<&LockFile>, refresh: &Refresh) -> SolverOptions {
    let locked: BTreeMap<PackageName, Version> = match (previous, refresh) {
        (Some(lock), Refresh::Keep | Refresh::Only(_)) => lock
            .packages
            .iter()
            .map(|e| (e.name.clone(), e.version.clone()))
            .collect(),
        _ => BTreeMap::new(),
    };
    let use_latest = match refresh {
        Refresh::Only(names) => names.clone(),
        _ => BTreeSet::new(),
    };
    SolverOptions {
        allow_prereleases: project.manifest.resolver.allow_prereleases,
        prefer_prebuilt: project.manifest.resolver.prefer_prebuilt,
        environment: project.manifest.target_environment(),
        locked,
        use_latest,
    }
}

/// One package that differs between two locks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockChange {
    Added(PackageName, Version),
    Updated(PackageName, Version, Version),
    Removed(PackageName, Version),
}

impl LockChange {
    fn print(&self) {
        let label = match self {
            LockChange::Added(..) => "Adding",
            LockChange::Updated(..) => "Updating",
            LockChange::Removed(..) => "Removing",
        };
        lode_util::progress::status(label, &self.to_string());
    }
}

impl fmt::Display for LockChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockChange::Added(name, v) | LockChange::Removed(name, v) => write!(f, "{name} v{v}"),
            LockChange::Updated(name, from, to) => write!(f, "{name} v{from} -> v{to}"),
        }
    }
}

/// Differences from `old` to `new`, by name.
pub fn lock_changes(old: Option<&LockFile>, new: &LockFile) -> Vec<LockChange> {
    let before: BTreeMap<&PackageName, &Version> = old
        .map(|l| l.packages.iter().map(|e| (&e.name, &e.version)).collect())
        .unwrap_or_default();
    let after: BTreeMap<&PackageName, &Version> =
        new.packages.iter().map(|e| (&e.name, &e.version)).collect();

    let names: BTreeSet<&PackageName> = before.keys().chain(after.keys()).copied().collect();
    names
        .into_iter()
        .filter_map(|name| match (before.get(name), after.get(name)) {
            (None, Some(v)) => Some(LockChange::Added(name.clone(), (*v).clone())),
            (Some(v), None) => Some(LockChange::Removed(name.clone(), (*v).clone())),
            (Some(a), Some(b)) if a != b => {
                Some(LockChange::Updated(name.clone(), (*a).clone(), (*b).clone()))
            }
            _ => None,
        })
        .collect()
}
