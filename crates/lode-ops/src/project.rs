//! A project on disk: its manifest, its lock file, and the sources its
//! dependencies come from.

use std::path::{Path, PathBuf};

use lode_core::config::GlobalConfig;
use lode_core::lockfile::LockFile;
use lode_core::manifest::Manifest;
use lode_core::package::PackageName;
use lode_core::version::Version;
use lode_resolver::graph::DependencyGraph;
use lode_resolver::solver::RootPackage;
use lode_source::cache::ArtifactCache;
use lode_source::download::Downloader;
use lode_source::set::SourceSet;
use lode_util::errors::{LodeError, LodeResult};

pub const MANIFEST_FILE: &str = "Lode.toml";
pub const LOCK_FILE: &str = "Lode.lock";

/// Default install target, relative to the project root.
pub const DEFAULT_TARGET: &str = ".lode/env";

#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    pub manifest: Manifest,
    pub config: GlobalConfig,
}

impl Project {
    /// Load the manifest in `root`.
    pub fn load(root: &Path, config: &GlobalConfig) -> LodeResult<Self> {
        let manifest = Manifest::load(&root.join(MANIFEST_FILE))?;
        Ok(Self {
            root: root.to_path_buf(),
            manifest,
            config: config.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// The existing lock file, `None` when there is none. A lock that
    /// cannot be read is an error.
    pub fn read_lock(&self) -> LodeResult<Option<LockFile>> {
        let path = self.lock_path();
        if !path.is_file() {
            return Ok(None);
        }
        LockFile::from_path(&path).map(Some)
    }

    /// The lock file, which must exist.
    pub fn require_lock(&self) -> LodeResult<LockFile> {
        self.read_lock()?.ok_or_else(|| LodeError::Generic {
            message: format!(
                "{} not found in {}; run `lode lock` first",
                LOCK_FILE,
                self.root.display()
            ),
        })
    }

    /// The manifest's registry, else the configured one.
    pub fn registry_url(&self) -> &str {
        self.manifest
            .registry
            .as_ref()
            .map(|r| r.url.as_str())
            .unwrap_or(&self.config.registry.url)
    }

    /// Sources for this project, with the shared artifact cache attached.
    pub fn sources(&self) -> LodeResult<SourceSet> {
        let downloader = Downloader::new(self.config.network.clone())?;
        let cache_dir = self.config.cache_dir();
        Ok(
            SourceSet::new(self.registry_url(), downloader, cache_dir.join("git"))
                .with_artifact_cache(ArtifactCache::new(cache_dir.join("artifacts"))),
        )
    }

    pub fn root_package(&self) -> LodeResult<RootPackage> {
        Ok(RootPackage {
            name: self.package_name()?,
            version: self.package_version()?,
            dependencies: self.manifest.direct_dependencies(&self.root)?,
        })
    }

    fn package_name(&self) -> LodeResult<PackageName> {
        PackageName::new(&self.manifest.package.name).map_err(|e| LodeError::Manifest {
            message: e.to_string(),
        })
    }

    fn package_version(&self) -> LodeResult<Version> {
        Version::parse(&self.manifest.package.version).map_err(|e| LodeError::Manifest {
            message: format!("[package] version: {e}"),
        })
    }

    /// The dependency graph recorded in `lock`, rooted at this project.
    pub fn locked_graph(&self, lock: &LockFile) -> LodeResult<DependencyGraph> {
        let direct: Vec<PackageName> = self
            .manifest
            .dependencies
            .keys()
            .filter_map(|name| PackageName::new(name).ok())
            .collect();
        Ok(DependencyGraph::from_lock(
            lock,
            self.package_name()?,
            self.package_version()?,
            &direct,
        ))
    }
}
