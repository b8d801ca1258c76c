//! Routing package names to sources, with per-run memoization.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::TryStreamExt;

use lode_core::dependency::{Dependency, GitReference, SourceSpec};
use lode_core::package::{ContentHash, PackageCandidate, PackageName, SourceLocator, VersionEntry};
use lode_core::version::Version;
use lode_util::errors::{LodeError, LodeResult};

use crate::cache::ArtifactCache;
use crate::download::Downloader;
use crate::git::GitSource;
use crate::memo::DedupCache;
use crate::path::PathSource;
use crate::registry::RegistrySource;
use crate::source::{Artifact, PackageSource};

/// Every source one run may consult.
///
/// Names default to the registry. Path and git dependencies register an
/// override for their name the first time they are seen, whether in the
/// manifest or in the metadata of a path/git package.
#[derive(Debug)]
pub struct SourceSet {
    registry: RegistrySource,
    downloader: Downloader,
    git_root: PathBuf,
    artifact_cache: Option<ArtifactCache>,
    overrides: Mutex<BTreeMap<PackageName, PackageSource>>,
    versions: DedupCache<PackageName, Arc<Vec<VersionEntry>>>,
    metadata: DedupCache<(PackageName, Version), Arc<PackageCandidate>>,
    fetches: AtomicUsize,
}

impl SourceSet {
    /// `cache_dir` holds git checkouts (and nothing else unless an artifact
    /// cache is attached).
    pub fn new(registry_url: &str, downloader: Downloader, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry: RegistrySource::new(registry_url, downloader.clone()),
            downloader,
            git_root: cache_dir.into(),
            artifact_cache: None,
            overrides: Mutex::new(BTreeMap::new()),
            versions: DedupCache::new(),
            metadata: DedupCache::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_artifact_cache(mut self, cache: ArtifactCache) -> Self {
        self.artifact_cache = Some(cache);
        self
    }

    pub fn registry(&self) -> &RegistrySource {
        &self.registry
    }

    /// Remember where a dependency's package lives. The first registration
    /// for a name wins.
    pub fn register(&self, dep: &Dependency) {
        let source = match &dep.source {
            SourceSpec::Registry => return,
            SourceSpec::Path(path) => PackageSource::Path(PathSource::new(path)),
            SourceSpec::Git { url, reference } => PackageSource::Git(Arc::new(GitSource::new(
                url.clone(),
                reference.clone(),
                self.git_root.clone(),
            ))),
        };
        let mut overrides = self.overrides.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = overrides.get(&dep.name) {
            if existing.kind() != source.kind() {
                tracing::warn!(
                    "{} is already provided by a {} source; ignoring {} source",
                    dep.name,
                    existing.kind(),
                    source.kind()
                );
            }
            return;
        }
        tracing::debug!("{} comes from a {} source", dep.name, source.kind());
        overrides.insert(dep.name.clone(), source);
    }

    pub fn register_all<'a>(&self, deps: impl IntoIterator<Item = &'a Dependency>) {
        for dep in deps {
            self.register(dep);
        }
    }

    /// The source that answers for `name`.
    pub fn source_for(&self, name: &PackageName) -> PackageSource {
        let overrides = self.overrides.lock().unwrap_or_else(|e| e.into_inner());
        overrides
            .get(name)
            .cloned()
            .unwrap_or_else(|| PackageSource::Registry(self.registry.clone()))
    }

    /// The source a lock-file locator points at.
    pub fn source_for_locator(&self, locator: &SourceLocator) -> PackageSource {
        match locator {
            SourceLocator::Registry { url } if url.trim_end_matches('/') == self.registry.url() => {
                PackageSource::Registry(self.registry.clone())
            }
            SourceLocator::Registry { url } => {
                PackageSource::Registry(RegistrySource::new(url, self.downloader.clone()))
            }
            SourceLocator::Path { path } => PackageSource::Path(PathSource::new(path)),
            SourceLocator::Git { url, commit } => PackageSource::Git(Arc::new(GitSource::new(
                url.clone(),
                GitReference::Rev(commit.clone()),
                self.git_root.clone(),
            ))),
        }
    }

    /// Every version of `name`, ascending. Listed once per run.
    pub async fn versions(&self, name: &PackageName) -> LodeResult<Arc<Vec<VersionEntry>>> {
        self.versions
            .get_or_try_init(name, || async {
                self.fetches.fetch_add(1, Ordering::Relaxed);
                let source = self.source_for(name);
                let mut entries: Vec<VersionEntry> =
                    source.list_versions(name).try_collect().await?;
                entries.sort_by(|a, b| a.version.cmp(&b.version));
                entries.dedup_by(|a, b| a.version == b.version);
                Ok::<_, LodeError>(Arc::new(entries))
            })
            .await
    }

    /// Metadata of one version. Fetched once per run.
    pub async fn metadata(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> LodeResult<Arc<PackageCandidate>> {
        let key = (name.clone(), version.clone());
        self.metadata
            .get_or_try_init(&key, || async {
                self.fetches.fetch_add(1, Ordering::Relaxed);
                let candidate = self.source_for(name).get_metadata(name, version).await?;
                self.register_all(&candidate.dependencies);
                self.register_all(candidate.extras.values().flatten());
                Ok::<_, LodeError>(Arc::new(candidate))
            })
            .await
    }

    /// Fetch an artifact, consulting the artifact cache first. Bytes are
    /// only cached when they match `expected`.
    pub async fn artifact(
        &self,
        name: &PackageName,
        version: &Version,
        locator: &SourceLocator,
        expected: &ContentHash,
    ) -> LodeResult<Artifact> {
        if let Some(bytes) = self.artifact_cache.as_ref().and_then(|c| c.get(expected)) {
            return Ok(Artifact {
                bytes,
                hash: expected.clone(),
            });
        }
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let artifact = self
            .source_for_locator(locator)
            .get_artifact(name, version, expected)
            .await?;
        if &artifact.hash == expected {
            if let Some(cache) = &self.artifact_cache {
                if let Err(e) = cache.put(expected, &artifact.bytes) {
                    tracing::warn!("could not cache artifact for {name}: {e}");
                }
            }
        }
        Ok(artifact)
    }

    /// Number of source requests issued so far (cache hits excluded).
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}
