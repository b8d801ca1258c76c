//! The closed set of package source kinds.

use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt};

use lode_core::package::{ContentHash, PackageCandidate, PackageName, VersionEntry};
use lode_core::version::Version;
use lode_util::errors::LodeResult;

use crate::git::GitSource;
use crate::path::PathSource;
use crate::registry::RegistrySource;

/// Artifact bytes together with the hash they actually have.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub hash: ContentHash,
}

/// Where a package's versions, metadata and artifacts come from.
#[derive(Debug, Clone)]
pub enum PackageSource {
    Registry(RegistrySource),
    Path(PathSource),
    Git(Arc<GitSource>),
}

impl PackageSource {
    pub fn kind(&self) -> &'static str {
        match self {
            PackageSource::Registry(_) => "registry",
            PackageSource::Path(_) => "path",
            PackageSource::Git(_) => "git",
        }
    }

    /// All versions of `name`, as a lazy stream. Restartable: each call
    /// begins a fresh listing.
    pub fn list_versions<'a>(
        &'a self,
        name: &'a PackageName,
    ) -> BoxStream<'a, LodeResult<VersionEntry>> {
        match self {
            PackageSource::Registry(registry) => registry.list_versions(name),
            PackageSource::Path(path) => {
                stream::iter(match path.list_versions(name) {
                    Ok(versions) => versions.into_iter().map(Ok).collect::<Vec<_>>(),
                    Err(e) => vec![Err(e)],
                })
                .boxed()
            }
            PackageSource::Git(git) => stream::once(git.list_versions(name))
                .flat_map(|result| {
                    stream::iter(match result {
                        Ok(versions) => versions.into_iter().map(Ok).collect::<Vec<_>>(),
                        Err(e) => vec![Err(e)],
                    })
                })
                .boxed(),
        }
    }

    /// Dependency declarations of one version; never downloads the artifact
    /// from a registry.
    pub async fn get_metadata(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> LodeResult<PackageCandidate> {
        match self {
            PackageSource::Registry(registry) => registry.get_metadata(name, version).await,
            PackageSource::Path(path) => path.get_metadata(name, version, path.locator()),
            PackageSource::Git(git) => git.get_metadata(name, version).await,
        }
    }

    /// The artifact of a candidate. `hash` is computed over the returned
    /// bytes with the algorithm of the candidate's recorded hash; callers
    /// compare the two.
    pub async fn get_artifact(
        &self,
        name: &PackageName,
        version: &Version,
        expected: &ContentHash,
    ) -> LodeResult<Artifact> {
        let bytes = match self {
            PackageSource::Registry(registry) => registry.get_artifact(name, version).await?,
            PackageSource::Path(path) => path.pack()?,
            PackageSource::Git(git) => git.get_artifact(name).await?,
        };
        let hash = ContentHash::compute(expected.algorithm(), &bytes);
        Ok(Artifact { bytes, hash })
    }
}
