//! The seam between the solver and wherever package data comes from.

use std::sync::Arc;

use async_trait::async_trait;

use lode_core::package::{PackageCandidate, PackageName, VersionEntry};
use lode_core::version::Version;
use lode_source::set::SourceSet;
use lode_util::errors::LodeResult;

/// Answers the solver's questions about packages.
///
/// Implementations are expected to memoize: the solver asks the same
/// question many times during one run.
#[async_trait]
pub trait DependencyProvider: Send + Sync {
    /// Every known version of `name`, ascending.
    async fn available_versions(&self, name: &PackageName) -> LodeResult<Arc<Vec<VersionEntry>>>;

    /// Dependency metadata of one version.
    async fn candidate(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> LodeResult<Arc<PackageCandidate>>;
}

#[async_trait]
impl DependencyProvider for SourceSet {
    async fn available_versions(&self, name: &PackageName) -> LodeResult<Arc<Vec<VersionEntry>>> {
        self.versions(name).await
    }

    async fn candidate(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> LodeResult<Arc<PackageCandidate>> {
        self.metadata(name, version).await
    }
}
