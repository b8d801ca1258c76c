//! Registry index client.
//!
//! Layout under the registry base URL:
//!
//! - `{name}/versions.json`: a page of the version listing, with a `next`
//!   link to the following page (absolute, or relative to the base URL)
//! - `{name}/{version}/metadata.json`: dependency declarations and the
//!   artifact's content hash
//! - `{name}/{version}/{name}-{version}.zip`: the artifact

use std::collections::BTreeMap;

use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use lode_core::constraint::VersionConstraint;
use lode_core::dependency::Dependency;
use lode_core::marker::EnvironmentMarker;
use lode_core::package::{PackageCandidate, PackageName, SourceLocator, VersionEntry};
use lode_core::version::Version;
use lode_util::errors::{LodeError, LodeResult};

use crate::checksum;
use crate::download::{Downloader, Subject};

/// One page of `versions.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionsPage {
    pub versions: Vec<VersionEntry>,
    #[serde(default)]
    pub next: Option<String>,
}

/// `metadata.json` for one version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataDocument {
    #[serde(default)]
    pub dependencies: Vec<DependencyDocument>,
    #[serde(default)]
    pub extras: BTreeMap<String, Vec<DependencyDocument>>,
    pub hash: String,
    #[serde(default)]
    pub prebuilt: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyDocument {
    pub name: String,
    #[serde(default = "any_constraint")]
    pub constraint: String,
    #[serde(default)]
    pub markers: Option<String>,
    #[serde(default)]
    pub extras: Vec<String>,
}

fn any_constraint() -> String {
    "*".to_string()
}

impl DependencyDocument {
    fn to_dependency(&self) -> Result<Dependency, String> {
        let name = PackageName::new(&self.name).map_err(|e| e.to_string())?;
        let constraint = VersionConstraint::parse(&self.constraint).map_err(|e| e.to_string())?;
        let marker = match &self.markers {
            Some(text) => EnvironmentMarker::parse(text).map_err(|e| e.to_string())?,
            None => EnvironmentMarker::Any,
        };
        Ok(Dependency::new(name, constraint)
            .with_marker(marker)
            .with_extras(self.extras.iter().cloned()))
    }
}

/// A package index reachable over HTTP.
#[derive(Debug, Clone)]
pub struct RegistrySource {
    url: String,
    downloader: Downloader,
}

impl RegistrySource {
    pub fn new(url: &str, downloader: Downloader) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            downloader,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn locator(&self) -> SourceLocator {
        SourceLocator::Registry {
            url: self.url.clone(),
        }
    }

    fn resolve_link(&self, link: &str) -> String {
        if link.starts_with("http://") || link.starts_with("https://") {
            link.to_string()
        } else {
            format!("{}/{}", self.url, link.trim_start_matches('/'))
        }
    }

    /// Lazily page through the version listing of `name`.
    ///
    /// Each page is requested only once the previous one has been consumed,
    /// and every call starts again from the first page.
    pub fn list_versions<'a>(
        &'a self,
        name: &'a PackageName,
    ) -> BoxStream<'a, LodeResult<VersionEntry>> {
        let first = format!("{}/{name}/versions.json", self.url);
        stream::try_unfold(Some((first, true)), move |state| async move {
            let Some((url, is_first)) = state else {
                return Ok(None);
            };
            let subject = Subject {
                package: name.as_str(),
                version: None,
            };
            let page: VersionsPage = match self.downloader.get_json(&url, subject).await? {
                Some(page) => page,
                None if is_first => {
                    return Err(LodeError::NotFound {
                        package: name.to_string(),
                        version: None,
                    });
                }
                None => {
                    return Err(LodeError::SourceFetch {
                        package: name.to_string(),
                        version: None,
                        message: format!("listing page {url} disappeared"),
                        retryable: false,
                    });
                }
            };
            tracing::debug!("{name}: {} versions from {url}", page.versions.len());
            let next = page.next.as_deref().map(|link| (self.resolve_link(link), false));
            Ok::<_, LodeError>(Some((page.versions, next)))
        })
        .map_ok(|versions| stream::iter(versions.into_iter().map(Ok::<_, LodeError>)))
        .try_flatten()
        .boxed()
    }

    /// Fetch the dependency declarations of one version.
    pub async fn get_metadata(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> LodeResult<PackageCandidate> {
        let url = format!("{}/{name}/{version}/metadata.json", self.url);
        let version_text = version.to_string();
        let subject = Subject {
            package: name.as_str(),
            version: Some(&version_text),
        };
        let doc: MetadataDocument = self
            .downloader
            .get_json(&url, subject)
            .await?
            .ok_or_else(|| LodeError::NotFound {
                package: name.to_string(),
                version: Some(version_text.clone()),
            })?;

        let invalid = |message: String| LodeError::SourceFetch {
            package: name.to_string(),
            version: Some(version_text.clone()),
            message: format!("invalid metadata: {message}"),
            retryable: false,
        };

        let dependencies = doc
            .dependencies
            .iter()
            .map(DependencyDocument::to_dependency)
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;
        let mut extras = BTreeMap::new();
        for (extra, deps) in &doc.extras {
            let deps = deps
                .iter()
                .map(DependencyDocument::to_dependency)
                .collect::<Result<Vec<_>, _>>()
                .map_err(invalid)?;
            extras.insert(extra.clone(), deps);
        }

        Ok(PackageCandidate {
            name: name.clone(),
            version: version.clone(),
            dependencies,
            extras,
            source: self.locator(),
            hash: checksum::parse_served(name.as_str(), &version_text, &doc.hash)?,
            prebuilt: doc.prebuilt,
        })
    }

    /// Download the artifact of one version.
    pub async fn get_artifact(&self, name: &PackageName, version: &Version) -> LodeResult<Vec<u8>> {
        let url = format!("{}/{name}/{version}/{name}-{version}.zip", self.url);
        let version_text = version.to_string();
        let subject = Subject {
            package: name.as_str(),
            version: Some(&version_text),
        };
        self.downloader
            .get_bytes(&url, subject)
            .await?
            .ok_or_else(|| LodeError::NotFound {
                package: name.to_string(),
                version: Some(version_text.clone()),
            })
    }
}
