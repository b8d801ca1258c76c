//! Packages checked out from a git repository.
//!
//! A checkout is a directory holding a `Lode.toml`, read the same way as a
//! path source, but reported with a `git+<url>#<commit>` locator so the
//! lock file pins the exact commit.

use std::path::{Path, PathBuf};

use tokio::sync::OnceCell;

use lode_core::dependency::GitReference;
use lode_core::package::{PackageCandidate, PackageName, SourceLocator, VersionEntry};
use lode_core::version::Version;
use lode_util::errors::{LodeError, LodeResult};
use lode_util::process::CommandBuilder;

use crate::path::PathSource;

/// A working tree at a resolved commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCheckout {
    pub dir: PathBuf,
    pub commit: String,
}

/// Clone (or update) `url` under `cache_root` and check out `reference`.
pub async fn checkout(
    url: &str,
    reference: &GitReference,
    cache_root: &Path,
    package: &PackageName,
) -> LodeResult<GitCheckout> {
    let target = match reference {
        GitReference::DefaultBranch => "origin/HEAD".to_string(),
        GitReference::Branch(branch) => format!("origin/{branch}"),
        GitReference::Tag(tag) => format!("tags/{tag}"),
        GitReference::Rev(rev) => rev.clone(),
    };
    let key = lode_util::hash::sha256_bytes(format!("{url}#{target}").as_bytes());
    let dir = cache_root.join("git").join(&key[..16]);
    let url = url.to_string();
    let package = package.clone();

    tokio::task::spawn_blocking(move || checkout_blocking(&url, &target, &dir, &package))
        .await
        .map_err(|e| LodeError::Generic {
            message: format!("git task failed: {e}"),
        })?
}

fn checkout_blocking(
    url: &str,
    target: &str,
    dir: &Path,
    package: &PackageName,
) -> LodeResult<GitCheckout> {
    let fetch_err = |e: LodeError| LodeError::SourceFetch {
        package: package.to_string(),
        version: None,
        message: e.to_string(),
        retryable: false,
    };

    if dir.join(".git").is_dir() {
        tracing::debug!("updating git checkout {}", dir.display());
        git()
            .args(["fetch", "--quiet", "--tags", "origin"])
            .cwd(dir)
            .exec_stdout()
            .map_err(fetch_err)?;
    } else {
        if let Some(parent) = dir.parent() {
            lode_util::fs::ensure_dir(parent)?;
        }
        tracing::info!("cloning {url}");
        git()
            .args(["clone", "--quiet", url])
            .arg(dir.to_string_lossy())
            .exec_stdout()
            .map_err(fetch_err)?;
    }

    git()
        .args(["checkout", "--quiet", "--detach", target])
        .cwd(dir)
        .exec_stdout()
        .map_err(fetch_err)?;
    let commit = git()
        .args(["rev-parse", "HEAD"])
        .cwd(dir)
        .exec_stdout()
        .map_err(fetch_err)?;

    Ok(GitCheckout {
        dir: dir.to_path_buf(),
        commit,
    })
}

/// `git` that fails instead of prompting for credentials.
fn git() -> CommandBuilder {
    CommandBuilder::new("git").env("GIT_TERMINAL_PROMPT", "0")
}

/// A git dependency: one repository at one reference.
#[derive(Debug)]
pub struct GitSource {
    url: String,
    reference: GitReference,
    cache_root: PathBuf,
    checkout: OnceCell<GitCheckout>,
}

impl GitSource {
    pub fn new(url: impl Into<String>, reference: GitReference, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            reference,
            cache_root: cache_root.into(),
            checkout: OnceCell::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn tree(&self, name: &PackageName) -> LodeResult<(PathSource, SourceLocator)> {
        let co = self
            .checkout
            .get_or_try_init(|| checkout(&self.url, &self.reference, &self.cache_root, name))
            .await?;
        let locator = SourceLocator::Git {
            url: self.url.clone(),
            commit: co.commit.clone(),
        };
        Ok((PathSource::new(&co.dir), locator))
    }

    pub async fn list_versions(&self, name: &PackageName) -> LodeResult<Vec<VersionEntry>> {
        let (tree, _) = self.tree(name).await?;
        tree.list_versions(name)
    }

    pub async fn get_metadata(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> LodeResult<PackageCandidate> {
        let (tree, locator) = self.tree(name).await?;
        tree.get_metadata(name, version, locator)
    }

    pub async fn get_artifact(&self, name: &PackageName) -> LodeResult<Vec<u8>> {
        let (tree, _) = self.tree(name).await?;
        tree.pack()
    }
}
