//! On-disk artifact cache keyed by content hash.

use std::fs;
use std::path::{Path, PathBuf};

use lode_core::package::ContentHash;
use lode_util::errors::LodeResult;

/// Verified artifacts stored under `<dir>/<algo>/<xx>/<hex>.zip`.
///
/// Entries are addressed by their content hash, so an entry is either
/// exactly the bytes that hash names or it is discarded on read.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory of this cache.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, hash: &ContentHash) -> PathBuf {
        let hex = hash.hex();
        self.root
            .join(hash.algorithm().as_str())
            .join(&hex[..2])
            .join(format!("{hex}.zip"))
    }

    /// The cached bytes for `hash`, if present and intact.
    pub fn get(&self, hash: &ContentHash) -> Option<Vec<u8>> {
        let path = self.path_for(hash);
        let data = fs::read(&path).ok()?;
        if hash.verify(&data).is_ok() {
            tracing::debug!("artifact cache hit for {hash}");
            Some(data)
        } else {
            tracing::warn!("discarding corrupt cache entry {}", path.display());
            let _ = fs::remove_file(&path);
            None
        }
    }

    /// Store bytes that are already known to match `hash`.
    pub fn put(&self, hash: &ContentHash, data: &[u8]) -> LodeResult<PathBuf> {
        let path = self.path_for(hash);
        lode_util::fs::atomic_write(&path, data)?;
        Ok(path)
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.path_for(hash).is_file()
    }
}
