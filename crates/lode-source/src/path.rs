//! Packages living in a local directory with their own `Lode.toml`.

use std::io::Write;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use lode_core::manifest::Manifest;
use lode_core::package::{ContentHash, PackageCandidate, PackageName, SourceLocator, VersionEntry};
use lode_core::version::Version;
use lode_core::MANIFEST_FILE;
use lode_util::errors::{LodeError, LodeResult};

/// Directory names never packed into a path artifact.
const SKIPPED: &[&str] = &[".git", ".lode", "target"];

/// A package read straight from a directory.
#[derive(Debug, Clone)]
pub struct PathSource {
    root: PathBuf,
}

impl PathSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn locator(&self) -> SourceLocator {
        SourceLocator::Path {
            path: self.root.clone(),
        }
    }

    fn manifest(&self, name: &PackageName) -> LodeResult<Manifest> {
        let path = self.root.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(LodeError::NotFound {
                package: name.to_string(),
                version: None,
            });
        }
        let manifest = Manifest::load(&path)?;
        let declared = PackageName::new(&manifest.package.name).map_err(|e| LodeError::Manifest {
            message: e.to_string(),
        })?;
        if &declared != name {
            tracing::warn!(
                "{} declares package `{declared}`, expected `{name}`",
                path.display()
            );
            return Err(LodeError::NotFound {
                package: name.to_string(),
                version: None,
            });
        }
        Ok(manifest)
    }

    /// A directory holds exactly one version: the one its manifest declares.
    pub fn list_versions(&self, name: &PackageName) -> LodeResult<Vec<VersionEntry>> {
        let manifest = self.manifest(name)?;
        let version = Version::parse(&manifest.package.version).map_err(|e| LodeError::Manifest {
            message: e.to_string(),
        })?;
        Ok(vec![VersionEntry {
            version,
            prebuilt: false,
        }])
    }

    /// Read dependency declarations from the directory's manifest. The
    /// reported locator is `locator`, so git checkouts can report their
    /// commit instead of the checkout path.
    pub fn get_metadata(
        &self,
        name: &PackageName,
        version: &Version,
        locator: SourceLocator,
    ) -> LodeResult<PackageCandidate> {
        let manifest = self.manifest(name)?;
        if Version::parse(&manifest.package.version).ok().as_ref() != Some(version) {
            return Err(LodeError::NotFound {
                package: name.to_string(),
                version: Some(version.to_string()),
            });
        }
        let dependencies = manifest.direct_dependencies(&self.root)?;
        let hash = ContentHash::sha256(&self.pack()?);
        Ok(PackageCandidate {
            name: name.clone(),
            version: version.clone(),
            dependencies,
            extras: Default::default(),
            source: locator,
            hash,
            prebuilt: false,
        })
    }

    /// Zip the directory. The archive depends only on file names and
    /// contents: entries are sorted and carry a fixed timestamp, so the
    /// same tree always hashes the same.
    pub fn pack(&self) -> LodeResult<Vec<u8>> {
        let zip_err = |e: zip::result::ZipError| LodeError::Generic {
            message: format!("Failed to pack {}: {e}", self.root.display()),
        };
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);

        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                !(e.file_type().is_dir()
                    && SKIPPED.iter().any(|s| e.file_name() == *s))
            });
        for entry in walker {
            let entry = entry.map_err(|e| LodeError::Generic {
                message: format!("Failed to walk {}: {e}", self.root.display()),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path());
            let name: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            zip.start_file(name.join("/"), options).map_err(zip_err)?;
            zip.write_all(&std::fs::read(entry.path())?)?;
        }
        let cursor = zip.finish().map_err(zip_err)?;
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_package(dir: &Path, name: &str, version: &str) {
        std::fs::write(
            dir.join(MANIFEST_FILE),
            format!("[package]\nname = \"{name}\"\nversion = \"{version}\"\n\n[dependencies]\nleft-pad = \"^1.0\"\n"),
        )
        .unwrap();
        std::fs::create_dir_all(dir.join("src")).unwrap();
        std::fs::write(dir.join("src/lib.txt"), "contents").unwrap();
    }

    #[test]
    fn single_version_from_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        write_package(tmp.path(), "local-lib", "0.4.0");
        let source = PathSource::new(tmp.path());
        let name = PackageName::new("local-lib").unwrap();

        let versions = source.list_versions(&name).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version.to_string(), "0.4.0");

        let candidate = source
            .get_metadata(&name, &versions[0].version, source.locator())
            .unwrap();
        assert_eq!(candidate.dependencies.len(), 1);
        assert_eq!(candidate.dependencies[0].name.as_str(), "left-pad");
        assert!(!candidate.prebuilt);
    }

    #[test]
    fn wrong_name_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        write_package(tmp.path(), "other", "1.0.0");
        let source = PathSource::new(tmp.path());
        let err = source
            .list_versions(&PackageName::new("local-lib").unwrap())
            .unwrap_err();
        assert!(matches!(err, LodeError::NotFound { .. }));
    }

    #[test]
    fn pack_is_deterministic_and_skips_vcs() {
        let tmp = tempfile::tempdir().unwrap();
        write_package(tmp.path(), "local-lib", "0.4.0");
        let source = PathSource::new(tmp.path());
        let first = source.pack().unwrap();

        std::fs::create_dir_all(tmp.path().join(".git")).unwrap();
        std::fs::write(tmp.path().join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        let second = source.pack().unwrap();
        assert_eq!(first, second);

        std::fs::write(tmp.path().join("src/lib.txt"), "changed").unwrap();
        assert_ne!(first, source.pack().unwrap());
    }
}
