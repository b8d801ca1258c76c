//! Operation: remove a dependency from Lode.toml, then relock.

use std::path::Path;

use lode_core::config::GlobalConfig;
use lode_core::package::PackageName;
use lode_util::errors::{LodeError, LodeResult};

use crate::ops_add::{dependencies_table, find_key, read_document, write_document};
use crate::ops_lock::{relock, Refresh};
use crate::project::{Project, MANIFEST_FILE};

/// Remove `name` from the manifest and relock. The manifest is restored
/// if resolution fails.
pub async fn remove(project_root: &Path, config: &GlobalConfig, name: &str) -> miette::Result<()> {
    let manifest_path = project_root.join(MANIFEST_FILE);
    let original = std::fs::read(&manifest_path).map_err(LodeError::Io)?;

    let removed = remove_dependency(&manifest_path, name)?;
    let relocked = async {
        let project = Project::load(project_root, config)?;
        let sources = project.sources()?;
        relock(&project, &sources, &Refresh::Keep).await
    }
    .await;

    if let Err(e) = relocked {
        lode_util::fs::atomic_write(&manifest_path, &original).map_err(LodeError::Io)?;
        return Err(e.into());
    }
    lode_util::progress::status("Removed", removed.as_str());
    Ok(())
}

/// Remove the entry for `name` from `[dependencies]`, keeping the rest of
/// the file as it is.
pub fn remove_dependency(manifest_path: &Path, name: &str) -> LodeResult<PackageName> {
    let name = PackageName::new(name).map_err(|e| LodeError::Manifest {
        message: e.to_string(),
    })?;
    let not_found = || LodeError::Manifest {
        message: format!("dependency `{name}` not found in {MANIFEST_FILE}"),
    };

    let mut doc = read_document(manifest_path)?;
    let deps = dependencies_table(&mut doc).map_err(|_| not_found())?;
    let key = find_key(deps, &name).ok_or_else(not_found)?;
    deps.remove(&key);
    write_document(manifest_path, &doc)?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"[package]
name = "app"
version = "0.1.0"

# Main dependencies
[dependencies]
requests = "^2.31"
Local_Lib = { path = "../local-lib" }
"#;

    fn manifest() -> (tempfile::TempDir, std::path::PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(MANIFEST_FILE);
        std::fs::write(&path, MANIFEST).unwrap();
        (tmp, path)
    }

    #[test]
    fn removes_by_normalized_name() {
        let (_tmp, path) = manifest();
        remove_dependency(&path, "local-lib").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("Local_Lib"));
        assert!(content.contains("requests"));
        assert!(content.contains("# Main dependencies"));
    }

    #[test]
    fn missing_dependency_is_an_error() {
        let (_tmp, path) = manifest();
        let err = remove_dependency(&path, "numpy").unwrap_err();
        assert!(err.to_string().contains("numpy"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), MANIFEST);
    }
}
