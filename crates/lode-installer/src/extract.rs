//! Unpacking package archives.

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use lode_core::package::PackageName;
use lode_util::errors::{LodeError, LodeResult};

/// Extract a zip archive held in memory into `dest`.
///
/// Entries whose paths would land outside `dest` are rejected.
pub fn extract_zip(package: &PackageName, bytes: &[u8], dest: &Path) -> LodeResult<()> {
    let env_err = |message: String| LodeError::Environment {
        package: package.to_string(),
        message,
    };
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| env_err(format!("failed to open archive: {e}")))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| env_err(format!("archive entry error: {e}")))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(env_err(format!("unsafe path in archive: {}", entry.name())));
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut buf)
            .map_err(|e| env_err(format!("failed to read {}: {e}", entry.name())))?;
        fs::write(&out_path, &buf)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))?;
            }
        }
    }
    Ok(())
}

/// If `dir` holds nothing but a `wrapper/` directory, move that
/// directory's contents up into `dir`.
pub fn flatten_wrapper(dir: &Path, wrapper: &str) -> LodeResult<()> {
    let entries: Vec<_> = fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
    if entries.len() != 1 || entries[0].file_name() != wrapper || !entries[0].path().is_dir() {
        return Ok(());
    }
    let child = entries[0].path();
    for entry in fs::read_dir(&child)? {
        let entry = entry?;
        fs::rename(entry.path(), dir.join(entry.file_name()))?;
    }
    fs::remove_dir(&child)?;
    Ok(())
}
