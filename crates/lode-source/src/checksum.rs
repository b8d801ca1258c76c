//! Artifact content-hash verification (SHA-256, SHA-1, MD5).

use lode_core::package::{ContentHash, PackageName};
use lode_util::errors::{LodeError, LodeResult};

/// Check downloaded bytes against the hash recorded for `package`.
///
/// The comparison uses the recorded hash's own algorithm, so a lock file
/// written with `md5:` entries verifies with MD5.
pub fn verify(package: &PackageName, expected: &ContentHash, data: &[u8]) -> LodeResult<()> {
    match expected.verify(data) {
        Ok(()) => {
            tracing::debug!("{} ok for {package}", expected.algorithm().as_str());
            Ok(())
        }
        Err(actual) => Err(LodeError::Verification {
            package: package.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }),
    }
}

/// Parse a hash as served by a source, mapping failures to a fetch error
/// for `package`.
pub fn parse_served(package: &str, version: &str, text: &str) -> LodeResult<ContentHash> {
    ContentHash::parse(text.trim()).map_err(|e| LodeError::SourceFetch {
        package: package.to_string(),
        version: Some(version.to_string()),
        message: e.to_string(),
        retryable: false,
    })
}
