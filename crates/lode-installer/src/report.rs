//! The outcome of an install run.

use std::fmt;

use lode_core::package::PackageName;
use lode_core::version::Version;
use lode_util::errors::{LodeError, LodeResult};

/// A package that was promoted into the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: PackageName,
    pub version: Version,
    pub replaced: Option<Version>,
}

/// A package whose install or removal failed.
#[derive(Debug)]
pub struct FailedPackage {
    pub name: PackageName,
    pub error: LodeError,
}

/// Per-package results of one run. Every list is sorted by name.
#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: Vec<InstalledPackage>,
    pub removed: Vec<PackageName>,
    pub unchanged: Vec<PackageName>,
    pub failed: Vec<FailedPackage>,
    /// Installs never started because the run was cancelled.
    pub skipped: Vec<PackageName>,
    /// Removals not attempted because an install failed or the run was
    /// cancelled.
    pub removals_deferred: Vec<PackageName>,
    pub cancelled: bool,
}

impl InstallReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    pub fn failed_names(&self) -> Vec<String> {
        self.failed.iter().map(|f| f.name.to_string()).collect()
    }

    pub(crate) fn sort(&mut self) {
        self.installed.sort_by(|a, b| a.name.cmp(&b.name));
        self.unchanged.sort();
        self.failed.sort_by(|a, b| a.name.cmp(&b.name));
        self.skipped.sort();
    }

    /// The run as a single result.
    ///
    /// A lone failure keeps its own error, so a single hash mismatch still
    /// reports as a verification failure; several failures are summarized
    /// as [`LodeError::InstallFailed`].
    pub fn outcome(self) -> LodeResult<()> {
        if self.cancelled {
            return Err(LodeError::Cancelled);
        }
        let names = self.failed_names();
        let mut failed = self.failed;
        match failed.len() {
            0 => Ok(()),
            1 => Err(failed.remove(0).error),
            _ => Err(LodeError::InstallFailed { failed: names }),
        }
    }
}

impl fmt::Display for InstallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = vec![
            format!("{} installed", self.installed.len()),
            format!("{} removed", self.removed.len()),
            format!("{} unchanged", self.unchanged.len()),
        ];
        if !self.failed.is_empty() {
            parts.push(format!("{} failed", self.failed.len()));
        }
        if !self.skipped.is_empty() {
            parts.push(format!("{} skipped", self.skipped.len()));
        }
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(name: &str, error: LodeError) -> FailedPackage {
        FailedPackage {
            name: PackageName::new(name).unwrap(),
            error,
        }
    }

    #[test]
    fn single_failure_keeps_its_class() {
        let report = InstallReport {
            failed: vec![failed(
                "demo",
                LodeError::Verification {
                    package: "demo".into(),
                    expected: "sha256:aa".into(),
                    actual: "sha256:bb".into(),
                },
            )],
            ..Default::default()
        };
        assert_eq!(report.outcome().unwrap_err().exit_code(), 4);
    }

    #[test]
    fn several_failures_are_partial() {
        let cancelled = || LodeError::Cancelled;
        let report = InstallReport {
            failed: vec![failed("a", cancelled()), failed("b", cancelled())],
            ..Default::default()
        };
        match report.outcome() {
            Err(LodeError::InstallFailed { failed }) => assert_eq!(failed, vec!["a", "b"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn summary_line() {
        let report = InstallReport {
            unchanged: vec![PackageName::new("a").unwrap()],
            ..Default::default()
        };
        assert_eq!(report.to_string(), "0 installed, 0 removed, 1 unchanged");
        assert!(report.outcome().is_ok());
    }
}
