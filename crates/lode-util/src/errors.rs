use miette::Diagnostic;
use thiserror::Error;

/// Process exit code for a successful run.
pub const EXIT_OK: i32 = 0;
/// Generic failure (manifest, I/O, anything unclassified).
pub const EXIT_GENERIC: i32 = 1;
/// Version solving found no solution.
pub const EXIT_RESOLUTION: i32 = 2;
/// A source could not be reached or did not have the package.
pub const EXIT_NETWORK: i32 = 3;
/// An artifact did not match its locked content hash.
pub const EXIT_VERIFICATION: i32 = 4;
/// The lock file is corrupt or written by an incompatible version.
pub const EXIT_FORMAT: i32 = 5;
/// Filesystem failure while mutating the target environment.
pub const EXIT_ENVIRONMENT: i32 = 6;
/// Some packages installed, others failed.
pub const EXIT_PARTIAL: i32 = 7;
/// Interrupted by the user.
pub const EXIT_CANCELLED: i32 = 130;

/// Unified error type for all lode operations.
#[derive(Debug, Error, Diagnostic)]
pub enum LodeError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or malformed manifest (e.g. Lode.toml).
    #[error("Manifest error: {message}")]
    #[diagnostic(help("Check your Lode.toml for syntax errors"))]
    Manifest { message: String },

    /// Version solving failed; `report` explains every contributing constraint.
    #[error("Version solving failed:\n{report}")]
    #[diagnostic(help("Relax one of the constraints named above, or run `lode update`"))]
    Unsatisfiable { report: String },

    /// A package source could not answer (network, timeout, bad response).
    #[error("Failed to fetch {package}{}: {message}", version_suffix(.version))]
    SourceFetch {
        package: String,
        version: Option<String>,
        message: String,
        retryable: bool,
    },

    /// The package (or the requested version of it) does not exist in its source.
    #[error("Package {package}{} not found", version_suffix(.version))]
    NotFound {
        package: String,
        version: Option<String>,
    },

    /// Artifact bytes did not hash to the value recorded in the lock file.
    #[error("Hash mismatch for {package}: expected {expected}, got {actual}")]
    #[diagnostic(help("The artifact changed upstream or was corrupted in transit"))]
    Verification {
        package: String,
        expected: String,
        actual: String,
    },

    /// Lock file is corrupt or uses an unsupported format version.
    #[error("Lock file error: {message}")]
    #[diagnostic(help("Regenerate the lock file with `lode lock`"))]
    Format { message: String },

    /// Filesystem failure while mutating the environment for one package.
    #[error("Environment error for {package}: {message}")]
    Environment { package: String, message: String },

    /// An install run finished with some packages failed.
    #[error("{} package(s) failed to install: {}", .failed.len(), .failed.join(", "))]
    InstallFailed { failed: Vec<String> },

    /// The user interrupted the run.
    #[error("Interrupted")]
    Cancelled,

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

fn version_suffix(version: &Option<String>) -> String {
    match version {
        Some(v) => format!(" ({v})"),
        None => String::new(),
    }
}

impl LodeError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LodeError::SourceFetch {
                retryable: true,
                ..
            }
        )
    }

    /// The process exit code for this class of failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            LodeError::Unsatisfiable { .. } => EXIT_RESOLUTION,
            LodeError::SourceFetch { .. } | LodeError::NotFound { .. } => EXIT_NETWORK,
            LodeError::Verification { .. } => EXIT_VERIFICATION,
            LodeError::Format { .. } => EXIT_FORMAT,
            LodeError::Environment { .. } => EXIT_ENVIRONMENT,
            LodeError::InstallFailed { .. } => EXIT_PARTIAL,
            LodeError::Cancelled => EXIT_CANCELLED,
            LodeError::Io(_) | LodeError::Manifest { .. } | LodeError::Generic { .. } => {
                EXIT_GENERIC
            }
        }
    }
}

/// Convenience alias for `miette::Result<T>`.
pub type MietteResult<T> = miette::Result<T>;

/// Result type used by the library layers that need to classify failures.
pub type LodeResult<T> = Result<T, LodeError>;

/// Exit code for a report returned from an operation.
///
/// Reports that do not wrap a [`LodeError`] map to [`EXIT_GENERIC`].
pub fn exit_code_for(report: &miette::Report) -> i32 {
    report
        .downcast_ref::<LodeError>()
        .map(LodeError::exit_code)
        .unwrap_or(EXIT_GENERIC)
}
