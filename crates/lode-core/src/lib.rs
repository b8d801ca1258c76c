//! Core data types for the lode package manager.
//!
//! This crate defines the values every other lode crate exchanges: package
//! names and versions, the version-constraint interval algebra, environment
//! markers, dependencies and candidates, the `Lode.toml` manifest, the
//! `Lode.lock` lock file, and global configuration.
//!
//! This crate is intentionally free of async code and network I/O.

/// File name of the project manifest.
pub const MANIFEST_FILE: &str = "Lode.toml";

/// File name of the lock file written next to the manifest.
pub const LOCK_FILE: &str = "Lode.lock";

pub mod config;
pub mod constraint;
pub mod dependency;
pub mod lockfile;
pub mod manifest;
pub mod marker;
pub mod package;
pub mod version;
