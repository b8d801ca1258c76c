//! Package sources: where candidate versions, dependency metadata and
//! artifact bytes come from.
//!
//! [`source::PackageSource`] is the closed set of source kinds (registry,
//! local path, git). [`set::SourceSet`] routes each package name to its
//! source and memoizes every answer for the duration of one run.

pub mod cache;
pub mod checksum;
pub mod download;
pub mod git;
pub mod memo;
pub mod path;
pub mod registry;
pub mod set;
pub mod source;
