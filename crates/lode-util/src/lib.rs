//! Shared utilities for the lode package manager.
//!
//! This crate provides cross-cutting concerns used by all other lode crates:
//! the unified error type and its exit-code mapping, filesystem helpers,
//! content hashing, process spawning, and terminal progress indicators.

pub mod errors;
pub mod fs;
pub mod hash;
pub mod process;
pub mod progress;
