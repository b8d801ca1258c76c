//! Installing a lock file into a target environment.
//!
//! [`plan::InstallPlan`] diffs the lock against what the environment
//! already holds, [`executor::Installer`] fetches, verifies and promotes
//! packages with bounded parallelism, and [`report::InstallReport`]
//! records what happened to each package.

pub mod environment;
pub mod executor;
pub mod extract;
pub mod plan;
pub mod report;
