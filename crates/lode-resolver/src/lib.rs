//! Dependency resolution engine: PubGrub conflict-driven version solving,
//! human-readable failure explanations, and the resolved dependency graph
//! with its lock file projection.

pub mod graph;
pub mod incompatibility;
pub mod package;
pub mod partial_solution;
pub mod provider;
pub mod report;
pub mod resolver;
pub mod solver;
pub mod term;
