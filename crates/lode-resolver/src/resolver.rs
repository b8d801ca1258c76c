//! Resolution entry point: solve, then build the dependency graph.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use lode_core::package::PackageName;
use lode_util::errors::LodeResult;

use crate::graph::{DepEdge, DependencyGraph, ResolvedNode};
use crate::package::Package;
use crate::provider::DependencyProvider;
use crate::solver::{RootPackage, SolverOptions, VersionSolver};

/// The output of dependency resolution.
#[derive(Debug)]
pub struct Resolution {
    pub graph: DependencyGraph,
    pub attempted_solutions: usize,
    pub elapsed: Duration,
}

/// Resolve `root`'s dependencies against `provider`.
pub async fn resolve<P>(
    root: &RootPackage,
    provider: &P,
    options: &SolverOptions,
) -> LodeResult<Resolution>
where
    P: DependencyProvider + ?Sized,
{
    let started = Instant::now();
    let solution = VersionSolver::new(root, provider, options).solve().await?;

    let mut chosen = BTreeMap::new();
    let mut extras: BTreeMap<PackageName, BTreeSet<String>> = BTreeMap::new();
    for (package, version) in &solution.decisions {
        match package {
            Package::Real(name) => {
                chosen.insert(name.clone(), version.clone());
            }
            Package::Extra(name, extra) => {
                extras.entry(name.clone()).or_default().insert(extra.clone());
            }
            Package::Root(_) => {}
        }
    }

    let mut graph = DependencyGraph::new(root.name.clone(), root.version.clone());
    let mut candidates = Vec::with_capacity(chosen.len());
    for (name, version) in &chosen {
        let candidate = provider.candidate(name, version).await?;
        let idx = graph.add_package(ResolvedNode {
            name: candidate.name.clone(),
            version: candidate.version.clone(),
            source: candidate.source.clone(),
            hash: candidate.hash.clone(),
            prebuilt: candidate.prebuilt,
            markers: Default::default(),
        });
        candidates.push((idx, candidate));
    }

    let env = &options.environment;
    let root_idx = graph.root();
    for dep in root.dependencies.iter().filter(|d| d.marker.is_active(env)) {
        if let Some(to) = graph.find(&dep.name) {
            graph.add_edge(
                root_idx,
                to,
                DepEdge {
                    constraint: dep.constraint.clone(),
                    marker: dep.marker.clone(),
                },
            );
        }
    }

    let none = BTreeSet::new();
    for (from, candidate) in &candidates {
        let requested = extras.get(&candidate.name).unwrap_or(&none);
        let deps = candidate
            .active_dependencies(env)
            .chain(candidate.extra_dependencies(requested, env));
        for dep in deps {
            if dep.name == candidate.name {
                continue;
            }
            match graph.find(&dep.name) {
                Some(to) => graph.add_edge(
                    *from,
                    to,
                    DepEdge {
                        constraint: dep.constraint.clone(),
                        marker: dep.marker.clone(),
                    },
                ),
                None => tracing::debug!("{} has no resolved target {}", candidate, dep.name),
            }
        }
    }
    graph.propagate_markers();

    let elapsed = started.elapsed();
    tracing::info!(
        "resolved {} packages in {:.2}s ({} attempted solutions)",
        graph.len(),
        elapsed.as_secs_f64(),
        solution.attempted_solutions
    );
    Ok(Resolution {
        graph,
        attempted_solutions: solution.attempted_solutions,
        elapsed,
    })
}
