//! Conflict-driven version solving (PubGrub).
//!
//! The solver alternates unit propagation over the known incompatibilities
//! with decisions on undecided packages. When propagation finds an
//! incompatibility that the partial solution fully satisfies, conflict
//! resolution derives its root cause and backjumps. All state lives in the
//! solver value itself; nothing is shared between runs.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Instant;

use futures_util::future::join_all;

use lode_core::constraint::VersionConstraint;
use lode_core::dependency::Dependency;
use lode_core::marker::TargetEnvironment;
use lode_core::package::{PackageName, VersionEntry};
use lode_core::version::Version;
use lode_util::errors::{LodeError, LodeResult};

use crate::incompatibility::{describe, Cause, IncompId, Incompatibility};
use crate::package::Package;
use crate::partial_solution::{Assignment, PartialSolution};
use crate::provider::DependencyProvider;
use crate::report;
use crate::term::{Relation, Term};

/// The project being resolved.
#[derive(Debug, Clone)]
pub struct RootPackage {
    pub name: PackageName,
    pub version: Version,
    pub dependencies: Vec<Dependency>,
}

/// Knobs that change which solution is preferred.
#[derive(Debug, Clone, Default)]
pub struct SolverOptions {
    /// Consider pre-releases even when a final release would do.
    pub allow_prereleases: bool,
    /// Order prebuilt candidates ahead of source-only ones.
    pub prefer_prebuilt: bool,
    /// Attributes markers are evaluated against.
    pub environment: TargetEnvironment,
    /// Versions from a previous lock, tried first when still allowed.
    pub locked: BTreeMap<PackageName, Version>,
    /// Packages whose locked version is ignored.
    pub use_latest: BTreeSet<PackageName>,
}

/// Decisions of a successful run.
#[derive(Debug, Clone)]
pub struct Solution {
    pub decisions: BTreeMap<Package, Version>,
    pub attempted_solutions: usize,
}

enum Propagation {
    Conflict,
    Derived(Package),
    Nothing,
}

pub struct VersionSolver<'a, P: DependencyProvider + ?Sized> {
    root: &'a RootPackage,
    provider: &'a P,
    options: &'a SolverOptions,
    incompatibilities: Vec<Incompatibility>,
    by_package: BTreeMap<Package, Vec<IncompId>>,
    contradicted: HashSet<IncompId>,
    solution: PartialSolution,
}

impl<'a, P: DependencyProvider + ?Sized> VersionSolver<'a, P> {
    pub fn new(root: &'a RootPackage, provider: &'a P, options: &'a SolverOptions) -> Self {
        Self {
            root,
            provider,
            options,
            incompatibilities: Vec::new(),
            by_package: BTreeMap::new(),
            contradicted: HashSet::new(),
            solution: PartialSolution::new(),
        }
    }

    /// Find versions for every package reachable from the root, or explain
    /// why none exist.
    pub async fn solve(mut self) -> LodeResult<Solution> {
        let started = Instant::now();
        let root = Package::Root(self.root.name.clone());
        self.add_incompatibility(Incompatibility::root(
            root.clone(),
            self.root.version.clone(),
        ));

        let outcome = self.run(root).await;
        tracing::debug!(
            "version solving took {:.3} seconds, tried {} solutions",
            started.elapsed().as_secs_f64(),
            self.solution.attempted_solutions()
        );

        outcome.map(|()| Solution {
            decisions: self
                .solution
                .decisions()
                .iter()
                .filter(|(package, _)| !package.is_root())
                .map(|(package, version)| (package.clone(), version.clone()))
                .collect(),
            attempted_solutions: self.solution.attempted_solutions(),
        })
    }

    async fn run(&mut self, root: Package) -> LodeResult<()> {
        let mut next = Some(root);
        while let Some(package) = next {
            self.propagate(package)?;
            next = self.choose_package_version().await?;
        }
        Ok(())
    }

    fn propagate(&mut self, package: Package) -> LodeResult<()> {
        let mut changed = BTreeSet::from([package]);
        while let Some(package) = changed.pop_first() {
            let ids = self.by_package.get(&package).cloned().unwrap_or_default();
            // Newer incompatibilities are more general; try them first.
            for id in ids.into_iter().rev() {
                if self.contradicted.contains(&id) {
                    continue;
                }
                match self.propagate_incompatibility(id) {
                    Propagation::Conflict => {
                        let root_cause = self.resolve_conflict(id)?;
                        changed.clear();
                        if let Propagation::Derived(next) = self.propagate_incompatibility(root_cause)
                        {
                            changed.insert(next);
                        }
                        break;
                    }
                    Propagation::Derived(next) => {
                        changed.insert(next);
                    }
                    Propagation::Nothing => {}
                }
            }
        }
        Ok(())
    }

    /// If all but one term of the incompatibility is satisfied, derive the
    /// negation of the remaining one.
    fn propagate_incompatibility(&mut self, id: IncompId) -> Propagation {
        let mut unsatisfied: Option<(&Package, &Term)> = None;
        for (package, term) in self.incompatibilities[id].terms() {
            match self.solution.relation(package, term) {
                Relation::Contradicted => {
                    self.contradicted.insert(id);
                    return Propagation::Nothing;
                }
                Relation::Inconclusive if unsatisfied.is_some() => return Propagation::Nothing,
                Relation::Inconclusive => unsatisfied = Some((package, term)),
                Relation::Satisfied => {}
            }
        }

        let Some((package, term)) = unsatisfied else {
            return Propagation::Conflict;
        };
        let (package, term) = (package.clone(), term.clone());
        self.contradicted.insert(id);
        tracing::debug!(
            "derived: {}{}",
            if term.is_positive() { "not " } else { "" },
            describe(&package, term.constraint())
        );
        self.solution.derive(package.clone(), term.negate(), id);
        Propagation::Derived(package)
    }

    /// Derive the root cause of a satisfied incompatibility and backjump to
    /// where it allows new derivations. Returns the root cause.
    fn resolve_conflict(&mut self, conflict: IncompId) -> LodeResult<IncompId> {
        tracing::debug!("conflict: {}", self.incompatibilities[conflict]);

        let mut current = conflict;
        let mut derived_new = false;
        while !self.incompatibilities[current].is_failure() {
            let incompatibility = self.incompatibilities[current].clone();

            // The term most recently satisfied, its satisfier, and the part of
            // the satisfier that does not satisfy it on its own.
            let mut most_recent: Option<(Package, Assignment)> = None;
            let mut difference: Option<Term> = None;
            // Level 1 is where the root was decided. Backjumping no further
            // keeps the root's dependencies near the final explanation.
            let mut previous_level = 1;

            for (package, term) in incompatibility.terms() {
                let satisfier = self.satisfier(package, term)?;
                let is_most_recent = match &most_recent {
                    Some((_, recent)) if recent.index >= satisfier.index => {
                        previous_level = previous_level.max(satisfier.decision_level);
                        false
                    }
                    Some((_, recent)) => {
                        previous_level = previous_level.max(recent.decision_level);
                        true
                    }
                    None => true,
                };
                if is_most_recent {
                    difference = satisfier.term.difference(term);
                    if let Some(rest) = &difference {
                        let prior = self.satisfier(package, &rest.negate())?;
                        previous_level = previous_level.max(prior.decision_level);
                    }
                    most_recent = Some((package.clone(), satisfier));
                }
            }

            let Some((recent_package, satisfier)) = most_recent else {
                return Err(internal("conflict without terms"));
            };

            let cause = match satisfier.cause {
                Some(cause) if previous_level >= satisfier.decision_level => cause,
                _ => {
                    self.solution.backtrack(previous_level);
                    self.contradicted.clear();
                    if derived_new {
                        self.index_incompatibility(current);
                    }
                    return Ok(current);
                }
            };

            // Resolve the conflict with the satisfier's cause.
            let mut terms: Vec<(Package, Term)> = incompatibility
                .terms()
                .filter(|(package, _)| **package != recent_package)
                .map(|(package, term)| (package.clone(), term.clone()))
                .collect();
            terms.extend(
                self.incompatibilities[cause]
                    .terms()
                    .filter(|(package, _)| **package != satisfier.package)
                    .map(|(package, term)| (package.clone(), term.clone())),
            );
            if let Some(rest) = &difference {
                terms.push((satisfier.package.clone(), rest.negate()));
            }

            let prior = Incompatibility::new(terms, Cause::Conflict(current, cause));
            tracing::debug!(
                "! {} is{} satisfied by {} (caused by \"{}\")",
                recent_package,
                if difference.is_some() { " partially" } else { "" },
                describe(&satisfier.package, satisfier.term.constraint()),
                self.incompatibilities[cause]
            );
            tracing::debug!("! thus: {prior}");
            self.incompatibilities.push(prior);
            current = self.incompatibilities.len() - 1;
            derived_new = true;
        }

        Err(LodeError::Unsatisfiable {
            report: report::explain(&self.incompatibilities, current),
        })
    }

    fn satisfier(&self, package: &Package, term: &Term) -> LodeResult<Assignment> {
        self.solution
            .satisfier(package, term)
            .cloned()
            .ok_or_else(|| internal(&format!("no satisfier for {package} {term}")))
    }

    /// Pick the undecided package with the fewest candidates and try its
    /// preferred version. Returns the package to propagate next, or `None`
    /// once every required package is decided.
    async fn choose_package_version(&mut self) -> LodeResult<Option<Package>> {
        let undecided: Vec<(Package, VersionConstraint)> = self
            .solution
            .undecided()
            .into_iter()
            .map(|(package, constraint)| (package.clone(), constraint.clone()))
            .collect();

        let (package, constraint) = match undecided.len() {
            0 => return Ok(None),
            1 => undecided.into_iter().next().ok_or_else(|| internal("undecided"))?,
            _ => {
                // Listings are fetched concurrently; the choice only depends
                // on the completed counts.
                let counts = join_all(
                    undecided
                        .iter()
                        .map(|(package, constraint)| self.count_candidates(package, constraint)),
                )
                .await;
                undecided
                    .into_iter()
                    .zip(counts)
                    .min_by(|(a, count_a), (b, count_b)| {
                        count_a.cmp(count_b).then_with(|| a.0.cmp(&b.0))
                    })
                    .map(|(choice, _)| choice)
                    .ok_or_else(|| internal("undecided"))?
            }
        };

        let version = if package.is_root() {
            self.root.version.clone()
        } else if let Some(locked) = self.locked_version(&package, &constraint) {
            locked
        } else {
            match self.candidates(&package, &constraint).await {
                Ok(candidates) => match candidates.into_iter().next() {
                    Some(entry) => entry.version,
                    None => {
                        self.add_incompatibility(Incompatibility::no_versions(
                            package.clone(),
                            constraint,
                        ));
                        return Ok(Some(package));
                    }
                },
                Err(e @ LodeError::NotFound { .. }) => {
                    self.add_incompatibility(Incompatibility::not_found(
                        package.clone(),
                        constraint,
                        e.to_string(),
                    ));
                    return Ok(Some(package));
                }
                Err(e) => return Err(e),
            }
        };

        let incompatibilities = match self.dependency_incompatibilities(&package, &version).await {
            Ok(incompatibilities) => incompatibilities,
            Err(e @ LodeError::NotFound { .. }) => {
                self.add_incompatibility(Incompatibility::not_found(
                    package.clone(),
                    VersionConstraint::exact(version),
                    e.to_string(),
                ));
                return Ok(Some(package));
            }
            Err(e) => return Err(e),
        };

        // An incompatibility already satisfied apart from this package means
        // selecting the version would conflict. Its facts are still recorded
        // so propagation steers towards another version.
        let mut conflict = false;
        for incompatibility in incompatibilities {
            conflict = conflict
                || incompatibility
                    .terms()
                    .all(|(p, term)| *p == package || self.solution.satisfies(p, term));
            self.add_incompatibility(incompatibility);
        }

        if !conflict {
            tracing::debug!("selecting {package} ({version})");
            self.solution.decide(package.clone(), version);
        }
        Ok(Some(package))
    }

    async fn count_candidates(&self, package: &Package, constraint: &VersionConstraint) -> usize {
        if package.is_root() || self.locked_version(package, constraint).is_some() {
            return 1;
        }
        self.candidates(package, constraint)
            .await
            .map(|candidates| candidates.len())
            .unwrap_or(0)
    }

    fn locked_version(&self, package: &Package, constraint: &VersionConstraint) -> Option<Version> {
        let name = package.name();
        if self.options.use_latest.contains(name) {
            return None;
        }
        self.options
            .locked
            .get(name)
            .filter(|version| constraint.allows(version))
            .cloned()
    }

    /// Versions allowed by `constraint`, most preferred first.
    ///
    /// Pre-releases are only offered when allowed by configuration, named by
    /// the constraint, or when nothing else matches.
    async fn candidates(
        &self,
        package: &Package,
        constraint: &VersionConstraint,
    ) -> LodeResult<Vec<VersionEntry>> {
        let listing = self.provider.available_versions(package.name()).await?;
        let allowed: Vec<&VersionEntry> = listing
            .iter()
            .filter(|entry| constraint.allows(&entry.version))
            .collect();
        let with_prereleases = self.options.allow_prereleases
            || constraint.mentions_prerelease()
            || allowed.iter().all(|entry| entry.version.is_prerelease());

        let mut candidates: Vec<VersionEntry> = allowed
            .into_iter()
            .filter(|entry| with_prereleases || !entry.version.is_prerelease())
            .cloned()
            .collect();
        let prefer_prebuilt = self.options.prefer_prebuilt;
        candidates.sort_by(|a, b| {
            let demoted = |entry: &VersionEntry| prefer_prebuilt && !entry.prebuilt;
            demoted(a)
                .cmp(&demoted(b))
                .then_with(|| b.version.cmp(&a.version))
                .then_with(|| b.prebuilt.cmp(&a.prebuilt))
        });
        Ok(candidates)
    }

    /// One incompatibility per (merged) dependency of `package version`.
    async fn dependency_incompatibilities(
        &self,
        package: &Package,
        version: &Version,
    ) -> LodeResult<Vec<Incompatibility>> {
        let env = &self.options.environment;
        let mut targets: BTreeMap<Package, VersionConstraint> = BTreeMap::new();

        match package {
            Package::Root(_) => {
                let active = self.root.dependencies.iter().filter(|d| d.marker.is_active(env));
                collect_targets(&mut targets, active);
            }
            Package::Real(name) => {
                let candidate = self.provider.candidate(name, version).await?;
                collect_targets(&mut targets, candidate.active_dependencies(env));
            }
            Package::Extra(name, extra) => {
                let candidate = self.provider.candidate(name, version).await?;
                targets.insert(
                    Package::Real(name.clone()),
                    VersionConstraint::exact(version.clone()),
                );
                match candidate.extras.get(extra) {
                    Some(deps) => {
                        let active = deps.iter().filter(|d| d.marker.is_active(env));
                        collect_targets(&mut targets, active);
                    }
                    None => tracing::warn!("{name} {version} does not provide the extra `{extra}`"),
                }
            }
        }

        Ok(targets
            .into_iter()
            .filter(|(target, _)| {
                let is_self = target == package;
                if is_self {
                    tracing::debug!("ignoring self-dependency of {package}");
                }
                !is_self
            })
            .map(|(target, constraint)| {
                Incompatibility::dependency(package.clone(), version.clone(), target, constraint)
            })
            .collect())
    }

    fn add_incompatibility(&mut self, incompatibility: Incompatibility) {
        let duplicate = incompatibility
            .packages()
            .next()
            .and_then(|first| self.by_package.get(first))
            .is_some_and(|ids| ids.iter().any(|&id| self.incompatibilities[id] == incompatibility));
        if duplicate {
            return;
        }
        tracing::debug!("fact: {incompatibility}");
        self.incompatibilities.push(incompatibility);
        self.index_incompatibility(self.incompatibilities.len() - 1);
    }

    fn index_incompatibility(&mut self, id: IncompId) {
        for package in self.incompatibilities[id].packages() {
            self.by_package.entry(package.clone()).or_default().push(id);
        }
    }
}

/// Dependencies become edges to the base package and to one virtual
/// package per requested extra. Edges to the same target intersect.
fn collect_targets<'d>(
    targets: &mut BTreeMap<Package, VersionConstraint>,
    deps: impl Iterator<Item = &'d Dependency>,
) {
    for dep in deps {
        let mut add = |target: Package| {
            targets
                .entry(target)
                .and_modify(|c| *c = c.intersect(&dep.constraint))
                .or_insert_with(|| dep.constraint.clone());
        };
        add(Package::Real(dep.name.clone()));
        for extra in &dep.extras {
            add(Package::Extra(dep.name.clone(), extra.clone()));
        }
    }
}

fn internal(message: &str) -> LodeError {
    LodeError::Generic {
        message: format!("internal solver error: {message}"),
    }
}
