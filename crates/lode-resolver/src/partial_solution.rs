//! The solver's partial assignment: decisions and derivations in order.

use std::collections::BTreeMap;

use lode_core::constraint::VersionConstraint;
use lode_core::version::Version;

use crate::incompatibility::IncompId;
use crate::package::Package;
use crate::term::{Relation, Term};

/// One entry of the assignment log.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub package: Package,
    pub term: Term,
    pub decision_level: usize,
    /// Position in the log.
    pub index: usize,
    /// `None` for decisions.
    pub cause: Option<IncompId>,
}

impl Assignment {
    pub fn is_decision(&self) -> bool {
        self.cause.is_none()
    }
}

/// Decisions and derived terms for one resolution run.
///
/// Per-package state is the intersection of all assignments for that
/// package and is rebuilt from the log after backtracking.
#[derive(Debug, Default)]
pub struct PartialSolution {
    assignments: Vec<Assignment>,
    terms: BTreeMap<Package, Term>,
    decisions: BTreeMap<Package, Version>,
    attempted_solutions: usize,
    backtracking: bool,
}

impl PartialSolution {
    pub fn new() -> Self {
        Self {
            attempted_solutions: 1,
            ..Self::default()
        }
    }

    pub fn decision_level(&self) -> usize {
        self.decisions.len()
    }

    pub fn attempted_solutions(&self) -> usize {
        self.attempted_solutions
    }

    pub fn decisions(&self) -> &BTreeMap<Package, Version> {
        &self.decisions
    }

    /// Accumulated knowledge about `package`, if any.
    pub fn term(&self, package: &Package) -> Option<&Term> {
        self.terms.get(package)
    }

    pub fn decide(&mut self, package: Package, version: Version) {
        if self.backtracking {
            self.attempted_solutions += 1;
            self.backtracking = false;
        }
        self.decisions.insert(package.clone(), version.clone());
        let level = self.decision_level();
        self.push(package, Term::Positive(VersionConstraint::exact(version)), level, None);
    }

    pub fn derive(&mut self, package: Package, term: Term, cause: IncompId) {
        let level = self.decision_level();
        self.push(package, term, level, Some(cause));
    }

    fn push(&mut self, package: Package, term: Term, level: usize, cause: Option<IncompId>) {
        let merged = match self.terms.get(&package) {
            Some(existing) => existing.intersect(&term),
            None => term.clone(),
        };
        self.terms.insert(package.clone(), merged);
        self.assignments.push(Assignment {
            package,
            term,
            decision_level: level,
            index: self.assignments.len(),
            cause,
        });
    }

    /// Drop every assignment made above `level`.
    pub fn backtrack(&mut self, level: usize) {
        self.backtracking = true;
        self.assignments.retain(|a| a.decision_level <= level);
        self.terms.clear();
        self.decisions.clear();
        for assignment in &self.assignments {
            let merged = match self.terms.get(&assignment.package) {
                Some(existing) => existing.intersect(&assignment.term),
                None => assignment.term.clone(),
            };
            self.terms.insert(assignment.package.clone(), merged);
            if assignment.is_decision() {
                if let Some(version) = assignment.term.constraint().as_exact() {
                    self.decisions
                        .insert(assignment.package.clone(), version.clone());
                }
            }
        }
    }

    pub fn relation(&self, package: &Package, term: &Term) -> Relation {
        match self.terms.get(package) {
            Some(known) => known.relation(term),
            None => Relation::Inconclusive,
        }
    }

    pub fn satisfies(&self, package: &Package, term: &Term) -> bool {
        self.relation(package, term) == Relation::Satisfied
    }

    /// The earliest assignment after which `term` is satisfied.
    pub fn satisfier(&self, package: &Package, term: &Term) -> Option<&Assignment> {
        let mut accumulated: Option<Term> = None;
        for assignment in self.assignments.iter().filter(|a| &a.package == package) {
            let next = match &accumulated {
                Some(acc) => acc.intersect(&assignment.term),
                None => assignment.term.clone(),
            };
            if next.subset_of(term) {
                return Some(assignment);
            }
            accumulated = Some(next);
        }
        None
    }

    /// Packages required by the solution that have no decision yet, in
    /// package order, with their allowed versions.
    pub fn undecided(&self) -> Vec<(&Package, &VersionConstraint)> {
        self.terms
            .iter()
            .filter(|(package, _)| !self.decisions.contains_key(*package))
            .filter_map(|(package, term)| match term {
                Term::Positive(c) => Some((package, c)),
                Term::Negative(_) => None,
            })
            .collect()
    }
}
