//! Incompatibilities: sets of terms that cannot all hold at once.

use std::collections::BTreeMap;
use std::fmt;

use lode_core::constraint::VersionConstraint;
use lode_core::version::Version;

use crate::package::Package;
use crate::term::Term;

/// Index of an incompatibility in the solver's arena.
pub type IncompId = usize;

/// Why an incompatibility is known to hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause {
    /// The root package must be selected.
    Root,
    /// A package version declares a dependency.
    Dependency,
    /// No version of the package matches the constraint.
    NoVersions,
    /// The source does not know the package (or that version of it).
    NotFound(String),
    /// Derived during conflict resolution from two earlier incompatibilities.
    Conflict(IncompId, IncompId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incompatibility {
    terms: BTreeMap<Package, Term>,
    cause: Cause,
}

impl Incompatibility {
    /// Terms on the same package are intersected.
    pub fn new(terms: impl IntoIterator<Item = (Package, Term)>, cause: Cause) -> Self {
        let mut merged: BTreeMap<Package, Term> = BTreeMap::new();
        for (package, term) in terms {
            match merged.get_mut(&package) {
                Some(existing) => *existing = existing.intersect(&term),
                None => {
                    merged.insert(package, term);
                }
            }
        }
        if matches!(cause, Cause::Conflict(..)) {
            merged.retain(|_, term| !term.is_any());
            // The root is always selected, so it adds nothing to a derived clause.
            if merged.len() > 1 {
                merged.retain(|package, term| !(package.is_root() && term.is_positive()));
            }
        }
        Self {
            terms: merged,
            cause,
        }
    }

    pub fn root(package: Package, version: Version) -> Self {
        Self::new(
            [(package, Term::Negative(VersionConstraint::exact(version)))],
            Cause::Root,
        )
    }

    /// `package version` depends on `dependency` within `constraint`.
    pub fn dependency(
        package: Package,
        version: Version,
        dependency: Package,
        constraint: VersionConstraint,
    ) -> Self {
        Self::new(
            [
                (package, Term::Positive(VersionConstraint::exact(version))),
                (dependency, Term::Negative(constraint)),
            ],
            Cause::Dependency,
        )
    }

    pub fn no_versions(package: Package, constraint: VersionConstraint) -> Self {
        Self::new([(package, Term::Positive(constraint))], Cause::NoVersions)
    }

    pub fn not_found(package: Package, constraint: VersionConstraint, message: String) -> Self {
        Self::new([(package, Term::Positive(constraint))], Cause::NotFound(message))
    }

    pub fn terms(&self) -> impl Iterator<Item = (&Package, &Term)> {
        self.terms.iter()
    }

    pub fn term(&self, package: &Package) -> Option<&Term> {
        self.terms.get(package)
    }

    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.terms.keys()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.cause, Cause::Conflict(..))
    }

    /// Holding this incompatibility means no solution exists.
    pub fn is_failure(&self) -> bool {
        match self.terms.len() {
            0 => true,
            1 => self
                .terms
                .iter()
                .all(|(package, term)| package.is_root() && term.is_positive()),
            _ => false,
        }
    }
}

/// `name (constraint)` in report form.
pub(crate) fn describe(package: &Package, constraint: &VersionConstraint) -> String {
    if package.is_root() || constraint.is_any() {
        return package.to_string();
    }
    match constraint.as_exact() {
        Some(version) => format!("{package} ({version})"),
        None => format!("{package} ({constraint})"),
    }
}

fn describe_term(package: &Package, term: &Term) -> String {
    match term {
        Term::Positive(c) => describe(package, c),
        Term::Negative(c) => format!("not {}", describe(package, c)),
    }
}

impl fmt::Display for Incompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<(&Package, &Term)> = self.terms.iter().collect();

        match (&self.cause, terms.as_slice()) {
            (Cause::Dependency, [(a, ta), (b, tb)]) => {
                let ((dependent, d), (dependency, c)) = if ta.is_positive() {
                    ((a, ta), (b, tb))
                } else {
                    ((b, tb), (a, ta))
                };
                return write!(
                    f,
                    "{} depends on {}",
                    describe(dependent, d.constraint()),
                    describe(dependency, c.constraint())
                );
            }
            (Cause::NoVersions, [(package, term)]) => {
                return write!(f, "no versions of {package} match {}", term.constraint());
            }
            (Cause::NotFound(_), [(package, term)]) => {
                return match term.constraint().as_exact() {
                    Some(version) => write!(f, "{package} ({version}) could not be found"),
                    None => write!(f, "{package} doesn't exist"),
                };
            }
            (Cause::Root, [(package, _)]) => return write!(f, "{package} is the root package"),
            _ => {}
        }

        if self.is_failure() {
            return write!(f, "version solving failed");
        }

        match terms.as_slice() {
            [(package, term)] if term.is_positive() => {
                write!(f, "{} is forbidden", describe_term(package, term))
            }
            [(package, term)] => {
                write!(f, "{} is required", describe_term(package, &term.negate()))
            }
            [(a, ta), (b, tb)] => match (ta.is_positive(), tb.is_positive()) {
                (true, true) => write!(
                    f,
                    "{} is incompatible with {}",
                    describe_term(a, ta),
                    describe_term(b, tb)
                ),
                (true, false) => write!(
                    f,
                    "{} requires {}",
                    describe_term(a, ta),
                    describe_term(b, &tb.negate())
                ),
                (false, true) => write!(
                    f,
                    "{} requires {}",
                    describe_term(b, tb),
                    describe_term(a, &ta.negate())
                ),
                (false, false) => write!(
                    f,
                    "either {} or {}",
                    describe_term(a, &ta.negate()),
                    describe_term(b, &tb.negate())
                ),
            },
            _ => {
                let positive: Vec<String> = terms
                    .iter()
                    .filter(|(_, t)| t.is_positive())
                    .map(|(p, t)| describe_term(p, t))
                    .collect();
                let negative: Vec<String> = terms
                    .iter()
                    .filter(|(_, t)| !t.is_positive())
                    .map(|(p, t)| describe_term(p, &t.negate()))
                    .collect();
                if negative.is_empty() {
                    write!(f, "one of {} must be false", positive.join(", "))
                } else if positive.is_empty() {
                    write!(f, "one of {} must be true", negative.join(", "))
                } else {
                    write!(
                        f,
                        "if {} then {}",
                        positive.join(" and "),
                        negative.join(" or ")
                    )
                }
            }
        }
    }
}
