//! A statement about the version chosen for one package.

use std::fmt;

use lode_core::constraint::VersionConstraint;

/// `Positive(s)`: the package is selected at a version in `s`.
/// `Negative(s)`: the package is not selected at any version in `s`, which
/// includes not being selected at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Positive(VersionConstraint),
    Negative(VersionConstraint),
}

/// How the solution's knowledge about a package relates to a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// Every assignment consistent with the solution satisfies the term.
    Satisfied,
    /// No assignment consistent with the solution satisfies the term.
    Contradicted,
    Inconclusive,
}

impl Term {
    pub fn any() -> Self {
        Term::Negative(VersionConstraint::empty())
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, Term::Positive(_))
    }

    pub fn constraint(&self) -> &VersionConstraint {
        match self {
            Term::Positive(c) | Term::Negative(c) => c,
        }
    }

    /// Holds for every possible selection, including none.
    pub fn is_any(&self) -> bool {
        matches!(self, Term::Negative(c) if c.is_empty())
    }

    /// Holds for no selection.
    pub fn is_empty(&self) -> bool {
        matches!(self, Term::Positive(c) if c.is_empty())
    }

    pub fn negate(&self) -> Term {
        match self {
            Term::Positive(c) => Term::Negative(c.clone()),
            Term::Negative(c) => Term::Positive(c.clone()),
        }
    }

    pub fn intersect(&self, other: &Term) -> Term {
        match (self, other) {
            (Term::Positive(a), Term::Positive(b)) => Term::Positive(a.intersect(b)),
            (Term::Positive(a), Term::Negative(b)) | (Term::Negative(b), Term::Positive(a)) => {
                Term::Positive(a.difference(b))
            }
            (Term::Negative(a), Term::Negative(b)) => Term::Negative(a.union(b)),
        }
    }

    /// `self \ other`, or `None` when nothing is left.
    pub fn difference(&self, other: &Term) -> Option<Term> {
        let rest = self.intersect(&other.negate());
        (!rest.is_empty()).then_some(rest)
    }

    /// Every selection allowed by `self` is allowed by `other`.
    pub fn subset_of(&self, other: &Term) -> bool {
        match (self, other) {
            (Term::Positive(a), Term::Positive(b)) => a.is_subset_of(b),
            (Term::Positive(a), Term::Negative(b)) => a.is_disjoint(b),
            (Term::Negative(_), Term::Positive(_)) => false,
            (Term::Negative(a), Term::Negative(b)) => b.is_subset_of(a),
        }
    }

    pub fn is_disjoint(&self, other: &Term) -> bool {
        self.intersect(other).is_empty()
    }

    /// Relation of `self`, the accumulated knowledge about a package, to
    /// `other`.
    pub fn relation(&self, other: &Term) -> Relation {
        if self.subset_of(other) {
            Relation::Satisfied
        } else if self.is_disjoint(other) {
            Relation::Contradicted
        } else {
            Relation::Inconclusive
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Positive(c) => write!(f, "{c}"),
            Term::Negative(c) => write!(f, "not {c}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(s: &str) -> Term {
        Term::Positive(VersionConstraint::parse(s).unwrap())
    }

    fn neg(s: &str) -> Term {
        Term::Negative(VersionConstraint::parse(s).unwrap())
    }

    #[test]
    fn positive_intersections() {
        assert_eq!(pos(">=1.0").intersect(&pos("<2.0")), pos(">=1.0, <2.0"));
        assert_eq!(pos(">=1.0").intersect(&neg(">=2.0")), pos(">=1.0, <2.0"));
        assert_eq!(neg(">=2.0").intersect(&pos(">=1.0")), pos(">=1.0, <2.0"));
        assert!(pos(">=2.0").intersect(&pos("<1.0")).is_empty());
    }

    #[test]
    fn negative_intersection_is_union() {
        assert_eq!(neg("<1.0").intersect(&neg(">=2.0")), neg("<1.0 || >=2.0"));
        assert!(!neg("*").intersect(&neg("*")).is_empty());
    }

    #[test]
    fn subset_rules() {
        assert!(pos("==1.5").subset_of(&pos(">=1.0, <2.0")));
        assert!(pos("==1.5").subset_of(&neg(">=2.0")));
        assert!(!neg(">=2.0").subset_of(&pos("*")));
        assert!(neg("*").subset_of(&neg(">=2.0")));
        assert!(!neg(">=2.0").subset_of(&neg("*")));
    }

    #[test]
    fn relations() {
        let known = pos(">=2.0");
        assert_eq!(known.relation(&pos(">=1.0")), Relation::Satisfied);
        assert_eq!(known.relation(&pos("<2.0")), Relation::Contradicted);
        assert_eq!(known.relation(&pos(">=3.0")), Relation::Inconclusive);
        assert_eq!(known.relation(&neg("<2.0")), Relation::Satisfied);
        assert_eq!(neg("==1.0").relation(&pos("*")), Relation::Inconclusive);
    }

    #[test]
    fn difference_drops_empty() {
        assert_eq!(pos("<2.0").difference(&pos(">=1.0")), Some(pos("<1.0")));
        assert_eq!(pos("==1.0").difference(&pos("*")), None);
    }

    #[test]
    fn any_and_empty() {
        assert!(Term::any().is_any());
        assert!(Term::any().negate().is_empty());
        assert!(!neg("*").is_any());
    }
}
