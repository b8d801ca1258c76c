//! Identities the solver assigns versions to.

use std::cmp::Ordering;
use std::fmt;

use lode_core::package::PackageName;

/// A solver package.
///
/// Besides real packages there is the root (the project being locked) and
/// one virtual package per requested extra. `Extra(name, x)` at version `v`
/// depends on `name ==v` plus the dependencies `x` activates, so selecting
/// an extra forces the same version of its base package.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Package {
    Root(PackageName),
    Real(PackageName),
    Extra(PackageName, String),
}

impl Package {
    pub fn name(&self) -> &PackageName {
        match self {
            Package::Root(name) | Package::Real(name) | Package::Extra(name, _) => name,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Package::Root(_))
    }

    fn rank(&self) -> u8 {
        match self {
            Package::Root(_) => 0,
            Package::Real(_) => 1,
            Package::Extra(..) => 2,
        }
    }
}

// Root first, then by name, a base package before its extras.
impl Ord for Package {
    fn cmp(&self, other: &Self) -> Ordering {
        let root = other.is_root().cmp(&self.is_root());
        root.then_with(|| self.name().cmp(other.name()))
            .then_with(|| self.rank().cmp(&other.rank()))
            .then_with(|| match (self, other) {
                (Package::Extra(_, a), Package::Extra(_, b)) => a.cmp(b),
                _ => Ordering::Equal,
            })
    }
}

impl PartialOrd for Package {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Package::Root(name) | Package::Real(name) => write!(f, "{name}"),
            Package::Extra(name, extra) => write!(f, "{name}[{extra}]"),
        }
    }
}
