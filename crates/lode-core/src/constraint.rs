//! Version constraints as an interval algebra.
//!
//! A [`VersionConstraint`] is a set of versions stored as a sorted list of
//! disjoint, non-adjacent intervals. The representation is canonical, so two
//! constraints admitting the same versions compare equal; this is what lets
//! the solver detect that repeated intersection has stopped changing.
//!
//! Supported syntax (clauses joined by `,` or whitespace are intersected,
//! alternatives joined by `||` are unioned):
//!
//! | expression      | meaning                    |
//! |-----------------|----------------------------|
//! | `*`             | any version                |
//! | `1.2.3`, `==1.2.3`, `=1.2.3` | exactly 1.2.3 |
//! | `1.2.*`         | `>=1.2.0, <1.3.0-0`        |
//! | `^1.2.3`        | `>=1.2.3, <2.0.0-0`        |
//! | `^0.2.3`        | `>=0.2.3, <0.3.0-0`        |
//! | `~1.2.3`        | `>=1.2.3, <1.3.0-0`        |
//! | `~=1.4`         | `>=1.4, <2.0.0-0`          |
//! | `>=`, `>`, `<=`, `<`, `!=` | the obvious intervals |

use std::cmp::Ordering;
use std::fmt;
use std::ops::Bound;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::version::{Version, VersionParseError};

type Segment = (Bound<Version>, Bound<Version>);

/// A set of admissible versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionConstraint {
    segments: Vec<Segment>,
}

/// Error returned when a constraint expression cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstraintParseError {
    #[error("invalid constraint `{input}`: {reason}")]
    Syntax { input: String, reason: String },
    #[error(transparent)]
    Version(#[from] VersionParseError),
}

impl VersionConstraint {
    /// The constraint no version satisfies.
    pub fn empty() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// The constraint every version satisfies.
    pub fn any() -> Self {
        Self {
            segments: vec![(Bound::Unbounded, Bound::Unbounded)],
        }
    }

    /// Exactly one version.
    pub fn exact(v: Version) -> Self {
        Self {
            segments: vec![(Bound::Included(v.clone()), Bound::Included(v))],
        }
    }

    /// `>= v`
    pub fn at_least(v: Version) -> Self {
        Self::from_segment(Bound::Included(v), Bound::Unbounded)
    }

    /// `> v`
    pub fn greater_than(v: Version) -> Self {
        Self::from_segment(Bound::Excluded(v), Bound::Unbounded)
    }

    /// `<= v`
    pub fn at_most(v: Version) -> Self {
        Self::from_segment(Bound::Unbounded, Bound::Included(v))
    }

    /// `< v`
    pub fn less_than(v: Version) -> Self {
        Self::from_segment(Bound::Unbounded, Bound::Excluded(v))
    }

    /// `>= lower, < upper`
    pub fn between(lower: Version, upper: Version) -> Self {
        Self::from_segment(Bound::Included(lower), Bound::Excluded(upper))
    }

    fn from_segment(lower: Bound<Version>, upper: Bound<Version>) -> Self {
        if is_valid(&lower, &upper) {
            Self {
                segments: vec![(lower, upper)],
            }
        } else {
            Self::empty()
        }
    }

    /// Parse a constraint expression.
    pub fn parse(input: &str) -> Result<Self, ConstraintParseError> {
        let mut result = Self::empty();
        for alternative in input.split("||") {
            let mut acc = Self::any();
            for clause in clauses(alternative) {
                acc = acc.intersect(&parse_clause(&clause, input)?);
            }
            result = result.union(&acc);
        }
        Ok(result)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_any(&self) -> bool {
        matches!(
            self.segments.as_slice(),
            [(Bound::Unbounded, Bound::Unbounded)]
        )
    }

    /// Whether `version` is in this set.
    pub fn allows(&self, version: &Version) -> bool {
        self.segments
            .iter()
            .any(|(lo, hi)| above_lower(version, lo) && below_upper(version, hi))
    }

    /// The versions allowed by both constraints.
    pub fn intersect(&self, other: &Self) -> Self {
        let mut segments = Vec::new();
        for (a_lo, a_hi) in &self.segments {
            for (b_lo, b_hi) in &other.segments {
                let lo = max_lower(a_lo, b_lo);
                let hi = min_upper(a_hi, b_hi);
                if is_valid(&lo, &hi) {
                    segments.push((lo, hi));
                }
            }
        }
        Self::normalize(segments)
    }

    /// The versions allowed by either constraint.
    pub fn union(&self, other: &Self) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self::normalize(segments)
    }

    /// The versions this constraint does not allow.
    pub fn complement(&self) -> Self {
        let mut segments = Vec::new();
        let mut start = Bound::Unbounded;
        for (lo, hi) in &self.segments {
            if let Some(upper) = flip(lo) {
                segments.push((start, upper));
            }
            match flip(hi) {
                Some(next) => start = next,
                None => return Self { segments },
            }
        }
        segments.push((start, Bound::Unbounded));
        Self { segments }
    }

    /// The versions in `self` but not in `other`.
    pub fn difference(&self, other: &Self) -> Self {
        self.intersect(&other.complement())
    }

    /// Whether every version in `self` is also in `other`.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        &self.intersect(other) == self
    }

    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.intersect(other).is_empty()
    }

    /// Whether any bound of this constraint is itself a pre-release, which
    /// signals that the author explicitly opted into pre-releases.
    pub fn mentions_prerelease(&self) -> bool {
        self.segments.iter().any(|(lo, hi)| {
            [lo, hi].into_iter().any(|b| match b {
                Bound::Included(v) | Bound::Excluded(v) => {
                    v.is_prerelease() && v.as_str() != Version::lowest(v.major(), v.minor(), v.patch()).as_str()
                }
                Bound::Unbounded => false,
            })
        })
    }

    /// The single version this constraint allows, if it is an exact pin.
    pub fn as_exact(&self) -> Option<&Version> {
        match self.segments.as_slice() {
            [(Bound::Included(a), Bound::Included(b))] if a == b => Some(a),
            _ => None,
        }
    }

    fn normalize(mut segments: Vec<Segment>) -> Self {
        segments.retain(|(lo, hi)| is_valid(lo, hi));
        segments.sort_by(|a, b| cmp_lower(&a.0, &b.0));
        let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
        for (lo, hi) in segments {
            if let Some(last) = merged.last_mut() {
                if touches(&last.1, &lo) {
                    if cmp_upper(&hi, &last.1) == Ordering::Greater {
                        last.1 = hi;
                    }
                    continue;
                }
            }
            merged.push((lo, hi));
        }
        Self { segments: merged }
    }
}

/// Split one `||` alternative into clauses, re-attaching bare operators
/// (`>= 1.2`) to the version that follows them.
fn clauses(alternative: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut pending = String::new();
    for token in alternative
        .split(',')
        .flat_map(|part| part.split_whitespace())
    {
        if token.chars().all(|c| "<>=!~^".contains(c)) {
            pending.push_str(token);
            continue;
        }
        out.push(format!("{pending}{token}"));
        pending.clear();
    }
    if !pending.is_empty() {
        out.push(pending);
    }
    out
}

fn parse_clause(clause: &str, input: &str) -> Result<VersionConstraint, ConstraintParseError> {
    let syntax = |reason: &str| ConstraintParseError::Syntax {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    if clause == "*" {
        return Ok(VersionConstraint::any());
    }

    let ops = ["~=", "==", "!=", ">=", "<=", ">", "<", "=", "^", "~"];
    let (op, rest) = ops
        .iter()
        .find_map(|op| clause.strip_prefix(op).map(|rest| (*op, rest.trim())))
        .unwrap_or(("==", clause));
    if rest.is_empty() {
        return Err(syntax("operator without a version"));
    }

    if rest.ends_with(".*") || rest.ends_with(".x") {
        let wildcard = wildcard_range(&rest[..rest.len() - 2])?;
        return match op {
            "==" | "=" => Ok(wildcard),
            "!=" => Ok(wildcard.complement()),
            _ => Err(syntax("wildcards are only valid with == or !=")),
        };
    }

    let components = rest
        .trim_start_matches('v')
        .split(['-', '+'])
        .next()
        .map(|n| n.split('.').count())
        .unwrap_or(1);
    let version = Version::parse(rest)?;
    let (major, minor, patch) = (version.major(), version.minor(), version.patch());

    Ok(match op {
        "==" | "=" => VersionConstraint::exact(version),
        "!=" => VersionConstraint::exact(version).complement(),
        ">=" => VersionConstraint::at_least(version),
        ">" => VersionConstraint::greater_than(version),
        "<=" => VersionConstraint::at_most(version),
        "<" => VersionConstraint::less_than(version),
        "^" => {
            let upper = if major > 0 || components == 1 {
                Version::lowest(major + 1, 0, 0)
            } else if minor > 0 || components == 2 {
                Version::lowest(0, minor + 1, 0)
            } else {
                Version::lowest(0, 0, patch + 1)
            };
            VersionConstraint::between(version, upper)
        }
        "~" => {
            let upper = if components == 1 {
                Version::lowest(major + 1, 0, 0)
            } else {
                Version::lowest(major, minor + 1, 0)
            };
            VersionConstraint::between(version, upper)
        }
        "~=" => {
            if components < 2 {
                return Err(syntax("~= needs at least two version components"));
            }
            let upper = if components == 2 {
                Version::lowest(major + 1, 0, 0)
            } else {
                Version::lowest(major, minor + 1, 0)
            };
            VersionConstraint::between(version, upper)
        }
        _ => return Err(syntax("unknown operator")),
    })
}

fn wildcard_range(prefix: &str) -> Result<VersionConstraint, ConstraintParseError> {
    if prefix.is_empty() || prefix == "*" {
        return Ok(VersionConstraint::any());
    }
    let components = prefix.split('.').count();
    let base = Version::parse(prefix)?;
    let upper = if components == 1 {
        Version::lowest(base.major() + 1, 0, 0)
    } else {
        Version::lowest(base.major(), base.minor() + 1, 0)
    };
    Ok(VersionConstraint::between(base, upper))
}

fn above_lower(v: &Version, lo: &Bound<Version>) -> bool {
    match lo {
        Bound::Unbounded => true,
        Bound::Included(b) => v >= b,
        Bound::Excluded(b) => v > b,
    }
}

fn below_upper(v: &Version, hi: &Bound<Version>) -> bool {
    match hi {
        Bound::Unbounded => true,
        Bound::Included(b) => v <= b,
        Bound::Excluded(b) => v < b,
    }
}

/// Order lower bounds: unbounded first, `[v` before `(v`.
fn cmp_lower(a: &Bound<Version>, b: &Bound<Version>) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Less,
        (_, Bound::Unbounded) => Ordering::Greater,
        (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => {
            x.cmp(y)
        }
        (Bound::Included(x), Bound::Excluded(y)) => x.cmp(y).then(Ordering::Less),
        (Bound::Excluded(x), Bound::Included(y)) => x.cmp(y).then(Ordering::Greater),
    }
}

/// Order upper bounds: unbounded last, `v)` before `v]`.
fn cmp_upper(a: &Bound<Version>, b: &Bound<Version>) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Greater,
        (_, Bound::Unbounded) => Ordering::Less,
        (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => {
            x.cmp(y)
        }
        (Bound::Included(x), Bound::Excluded(y)) => x.cmp(y).then(Ordering::Greater),
        (Bound::Excluded(x), Bound::Included(y)) => x.cmp(y).then(Ordering::Less),
    }
}

fn max_lower(a: &Bound<Version>, b: &Bound<Version>) -> Bound<Version> {
    if cmp_lower(a, b) == Ordering::Less {
        b.clone()
    } else {
        a.clone()
    }
}

fn min_upper(a: &Bound<Version>, b: &Bound<Version>) -> Bound<Version> {
    if cmp_upper(a, b) == Ordering::Greater {
        b.clone()
    } else {
        a.clone()
    }
}

fn is_valid(lo: &Bound<Version>, hi: &Bound<Version>) -> bool {
    match (lo, hi) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => true,
        (Bound::Included(a), Bound::Included(b)) => a <= b,
        (Bound::Included(a), Bound::Excluded(b))
        | (Bound::Excluded(a), Bound::Included(b))
        | (Bound::Excluded(a), Bound::Excluded(b)) => a < b,
    }
}

/// Whether a segment ending at `hi` overlaps or abuts one starting at `lo`.
fn touches(hi: &Bound<Version>, lo: &Bound<Version>) -> bool {
    match (hi, lo) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => true,
        (Bound::Excluded(a), Bound::Excluded(b)) => a > b,
        (Bound::Included(a), Bound::Included(b))
        | (Bound::Included(a), Bound::Excluded(b))
        | (Bound::Excluded(a), Bound::Included(b)) => a >= b,
    }
}

/// Turn a bound into the opposite-side bound at the same point.
fn flip(b: &Bound<Version>) -> Option<Bound<Version>> {
    match b {
        Bound::Unbounded => None,
        Bound::Included(v) => Some(Bound::Excluded(v.clone())),
        Bound::Excluded(v) => Some(Bound::Included(v.clone())),
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("<empty>");
        }
        let rendered: Vec<String> = self
            .segments
            .iter()
            .map(|(lo, hi)| match (lo, hi) {
                (Bound::Unbounded, Bound::Unbounded) => "*".to_string(),
                (Bound::Included(a), Bound::Included(b)) if a == b => format!("=={a}"),
                _ => {
                    let mut parts = Vec::new();
                    match lo {
                        Bound::Included(v) => parts.push(format!(">={v}")),
                        Bound::Excluded(v) => parts.push(format!(">{v}")),
                        Bound::Unbounded => {}
                    }
                    match hi {
                        Bound::Included(v) => parts.push(format!("<={v}")),
                        Bound::Excluded(v) => parts.push(format!("<{v}")),
                        Bound::Unbounded => {}
                    }
                    parts.join(", ")
                }
            })
            .collect();
        f.write_str(&rendered.join(" || "))
    }
}

impl FromStr for VersionConstraint {
    type Err = ConstraintParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionConstraint {
    type Error = ConstraintParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionConstraint> for String {
    fn from(value: VersionConstraint) -> Self {
        value.to_string()
    }
}

impl Default for VersionConstraint {
    fn default() -> Self {
        Self::any()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn c(s: &str) -> VersionConstraint {
        VersionConstraint::parse(s).unwrap()
    }

    #[test]
    fn caret_ranges() {
        let caret = c("^1.2.3");
        assert!(caret.allows(&v("1.2.3")));
        assert!(caret.allows(&v("1.9.0")));
        assert!(!caret.allows(&v("2.0.0")));
        assert!(!caret.allows(&v("2.0.0-alpha")));
        assert!(!caret.allows(&v("1.2.2")));

        let zero = c("^0.2.3");
        assert!(zero.allows(&v("0.2.9")));
        assert!(!zero.allows(&v("0.3.0")));

        let patch_only = c("^0.0.3");
        assert!(patch_only.allows(&v("0.0.3")));
        assert!(!patch_only.allows(&v("0.0.4")));
    }

    #[test]
    fn tilde_and_compatible_release() {
        assert!(c("~1.2.3").allows(&v("1.2.9")));
        assert!(!c("~1.2.3").allows(&v("1.3.0")));
        assert!(c("~=1.4").allows(&v("1.9")));
        assert!(!c("~=1.4").allows(&v("2.0")));
        assert!(c("~=1.4.5").allows(&v("1.4.9")));
        assert!(!c("~=1.4.5").allows(&v("1.5.0")));
    }

    #[test]
    fn comparison_clauses_and_spacing() {
        let range = c(">= 1.0, < 2.0");
        assert_eq!(range, c(">=1.0 <2.0"));
        assert!(range.allows(&v("1.5")));
        assert!(!range.allows(&v("2.0")));
        assert!(!c("!=1.5").allows(&v("1.5.0")));
        assert!(c("!=1.5").allows(&v("1.5.1")));
    }

    #[test]
    fn wildcard_and_exact() {
        assert!(c("1.2.*").allows(&v("1.2.7")));
        assert!(!c("1.2.*").allows(&v("1.3.0")));
        assert!(c("*").is_any());
        assert_eq!(c("1.2.3").as_exact(), Some(&v("1.2.3")));
        assert_eq!(c("==1.2.3"), c("=1.2.3"));
    }

    #[test]
    fn union_merges_adjacent_segments() {
        let joined = c(">=1.0, <2.0 || >=2.0, <3.0");
        assert_eq!(joined, c(">=1.0, <3.0"));
    }

    #[test]
    fn complement_is_involutive() {
        for expr in ["^1.2", "!=1.0", "1.0", "<1 || >2", "*"] {
            let set = c(expr);
            assert_eq!(set.complement().complement(), set, "{expr}");
        }
        assert!(c("*").complement().is_empty());
        assert!(VersionConstraint::empty().complement().is_any());
    }

    #[test]
    fn intersect_is_commutative_and_associative() {
        let a = c(">=1.0");
        let b = c("<3.0");
        let d = c("!=2.0");
        assert_eq!(a.intersect(&b), b.intersect(&a));
        assert_eq!(
            a.intersect(&b).intersect(&d),
            a.intersect(&b.intersect(&d))
        );
    }

    #[test]
    fn conflicting_ranges_are_empty() {
        let set = c(">=2.0").intersect(&c("<2.0"));
        assert!(set.is_empty());
        assert!(c(">=2.0").is_disjoint(&c("<2.0")));
    }

    #[test]
    fn subset_checks() {
        assert!(c("==1.5").is_subset_of(&c("^1.0")));
        assert!(!c("^1.0").is_subset_of(&c("==1.5")));
        assert!(VersionConstraint::empty().is_subset_of(&c("==1.5")));
    }

    #[test]
    fn display_round_trips() {
        for expr in ["^1.2.3", ">1.0, <=2.0 || ==3.0", "!=1.0", "*"] {
            let set = c(expr);
            assert_eq!(c(&set.to_string()), set, "{expr} -> {set}");
        }
    }

    #[test]
    fn prerelease_mentions() {
        assert!(c(">=2.0.0-beta.1").mentions_prerelease());
        assert!(!c("^1.0").mentions_prerelease());
    }

    #[test]
    fn syntax_errors() {
        assert!(VersionConstraint::parse(">=").is_err());
        assert!(VersionConstraint::parse(">=1.*").is_err());
        assert!(VersionConstraint::parse("~=1").is_err());
    }
}
