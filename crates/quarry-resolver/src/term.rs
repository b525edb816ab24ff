//! Solver-level packages and terms.

use std::fmt;

use quarry_core::package::PackageName;
use quarry_core::specifier::VersionSpecifier;
use quarry_core::version::Version;

/// A node the solver assigns versions to.
///
/// Extras are pseudo-packages: `Extra(p, x)` carries the extra's own
/// requirements and is pinned to the same version as `Base(p)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Package {
    Root,
    Base(PackageName),
    Extra(PackageName, String),
}

impl Package {
    /// The real package behind this node; `None` for the root.
    pub fn name(&self) -> Option<&PackageName> {
        match self {
            Self::Root => None,
            Self::Base(name) | Self::Extra(name, _) => Some(name),
        }
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Base(name) => write!(f, "{name}"),
            Self::Extra(name, extra) => write!(f, "{name}[{extra}]"),
        }
    }
}

/// A statement about the version of one package.
///
/// `Positive(s)`: the package is selected with a version in `s`.
/// `Negative(s)`: the package is not selected at a version in `s` (it may
/// be absent altogether).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Positive(VersionSpecifier),
    Negative(VersionSpecifier),
}

/// How a term relates to the accumulated assignments for its package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Satisfied,
    Contradicted,
    Inconclusive,
}

impl Term {
    /// Holds for every assignment, including absence.
    pub fn any() -> Self {
        Self::Negative(VersionSpecifier::none())
    }

    /// Holds for no assignment.
    pub fn empty() -> Self {
        Self::Positive(VersionSpecifier::none())
    }

    pub fn exact(version: Version) -> Self {
        Self::Positive(VersionSpecifier::version_match(version))
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Positive(_))
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Self::Negative(s) if s.is_empty())
    }

    pub fn specifier(&self) -> &VersionSpecifier {
        match self {
            Self::Positive(s) | Self::Negative(s) => s,
        }
    }

    pub fn negate(&self) -> Self {
        match self {
            Self::Positive(s) => Self::Negative(s.clone()),
            Self::Negative(s) => Self::Positive(s.clone()),
        }
    }

    /// Whether selecting `version` satisfies this term.
    pub fn contains(&self, version: &Version) -> bool {
        match self {
            Self::Positive(s) => s.allows(version),
            Self::Negative(s) => !s.allows(version),
        }
    }

    pub fn intersection(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Positive(a), Self::Positive(b)) => Self::Positive(a.intersection(b)),
            (Self::Positive(p), Self::Negative(n)) | (Self::Negative(n), Self::Positive(p)) => {
                Self::Positive(p.intersection(&n.inverse()))
            }
            (Self::Negative(a), Self::Negative(b)) => Self::Negative(a.union(b)),
        }
    }

    pub fn union(&self, other: &Self) -> Self {
        self.negate().intersection(&other.negate()).negate()
    }

    /// `self ⊆ other`.
    pub fn subset_of(&self, other: &Self) -> bool {
        &self.intersection(other) == self
    }

    /// Relation of this term to `accumulated`, the intersection of every
    /// assignment made so far for the same package.
    pub fn relation_with(&self, accumulated: &Self) -> Relation {
        let full = accumulated.intersection(self);
        if &full == accumulated {
            Relation::Satisfied
        } else if full == Self::empty() {
            Relation::Contradicted
        } else {
            Relation::Inconclusive
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positive(s) => write!(f, "{s}"),
            Self::Negative(s) => write!(f, "not {s}"),
        }
    }
}
