//! Incompatibilities: sets of terms that must never all hold at once.

use std::collections::HashMap;
use std::fmt;

use quarry_core::specifier::VersionSpecifier;
use quarry_core::version::Version;

use crate::term::{Package, Relation, Term};

/// Index of an incompatibility in its [`IncompatibilityStore`].
pub type IncompId = usize;

/// Why an incompatibility holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause {
    /// The root package must be selected.
    Root,
    /// No candidate of the package matches the term.
    NoVersions,
    /// One candidate could not be used, e.g. its metadata failed to load.
    Unavailable { reason: String },
    /// A candidate declares a requirement.
    Dependency,
    /// Learned during conflict resolution from two earlier incompatibilities.
    Derived(IncompId, IncompId),
}

#[derive(Debug, Clone)]
pub struct Incompatibility {
    /// At most one term per package, in insertion order.
    pub terms: Vec<(Package, Term)>,
    pub cause: Cause,
}

impl Incompatibility {
    /// `{root: not ==root_version}`: the root must be selected.
    pub fn not_root(root_version: Version) -> Self {
        Self {
            terms: vec![(Package::Root, Term::exact(root_version).negate())],
            cause: Cause::Root,
        }
    }

    /// `{package: specifier}` when no candidate matches `specifier`.
    pub fn no_versions(package: Package, specifier: VersionSpecifier) -> Self {
        Self {
            terms: vec![(package, Term::Positive(specifier))],
            cause: Cause::NoVersions,
        }
    }

    /// `{package: ==version}` for a candidate that cannot be used.
    pub fn unavailable(package: Package, version: Version, reason: impl Into<String>) -> Self {
        Self {
            terms: vec![(package, Term::exact(version))],
            cause: Cause::Unavailable {
                reason: reason.into(),
            },
        }
    }

    /// `{package: ==version, dependency: not specifier}`.
    pub fn from_dependency(
        package: Package,
        version: Version,
        dependency: Package,
        specifier: VersionSpecifier,
    ) -> Self {
        Self {
            terms: vec![
                (package, Term::exact(version)),
                (dependency, Term::Negative(specifier)),
            ],
            cause: Cause::Dependency,
        }
    }

    /// Combine `incompat` and `satisfier_cause` by the resolution rule,
    /// eliminating `package`.
    pub fn prior_cause(
        incompat_id: IncompId,
        incompat: &Incompatibility,
        satisfier_id: IncompId,
        satisfier_cause: &Incompatibility,
        package: &Package,
    ) -> Self {
        let mut terms: Vec<(Package, Term)> = Vec::new();
        for (p, t) in incompat.terms.iter().chain(&satisfier_cause.terms) {
            if p == package {
                continue;
            }
            match terms.iter_mut().find(|(existing, _)| existing == p) {
                Some((_, existing)) => *existing = existing.intersection(t),
                None => terms.push((p.clone(), t.clone())),
            }
        }
        if let (Some(t1), Some(t2)) = (incompat.get(package), satisfier_cause.get(package)) {
            let merged = t1.union(t2);
            if !merged.is_any() {
                terms.push((package.clone(), merged));
            }
        }
        Self {
            terms,
            cause: Cause::Derived(incompat_id, satisfier_id),
        }
    }

    pub fn get(&self, package: &Package) -> Option<&Term> {
        self.terms
            .iter()
            .find(|(p, _)| p == package)
            .map(|(_, t)| t)
    }

    /// Whether this incompatibility proves that no solution exists.
    pub fn is_terminal(&self, root_version: &Version) -> bool {
        match self.terms.as_slice() {
            [] => true,
            [(Package::Root, term)] => term.contains(root_version),
            _ => false,
        }
    }

    /// Relation to a partial assignment given by `accumulated(package)`.
    ///
    /// `accumulated` returns `None` for packages without any assignment.
    pub fn relation<'t>(
        &self,
        mut accumulated: impl FnMut(&Package) -> Option<&'t Term>,
    ) -> IncompatRelation {
        let any = Term::any();
        let mut unsatisfied: Option<&Package> = None;
        for (package, term) in &self.terms {
            let relation = match accumulated(package) {
                Some(acc) => term.relation_with(acc),
                None => term.relation_with(&any),
            };
            match relation {
                Relation::Satisfied => {}
                Relation::Contradicted => return IncompatRelation::Contradicted(package.clone()),
                Relation::Inconclusive => {
                    if unsatisfied.is_some() {
                        return IncompatRelation::Inconclusive;
                    }
                    unsatisfied = Some(package);
                }
            }
        }
        match unsatisfied {
            None => IncompatRelation::Satisfied,
            Some(package) => IncompatRelation::AlmostSatisfied(package.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncompatRelation {
    /// Every term holds: a conflict.
    Satisfied,
    /// Every term but the one for this package holds.
    AlmostSatisfied(Package),
    /// The term for this package cannot hold.
    Contradicted(Package),
    Inconclusive,
}

impl fmt::Display for Incompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self
            .terms
            .iter()
            .map(|(p, t)| format!("{p} {t}"))
            .collect();
        write!(f, "{{{}}}", terms.join(", "))
    }
}

/// Arena of incompatibilities indexed by the packages they mention.
#[derive(Debug, Default)]
pub struct IncompatibilityStore {
    incompats: Vec<Incompatibility>,
    by_package: HashMap<Package, Vec<IncompId>>,
}

impl IncompatibilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, incompat: Incompatibility) -> IncompId {
        let id = self.incompats.len();
        for (package, _) in &incompat.terms {
            self.by_package.entry(package.clone()).or_default().push(id);
        }
        tracing::trace!(id, %incompat, "added incompatibility");
        self.incompats.push(incompat);
        id
    }

    pub fn get(&self, id: IncompId) -> &Incompatibility {
        &self.incompats[id]
    }

    /// Ids of incompatibilities mentioning `package`, oldest first.
    pub fn for_package(&self, package: &Package) -> &[IncompId] {
        self.by_package
            .get(package)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.incompats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incompats.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::package::PackageName;
    use quarry_core::specifier::parse_specifier;

    fn base(name: &str) -> Package {
        Package::Base(PackageName::new(name).unwrap())
    }

    #[test]
    fn prior_cause_eliminates_package() {
        let a = base("a");
        let b = base("b");
        let dep = Incompatibility::from_dependency(
            Package::Root,
            Version::release([0]),
            a.clone(),
            parse_specifier("==1.0").unwrap(),
        );
        let no_versions = Incompatibility::no_versions(a.clone(), parse_specifier("==1.0").unwrap());
        let derived = Incompatibility::prior_cause(1, &no_versions, 0, &dep, &a);
        assert_eq!(derived.terms.len(), 1);
        assert_eq!(derived.terms[0].0, Package::Root);
        assert!(derived.is_terminal(&Version::release([0])));
        assert_eq!(derived.cause, Cause::Derived(1, 0));
        assert!(derived.get(&b).is_none());
    }

    #[test]
    fn relation_reports_almost_satisfied() {
        let a = base("a");
        let incompat = Incompatibility::from_dependency(
            Package::Root,
            Version::release([0]),
            a.clone(),
            parse_specifier(">=1").unwrap(),
        );
        let root_term = Term::exact(Version::release([0]));
        let relation = incompat.relation(|p| (p == &Package::Root).then_some(&root_term));
        assert_eq!(relation, IncompatRelation::AlmostSatisfied(a));
    }

    #[test]
    fn store_indexes_by_package() {
        let mut store = IncompatibilityStore::new();
        let id = store.add(Incompatibility::not_root(Version::release([0])));
        assert_eq!(store.for_package(&Package::Root), &[id]);
        assert!(store.for_package(&base("x")).is_empty());
    }
}
