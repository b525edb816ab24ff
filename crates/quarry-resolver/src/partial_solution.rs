//! The solver's assignment log.
//!
//! Assignments are only ever appended; backtracking truncates the log to a
//! decision level and replays it to rebuild the per-package summaries.

use indexmap::IndexMap;

use quarry_core::specifier::VersionSpecifier;
use quarry_core::version::Version;

use crate::incompatibility::{IncompId, IncompatRelation, Incompatibility};
use crate::term::{Package, Term};

#[derive(Debug, Clone)]
struct Assignment {
    package: Package,
    term: Term,
    level: usize,
    /// `None` for decisions, otherwise the incompatibility it was derived from.
    cause: Option<IncompId>,
}

#[derive(Debug, Clone)]
struct PackageState {
    accumulated: Term,
    decision: Option<Version>,
}

/// Where the incompatibility under conflict became satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatisfierSearch {
    /// Backtrack to `previous_level` and learn the incompatibility.
    DifferentDecisionLevels {
        package: Package,
        previous_level: usize,
    },
    /// Resolve the incompatibility against the satisfier's cause.
    SameDecisionLevels {
        package: Package,
        satisfier_cause: IncompId,
    },
}

#[derive(Debug, Default)]
pub struct PartialSolution {
    assignments: Vec<Assignment>,
    level: usize,
    /// Keyed in order of first assignment.
    packages: IndexMap<Package, PackageState>,
}

impl PartialSolution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// Select `version` for `package`, opening a new decision level.
    pub fn decide(&mut self, package: Package, version: Version) {
        self.level += 1;
        self.push(Assignment {
            package,
            term: Term::exact(version),
            level: self.level,
            cause: None,
        });
    }

    /// Record `term` for `package`, implied by incompatibility `cause`.
    pub fn derive(&mut self, package: Package, term: Term, cause: IncompId) {
        self.push(Assignment {
            package,
            term,
            level: self.level,
            cause: Some(cause),
        });
    }

    fn push(&mut self, assignment: Assignment) {
        apply(&mut self.packages, &assignment);
        self.assignments.push(assignment);
    }

    /// Intersection of all terms assigned to `package` so far.
    pub fn term(&self, package: &Package) -> Option<&Term> {
        self.packages.get(package).map(|state| &state.accumulated)
    }

    pub fn decision(&self, package: &Package) -> Option<&Version> {
        self.packages
            .get(package)
            .and_then(|state| state.decision.as_ref())
    }

    pub fn relation(&self, incompat: &Incompatibility) -> IncompatRelation {
        incompat.relation(|package| self.term(package))
    }

    /// The first package, in discovery order, that must be selected but has
    /// no version yet, together with the versions still allowed for it.
    pub fn next_undecided(&self) -> Option<(Package, VersionSpecifier)> {
        self.packages.iter().find_map(|(package, state)| {
            match (&state.accumulated, &state.decision) {
                (Term::Positive(spec), None) => Some((package.clone(), spec.clone())),
                _ => None,
            }
        })
    }

    /// Decisions in the order they were made.
    pub fn decisions(&self) -> impl Iterator<Item = (&Package, Version)> {
        self.assignments
            .iter()
            .filter(|a| a.cause.is_none())
            .filter_map(|a| a.term.specifier().as_exact().map(|v| (&a.package, v)))
    }

    /// Drop every assignment made above `level`.
    pub fn backtrack(&mut self, level: usize) {
        self.assignments.retain(|a| a.level <= level);
        self.level = level;
        self.packages.clear();
        for assignment in &self.assignments {
            apply(&mut self.packages, assignment);
        }
    }

    /// Locate the assignment that made `incompat` satisfied and decide how
    /// conflict resolution proceeds from it.
    ///
    /// Returns `None` if `incompat` is not actually satisfied.
    pub fn satisfier_search(&self, incompat: &Incompatibility) -> Option<SatisfierSearch> {
        let mut satisfier: Option<usize> = None;
        let mut indices = Vec::with_capacity(incompat.terms.len());
        for (package, term) in &incompat.terms {
            if term.is_any() {
                continue;
            }
            let index = self.satisfying_index(package, term, None)?;
            indices.push((package, index));
            satisfier = Some(satisfier.map_or(index, |s: usize| s.max(index)));
        }
        let satisfier_index = satisfier?;
        let satisfier = &self.assignments[satisfier_index];

        let mut previous_level = 1;
        for (package, index) in indices {
            if *package == satisfier.package {
                continue;
            }
            previous_level = previous_level.max(self.assignments[index].level);
        }
        if let Some(term) = incompat.get(&satisfier.package) {
            if !satisfier.term.subset_of(term) {
                if let Some(index) =
                    self.satisfying_index(&satisfier.package, term, Some(satisfier_index))
                {
                    previous_level = previous_level.max(self.assignments[index].level);
                }
            }
        }

        match satisfier.cause {
            Some(cause) if previous_level >= satisfier.level => {
                Some(SatisfierSearch::SameDecisionLevels {
                    package: satisfier.package.clone(),
                    satisfier_cause: cause,
                })
            }
            _ => Some(SatisfierSearch::DifferentDecisionLevels {
                package: satisfier.package.clone(),
                previous_level,
            }),
        }
    }

    /// Earliest assignment index at which the accumulated term for `package`
    /// falls inside `term`.
    ///
    /// With `with_satisfier`, the accumulation starts from that assignment's
    /// term and only considers earlier assignments.
    fn satisfying_index(
        &self,
        package: &Package,
        term: &Term,
        with_satisfier: Option<usize>,
    ) -> Option<usize> {
        let (mut accumulated, limit) = match with_satisfier {
            Some(index) => (self.assignments[index].term.clone(), index),
            None => (Term::any(), self.assignments.len()),
        };
        for (index, assignment) in self.assignments[..limit].iter().enumerate() {
            if &assignment.package != package {
                continue;
            }
            accumulated = accumulated.intersection(&assignment.term);
            if accumulated.subset_of(term) {
                return Some(index);
            }
        }
        None
    }
}

fn apply(packages: &mut IndexMap<Package, PackageState>, assignment: &Assignment) {
    let state = packages
        .entry(assignment.package.clone())
        .or_insert_with(|| PackageState {
            accumulated: Term::any(),
            decision: None,
        });
    state.accumulated = state.accumulated.intersection(&assignment.term);
    if assignment.cause.is_none() {
        if let Term::Positive(spec) = &assignment.term {
            state.decision = spec.as_exact();
        }
    }
}
