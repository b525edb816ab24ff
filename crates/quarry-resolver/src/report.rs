//! Human-readable explanation of a failed resolution.
//!
//! The final incompatibility of a failed run is the root of a binary tree
//! of derivations. The report walks that tree depth-first and emits one
//! numbered "Because X and Y, Z." step per derived node, so every step only
//! refers to external facts or to steps printed before it.

use std::collections::HashMap;
use std::fmt;

use crate::incompatibility::{Cause, IncompId, Incompatibility, IncompatibilityStore};
use crate::term::{Package, Term};

/// One derivation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationStep {
    pub number: usize,
    /// Descriptions of the two incompatibilities this step combines.
    pub because: [String; 2],
    /// What they prove together.
    pub conclusion: String,
}

impl fmt::Display for DerivationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}. Because {} and {}, {}.",
            self.number, self.because[0], self.because[1], self.conclusion
        )
    }
}

/// The chain of reasoning behind a resolution failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivationReport {
    pub steps: Vec<DerivationStep>,
    /// Set when the failure is a single external fact with nothing derived.
    pub summary: Option<String>,
}

impl DerivationReport {
    /// Build the report for the terminal incompatibility `root`.
    pub fn build(store: &IncompatibilityStore, root: IncompId) -> Self {
        let mut builder = Builder {
            store,
            numbered: HashMap::new(),
            steps: Vec::new(),
        };
        match store.get(root).cause {
            Cause::Derived(..) => {
                builder.visit(root);
                Self {
                    steps: builder.steps,
                    summary: None,
                }
            }
            _ => Self {
                steps: Vec::new(),
                summary: Some(describe(store.get(root))),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.summary.is_none()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

impl fmt::Display for DerivationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(summary) = &self.summary {
            return write!(f, "{summary}.");
        }
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}

struct Builder<'a> {
    store: &'a IncompatibilityStore,
    numbered: HashMap<IncompId, usize>,
    steps: Vec<DerivationStep>,
}

impl Builder<'_> {
    /// Emit the steps for derived incompatibility `id`, returning its number.
    fn visit(&mut self, id: IncompId) -> usize {
        if let Some(number) = self.numbered.get(&id) {
            return *number;
        }
        let (left, right) = match self.store.get(id).cause {
            Cause::Derived(left, right) => (left, right),
            _ => return 0,
        };
        let because = [self.reference(left), self.reference(right)];
        let number = self.steps.len() + 1;
        self.numbered.insert(id, number);
        self.steps.push(DerivationStep {
            number,
            because,
            conclusion: describe(self.store.get(id)),
        });
        number
    }

    /// How a step refers to `id`: external facts inline, derived ones by
    /// their step number.
    fn reference(&mut self, id: IncompId) -> String {
        let store = self.store;
        let incompat = store.get(id);
        match incompat.cause {
            Cause::Derived(..) => {
                let number = self.visit(id);
                format!("{} ({number})", describe(incompat))
            }
            _ => describe(incompat),
        }
    }
}

fn package_term(package: &Package, term: &Term) -> String {
    let spec = term.specifier();
    if spec.is_allow_all() || matches!(package, Package::Root) {
        package.to_string()
    } else {
        format!("{package} {spec}")
    }
}

/// One-line description of an incompatibility.
pub fn describe(incompat: &Incompatibility) -> String {
    match (&incompat.cause, incompat.terms.as_slice()) {
        (Cause::Root, _) => "root is required".to_string(),
        (Cause::NoVersions, [(package, term)]) => {
            if term.specifier().is_allow_all() {
                format!("no versions of {package} are available")
            } else {
                format!("no versions of {package} match {}", term.specifier())
            }
        }
        (Cause::Unavailable { reason }, [(package, term)]) => {
            format!("{} is unavailable ({reason})", package_term(package, term))
        }
        (Cause::Dependency, [(package, version), (dependency, requirement)]) => {
            format!(
                "{} depends on {}",
                package_term(package, version),
                package_term(dependency, requirement)
            )
        }
        _ => describe_terms(&incompat.terms),
    }
}

fn describe_terms(terms: &[(Package, Term)]) -> String {
    match terms {
        [] => "version solving failed".to_string(),
        [(Package::Root, term)] if term.is_positive() => "version solving failed".to_string(),
        [(package, term)] if term.is_positive() => {
            format!("{} is forbidden", package_term(package, term))
        }
        [(package, term)] => format!("{} is required", package_term(package, term)),
        [(p1, t1), (p2, t2)] if t1.is_positive() && !t2.is_positive() => {
            format!("{} requires {}", package_term(p1, t1), package_term(p2, t2))
        }
        [(p1, t1), (p2, t2)] if !t1.is_positive() && t2.is_positive() => {
            format!("{} requires {}", package_term(p2, t2), package_term(p1, t1))
        }
        _ => {
            let parts: Vec<String> = terms
                .iter()
                .map(|(p, t)| {
                    if t.is_positive() {
                        package_term(p, t)
                    } else {
                        format!("not {}", package_term(p, t))
                    }
                })
                .collect();
            format!("{} are incompatible", parts.join(" and "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::package::PackageName;
    use quarry_core::specifier::parse_specifier;
    use quarry_core::version::Version;

    fn base(name: &str) -> Package {
        Package::Base(PackageName::new(name).unwrap())
    }

    #[test]
    fn single_external_fact() {
        let mut store = IncompatibilityStore::new();
        let id = store.add(Incompatibility::no_versions(
            base("a"),
            parse_specifier(">=3").unwrap(),
        ));
        let report = DerivationReport::build(&store, id);
        assert_eq!(report.len(), 0);
        assert_eq!(report.to_string(), "no versions of a match >=3.");
    }

    #[test]
    fn two_dependencies_on_one_package() {
        let mut store = IncompatibilityStore::new();
        let root = Version::release([0]);
        let first = store.add(Incompatibility::from_dependency(
            Package::Root,
            root.clone(),
            base("a"),
            parse_specifier("==1.0").unwrap(),
        ));
        let second = store.add(Incompatibility::from_dependency(
            Package::Root,
            root,
            base("a"),
            parse_specifier("==2.0").unwrap(),
        ));
        let derived = Incompatibility::prior_cause(
            first,
            store.get(first),
            second,
            store.get(second),
            &base("a"),
        );
        let id = store.add(derived);
        let report = DerivationReport::build(&store, id);
        assert_eq!(
            report.to_string(),
            "1. Because root depends on a ==1.0 and root depends on a ==2.0, version solving failed."
        );
    }

    #[test]
    fn dependency_description() {
        let incompat = Incompatibility::from_dependency(
            base("a"),
            Version::release([1, 5]),
            base("b"),
            parse_specifier(">=1, <2").unwrap(),
        );
        assert_eq!(describe(&incompat), "a ==1.5 depends on b >=1, <2");
    }
}
