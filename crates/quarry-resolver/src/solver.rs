//! PubGrub version solving over a [`Repository`].
//!
//! The decision loop is sequential: unit propagation, conflict resolution,
//! then one decision. Repository requests run in the background through
//! [`MetadataCache`] and are only awaited when a decision needs them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use quarry_core::config::ResolverConfig;
use quarry_core::dependency::Dependency;
use quarry_core::environment::Environment;
use quarry_core::lockfile::PackagesLock;
use quarry_core::package::{PackageDescriptor, PackageName};
use quarry_core::specifier::VersionSpecifier;
use quarry_core::version::Version;

use crate::cache::MetadataCache;
use crate::error::ResolutionError;
use crate::incompatibility::{IncompId, IncompatRelation, Incompatibility, IncompatibilityStore};
use crate::partial_solution::{PartialSolution, SatisfierSearch};
use crate::report::DerivationReport;
use crate::repository::{requirements, Candidates, Repository};
use crate::term::{Package, Term};

/// A successful resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Selected packages in the order they were decided.
    pub packages: Vec<PackageDescriptor>,
    /// Extras that ended up activated, per package.
    pub extras: BTreeMap<PackageName, BTreeSet<String>>,
}

impl Resolution {
    pub fn get(&self, name: &PackageName) -> Option<&Version> {
        self.packages
            .iter()
            .find(|d| &d.name == name)
            .map(|d| &d.version)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Find one version of every package transitively required by
/// `root_requirements` under `environment`.
///
/// Versions remembered in `lock` are tried first when
/// `config.prefer_locked` is set; they never make an otherwise feasible
/// resolution fail.
pub async fn resolve<R>(
    root_requirements: &[Dependency],
    repository: Arc<R>,
    environment: &Environment,
    lock: Option<&PackagesLock>,
    config: &ResolverConfig,
) -> Result<Resolution, ResolutionError>
where
    R: Repository + Send + Sync + 'static,
{
    let solver = Solver {
        cache: MetadataCache::new(
            repository,
            environment.clone(),
            config.max_concurrent_fetches,
        ),
        root_requirements,
        environment,
        lock: if config.prefer_locked { lock } else { None },
        config,
        store: IncompatibilityStore::new(),
        solution: PartialSolution::new(),
        root_version: Version::release([0]),
        registered: HashMap::new(),
    };
    solver.run().await
}

struct Solver<'a, R> {
    cache: MetadataCache<R>,
    root_requirements: &'a [Dependency],
    environment: &'a Environment,
    lock: Option<&'a PackagesLock>,
    config: &'a ResolverConfig,
    store: IncompatibilityStore,
    solution: PartialSolution,
    root_version: Version,
    /// Requirement incompatibilities already added per candidate.
    registered: HashMap<(Package, Version), Vec<IncompId>>,
}

impl<R> Solver<'_, R>
where
    R: Repository + Send + Sync + 'static,
{
    async fn run(mut self) -> Result<Resolution, ResolutionError> {
        for dep in self.root_requirements {
            self.cache.prefetch_list(&dep.name);
        }
        self.store
            .add(Incompatibility::not_root(self.root_version.clone()));

        let mut next = Package::Root;
        loop {
            self.propagate(next)?;
            let Some((package, allowed)) = self.solution.next_undecided() else {
                break;
            };
            next = self.choose(package, allowed).await?;
        }

        let mut resolution = Resolution::default();
        for (package, version) in self.solution.decisions() {
            match package {
                Package::Root => {}
                Package::Base(name) => resolution
                    .packages
                    .push(PackageDescriptor::new(name.clone(), version)),
                Package::Extra(name, extra) => {
                    resolution
                        .extras
                        .entry(name.clone())
                        .or_default()
                        .insert(extra.clone());
                }
            }
        }
        tracing::info!(
            "Resolved {} packages ({} incompatibilities learned or loaded)",
            resolution.len(),
            self.store.len()
        );
        Ok(resolution)
    }

    /// Unit propagation starting from the assignments to `start`.
    fn propagate(&mut self, start: Package) -> Result<(), ResolutionError> {
        let mut changed = vec![start];
        while let Some(package) = changed.pop() {
            // Newest incompatibilities first: they are the most specific.
            let ids: Vec<IncompId> = self.store.for_package(&package).iter().rev().copied().collect();
            for id in ids {
                match self.solution.relation(self.store.get(id)) {
                    IncompatRelation::Satisfied => {
                        let (learned, conflicting) = self.resolve_conflict(id)?;
                        let term = self.negated_term(learned, &conflicting)?;
                        self.solution.derive(conflicting.clone(), term, learned);
                        changed.clear();
                        changed.push(conflicting);
                        break;
                    }
                    IncompatRelation::AlmostSatisfied(unsatisfied) => {
                        let term = self.negated_term(id, &unsatisfied)?;
                        self.solution.derive(unsatisfied.clone(), term, id);
                        if !changed.contains(&unsatisfied) {
                            changed.push(unsatisfied);
                        }
                    }
                    IncompatRelation::Contradicted(_) | IncompatRelation::Inconclusive => {}
                }
            }
        }
        Ok(())
    }

    fn negated_term(&self, id: IncompId, package: &Package) -> Result<Term, ResolutionError> {
        self.store
            .get(id)
            .get(package)
            .map(Term::negate)
            .ok_or_else(|| {
                ResolutionError::Internal(format!(
                    "incompatibility {} has no term for {package}",
                    self.store.get(id)
                ))
            })
    }

    /// Learn from the satisfied incompatibility `id` until backjumping makes
    /// it almost satisfied again. Returns the learned incompatibility and the
    /// package whose term it now forces.
    fn resolve_conflict(&mut self, mut id: IncompId) -> Result<(IncompId, Package), ResolutionError> {
        tracing::debug!("Conflict on {}", self.store.get(id));
        loop {
            if self.store.get(id).is_terminal(&self.root_version) {
                let report = DerivationReport::build(&self.store, id);
                tracing::info!("Resolution failed after {} derivation steps", report.len());
                return Err(ResolutionError::NoVersionsSatisfy { report });
            }
            let search = self
                .solution
                .satisfier_search(self.store.get(id))
                .ok_or_else(|| {
                    ResolutionError::Internal(format!(
                        "conflicting incompatibility {} is not satisfied",
                        self.store.get(id)
                    ))
                })?;
            match search {
                SatisfierSearch::DifferentDecisionLevels {
                    package,
                    previous_level,
                } => {
                    tracing::debug!(
                        "Backtracking to level {previous_level}, learned {}",
                        self.store.get(id)
                    );
                    self.solution.backtrack(previous_level);
                    return Ok((id, package));
                }
                SatisfierSearch::SameDecisionLevels {
                    package,
                    satisfier_cause,
                } => {
                    let prior = Incompatibility::prior_cause(
                        id,
                        self.store.get(id),
                        satisfier_cause,
                        self.store.get(satisfier_cause),
                        &package,
                    );
                    id = self.store.add(prior);
                }
            }
        }
    }

    /// Pick a version for `package` within `allowed`, register its
    /// requirements and, when they don't immediately conflict, decide it.
    ///
    /// Returns the package propagation should restart from.
    async fn choose(
        &mut self,
        package: Package,
        allowed: VersionSpecifier,
    ) -> Result<Package, ResolutionError> {
        let Some(name) = package.name().cloned() else {
            let root_version = self.root_version.clone();
            let reqs = requirements(
                &Package::Root,
                &root_version,
                self.root_requirements,
                self.environment,
            );
            self.add_requirements(&package, &root_version, reqs);
            self.solution.decide(package.clone(), root_version);
            return Ok(package);
        };

        let listing = match self.cache.list(&name).await {
            Ok(listing) => listing,
            Err(e) => {
                tracing::warn!("Failed to list versions of {name}: {e}");
                Vec::new()
            }
        };
        let mut candidates = Candidates::new(&listing, &allowed, self.config.prereleases);
        candidates.prefer(&self.hints(&package, &name));

        let Some(version) = candidates.first().cloned() else {
            tracing::debug!("No candidates for {package} {allowed}");
            self.store
                .add(Incompatibility::no_versions(package.clone(), allowed));
            return Ok(package);
        };
        for candidate in candidates.iter().take(self.config.prefetch_candidates) {
            self.cache.prefetch_dependencies(&PackageDescriptor::new(
                name.clone(),
                candidates.listed(candidate).clone(),
            ));
        }

        let descriptor = PackageDescriptor::new(name.clone(), version.clone());
        let listed = PackageDescriptor::new(name.clone(), candidates.listed(&version).clone());
        let dependencies = match self.cache.dependencies(&listed).await {
            Ok(dependencies) => dependencies,
            Err(e) => {
                tracing::warn!("Skipping {descriptor}: {e}");
                self.store.add(Incompatibility::unavailable(
                    package.clone(),
                    version,
                    e.to_string(),
                ));
                return Ok(package);
            }
        };

        let reqs = requirements(&package, &version, &dependencies, self.environment);
        if let Some((_, spec)) = reqs
            .iter()
            .find(|(dependency, spec)| *dependency == package && !spec.allows(&version))
        {
            tracing::warn!("Skipping {descriptor}: depends on itself with {spec}");
            self.store.add(Incompatibility::unavailable(
                package.clone(),
                version,
                "depends on an incompatible version of itself",
            ));
            return Ok(package);
        }

        let key = (package.clone(), version.clone());
        let added = match self.registered.get(&key) {
            Some(ids) => ids.clone(),
            None => {
                let ids = self.add_requirements(&package, &version, reqs);
                self.registered.insert(key, ids.clone());
                ids
            }
        };
        let exact = Term::exact(version.clone());
        let conflicts = added.iter().any(|id| {
            let relation = self.store.get(*id).relation(|p| {
                if p == &package {
                    Some(&exact)
                } else {
                    self.solution.term(p)
                }
            });
            relation == IncompatRelation::Satisfied
        });
        if conflicts {
            tracing::debug!("Not deciding {package} {version}: its requirements conflict");
        } else {
            tracing::debug!(
                "Deciding {package} {version} at level {}",
                self.solution.level() + 1
            );
            self.solution.decide(package.clone(), version);
        }
        Ok(package)
    }

    /// Register `package@version`'s requirements as incompatibilities and
    /// start listing the packages they mention.
    fn add_requirements(
        &mut self,
        package: &Package,
        version: &Version,
        reqs: Vec<(Package, VersionSpecifier)>,
    ) -> Vec<IncompId> {
        let mut added = Vec::with_capacity(reqs.len());
        for (dependency, spec) in reqs {
            if &dependency == package {
                continue;
            }
            if let Some(name) = dependency.name() {
                self.cache.prefetch_list(name);
            }
            added.push(self.store.add(Incompatibility::from_dependency(
                package.clone(),
                version.clone(),
                dependency,
                spec,
            )));
        }
        added
    }

    /// Versions to try first for `package`.
    fn hints(&self, package: &Package, name: &PackageName) -> Vec<Version> {
        let mut hints = Vec::new();
        if let Package::Extra(..) = package {
            if let Some(version) = self.solution.decision(&Package::Base(name.clone())) {
                hints.push(version.clone());
            }
        }
        if let Some(lock) = self.lock {
            hints.extend(
                lock.locked_versions(self.environment, name)
                    .into_iter()
                    .map(|d| d.version),
            );
        }
        hints
    }
}
