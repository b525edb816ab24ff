//! The repository contract and the glue between its answers and the solver.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use quarry_core::config::PrereleaseMode;
use quarry_core::dependency::{parse_dependency, Dependency};
use quarry_core::environment::Environment;
use quarry_core::package::{PackageDescriptor, PackageName};
use quarry_core::specifier::VersionSpecifier;
use quarry_core::version::{parse_version, Version};
use quarry_util::errors::ParseError;

use crate::error::RepositoryError;
use crate::term::Package;

/// Source of candidate versions and their declared requirements.
///
/// Both calls may be issued concurrently from background tasks, so the
/// returned futures must be `Send`.
pub trait Repository {
    /// Every version of `name` usable under `environment`, in any order.
    fn list(
        &self,
        name: &PackageName,
        environment: &Environment,
    ) -> impl Future<Output = Result<Vec<Version>, RepositoryError>> + Send;

    /// Requirements declared by one candidate, markers unevaluated.
    fn dependencies(
        &self,
        descriptor: &PackageDescriptor,
        environment: &Environment,
    ) -> impl Future<Output = Result<Vec<Dependency>, RepositoryError>> + Send;
}

#[derive(Debug, Clone, Default)]
struct Release {
    dependencies: Vec<Dependency>,
    broken: bool,
}

/// Map-backed repository for tests and embedders.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    packages: BTreeMap<PackageName, BTreeMap<Version, Release>>,
    metadata_requests: AtomicUsize,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name==version` with requirements given as dependency text.
    pub fn add(
        &mut self,
        name: &str,
        version: &str,
        dependencies: &[&str],
    ) -> Result<&mut Self, ParseError> {
        let name = PackageName::new(name)?;
        let dependencies = dependencies
            .iter()
            .map(|text| parse_dependency(text))
            .collect::<Result<Vec<_>, _>>()?;
        self.add_package(
            PackageDescriptor::new(name, parse_version(version)),
            dependencies,
        );
        Ok(self)
    }

    pub fn add_package(&mut self, descriptor: PackageDescriptor, dependencies: Vec<Dependency>) {
        self.packages.entry(descriptor.name).or_default().insert(
            descriptor.version,
            Release {
                dependencies,
                broken: false,
            },
        );
    }

    /// Register a candidate that is listed but whose metadata cannot be read.
    pub fn add_broken(&mut self, name: &str, version: &str) -> Result<&mut Self, ParseError> {
        let name = PackageName::new(name)?;
        self.packages.entry(name).or_default().insert(
            parse_version(version),
            Release {
                dependencies: Vec::new(),
                broken: true,
            },
        );
        Ok(self)
    }

    /// How many `dependencies` calls have been answered so far.
    pub fn metadata_requests(&self) -> usize {
        self.metadata_requests.load(Ordering::Relaxed)
    }
}

impl Repository for InMemoryRepository {
    async fn list(
        &self,
        name: &PackageName,
        _environment: &Environment,
    ) -> Result<Vec<Version>, RepositoryError> {
        self.packages
            .get(name)
            .map(|releases| releases.keys().cloned().collect())
            .ok_or_else(|| RepositoryError::NotFound {
                package: name.to_string(),
            })
    }

    async fn dependencies(
        &self,
        descriptor: &PackageDescriptor,
        _environment: &Environment,
    ) -> Result<Vec<Dependency>, RepositoryError> {
        self.metadata_requests.fetch_add(1, Ordering::Relaxed);
        let release = self
            .packages
            .get(&descriptor.name)
            .and_then(|releases| releases.get(&descriptor.version))
            .ok_or_else(|| RepositoryError::NotFound {
                package: descriptor.to_string(),
            })?;
        if release.broken {
            return Err(RepositoryError::Malformed {
                package: descriptor.to_string(),
                message: "metadata could not be read".to_string(),
            });
        }
        Ok(release.dependencies.clone())
    }
}

/// Candidates for one decision, highest priority first.
///
/// A listed standard version admitted only through a `===` pin on its text
/// becomes a named candidate carrying that text, so the decision satisfies
/// the pin. [`Candidates::listed`] maps it back for metadata requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidates {
    versions: Vec<Version>,
    listed_as: BTreeMap<Version, Version>,
}

impl Candidates {
    /// Versions from `listing` allowed by `specifier`, newest first, with
    /// pre-releases filtered according to `mode`.
    pub fn new(listing: &[Version], specifier: &VersionSpecifier, mode: PrereleaseMode) -> Self {
        let mut listed_as = BTreeMap::new();
        let mut versions: Vec<Version> = Vec::new();
        for listed in listing.iter().filter(|v| specifier.allows(v)) {
            if specifier.pins_text(listed) {
                let pinned = Version::Named(listed.to_string());
                listed_as.insert(pinned.clone(), listed.clone());
                versions.push(pinned);
            } else {
                versions.push(listed.clone());
            }
        }
        versions.sort_by(|a, b| b.cmp(a));
        versions.dedup();

        let keep_prereleases = match mode {
            PrereleaseMode::Allow => true,
            PrereleaseMode::Disallow => false,
            PrereleaseMode::IfNecessaryOrExplicit => {
                specifier.allows_prereleases() || versions.iter().all(Version::is_prerelease)
            }
        };
        if !keep_prereleases {
            versions.retain(|v| !v.is_prerelease());
        }
        Self {
            versions,
            listed_as,
        }
    }

    /// The repository's own spelling of `candidate`.
    pub fn listed<'a>(&'a self, candidate: &'a Version) -> &'a Version {
        self.listed_as.get(candidate).unwrap_or(candidate)
    }

    /// Move the versions in `preferred` to the front, in the order given.
    /// The remaining versions keep their order.
    pub fn prefer(&mut self, preferred: &[Version]) {
        let mut front = Vec::new();
        for version in preferred {
            if let Some(index) = self.versions.iter().position(|v| v == version) {
                front.push(self.versions.remove(index));
            }
        }
        front.append(&mut self.versions);
        self.versions = front;
    }

    pub fn first(&self) -> Option<&Version> {
        self.versions.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Version> {
        self.versions.iter()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn into_vec(self) -> Vec<Version> {
        self.versions
    }
}

/// Solver requirements of `package` at `version`, given its declared
/// `dependencies`.
///
/// Markers are evaluated against `environment`. An extra pseudo-package
/// requires its base at the same version plus the requirements that only
/// apply when that extra is requested. Requirements are not merged: each
/// declared dependency yields its own entries.
pub fn requirements(
    package: &Package,
    version: &Version,
    dependencies: &[Dependency],
    environment: &Environment,
) -> Vec<(Package, VersionSpecifier)> {
    let mut out = Vec::new();
    let extra = match package {
        Package::Root | Package::Base(_) => None,
        Package::Extra(name, extra) => {
            out.push((
                Package::Base(name.clone()),
                VersionSpecifier::version_match(version.clone()),
            ));
            Some(extra.as_str())
        }
    };
    for dep in dependencies {
        let applies = match extra {
            None => dep.applies_to(environment, None),
            Some(extra) => {
                dep.applies_to(environment, Some(extra)) && !dep.applies_to(environment, None)
            }
        };
        if !applies {
            continue;
        }
        out.push((Package::Base(dep.name.clone()), dep.specifier.clone()));
        for extra in &dep.extras {
            out.push((
                Package::Extra(dep.name.clone(), extra.clone()),
                dep.specifier.clone(),
            ));
        }
    }
    out
}
