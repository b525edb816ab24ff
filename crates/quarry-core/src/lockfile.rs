use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use quarry_util::errors::QuarryError;
use quarry_util::fs::write_atomic;

use crate::environment::Environment;
use crate::package::{PackageDescriptor, PackageName};
use crate::version::{parse_version, Version};

/// Current on-disk format of `quarry.lock`.
pub const LOCK_FORMAT_VERSION: u32 = 1;

/// One locked resolution result, tagged with the environment it was
/// resolved for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEntry {
    pub fingerprint: String,
    pub descriptor: PackageDescriptor,
}

/// Prior resolutions for any number of environments, grouped by package.
///
/// Used as a hint source: a resolver prefers versions listed here, trying
/// the ones recorded for the current environment first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackagesLock {
    packages: BTreeMap<PackageName, Vec<LockEntry>>,
}

impl PackagesLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Locked candidates for `name`: entries recorded for `env` first, then
    /// those from other environments, each in recorded order and without
    /// repeats.
    pub fn locked_versions(&self, env: &Environment, name: &PackageName) -> Vec<PackageDescriptor> {
        let Some(entries) = self.packages.get(name) else {
            return Vec::new();
        };
        let fingerprint = env.fingerprint();
        let (same, other): (Vec<&LockEntry>, Vec<&LockEntry>) = entries
            .iter()
            .partition(|entry| entry.fingerprint == fingerprint);

        let mut seen = HashSet::new();
        same.into_iter()
            .chain(other)
            .filter(|entry| seen.insert(&entry.descriptor))
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    /// Replace every entry recorded for `env` with `descriptors`.
    ///
    /// Entries of other environments are untouched.
    pub fn update_lock(&mut self, env: &Environment, descriptors: &[PackageDescriptor]) {
        let fingerprint = env.fingerprint();
        for entries in self.packages.values_mut() {
            entries.retain(|entry| entry.fingerprint != fingerprint);
        }
        for descriptor in descriptors {
            self.packages
                .entry(descriptor.name.clone())
                .or_default()
                .push(LockEntry {
                    fingerprint: fingerprint.clone(),
                    descriptor: descriptor.clone(),
                });
        }
        self.packages.retain(|_, entries| !entries.is_empty());
        tracing::debug!(
            environment = %fingerprint,
            packages = descriptors.len(),
            "updated lock"
        );
    }

    /// Forget everything recorded for `names`, in every environment.
    pub fn unlock_packages<'a>(&mut self, names: impl IntoIterator<Item = &'a PackageName>) {
        for name in names {
            self.packages.remove(name);
        }
    }

    /// All entries, grouped by package name.
    pub fn entries(&self) -> impl Iterator<Item = (&PackageName, &[LockEntry])> {
        self.packages.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Serialize to the TOML lock document.
    pub fn to_toml_string(&self) -> Result<String, QuarryError> {
        let document = LockDocument {
            version: LOCK_FORMAT_VERSION,
            package: self
                .packages
                .iter()
                .map(|(name, entries)| LockedPackage {
                    name: name.clone(),
                    entry: entries
                        .iter()
                        .map(|e| LockedEntry::new(e.fingerprint.clone(), &e.descriptor.version))
                        .collect(),
                })
                .collect(),
        };
        toml::to_string_pretty(&document).map_err(|e| QuarryError::Generic {
            message: format!("Failed to serialize lock file: {e}"),
        })
    }

    /// Parse a TOML lock document.
    pub fn from_toml_str(content: &str) -> Result<Self, QuarryError> {
        let document: LockDocument =
            toml::from_str(content).map_err(|e| QuarryError::LockFileCorrupt {
                message: e.to_string(),
            })?;
        if document.version != LOCK_FORMAT_VERSION {
            return Err(QuarryError::LockFileCorrupt {
                message: format!("unsupported lock format version {}", document.version),
            });
        }
        let mut packages: BTreeMap<PackageName, Vec<LockEntry>> = BTreeMap::new();
        for locked in document.package {
            let group = packages.entry(locked.name.clone()).or_default();
            group.extend(locked.entry.into_iter().map(|row| {
                let version = row.version();
                LockEntry {
                    fingerprint: row.environment,
                    descriptor: PackageDescriptor::new(locked.name.clone(), version),
                }
            }));
        }
        packages.retain(|_, entries| !entries.is_empty());
        Ok(Self { packages })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockDocument {
    version: u32,
    #[serde(default)]
    package: Vec<LockedPackage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LockedPackage {
    name: PackageName,
    #[serde(default)]
    entry: Vec<LockedEntry>,
}

/// One lock row. `kind` is omitted for standard versions; rows without it
/// are parsed with the regular version grammar.
#[derive(Debug, Serialize, Deserialize)]
struct LockedEntry {
    environment: String,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<LockedKind>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LockedKind {
    Named,
    Url,
}

impl LockedEntry {
    fn new(environment: String, version: &Version) -> Self {
        let kind = match version {
            Version::Standard(_) => None,
            Version::Named(_) => Some(LockedKind::Named),
            Version::Url(_) => Some(LockedKind::Url),
        };
        Self {
            environment,
            version: version.to_string(),
            kind,
        }
    }

    fn version(&self) -> Version {
        match self.kind {
            Some(LockedKind::Named) => Version::Named(self.version.clone()),
            Some(LockedKind::Url) => Version::Url(self.version.clone()),
            None => parse_version(&self.version),
        }
    }
}

/// Persistence for a [`PackagesLock`].
pub trait LockStore {
    /// Read the stored lock; `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> Result<Option<PackagesLock>, QuarryError>;

    fn save(&self, lock: &PackagesLock) -> Result<(), QuarryError>;
}

/// A lock kept in a TOML file, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct FileLockStore {
    path: PathBuf,
}

impl FileLockStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LockStore for FileLockStore {
    fn load(&self) -> Result<Option<PackagesLock>, QuarryError> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        PackagesLock::from_toml_str(&content).map(Some)
    }

    fn save(&self, lock: &PackagesLock) -> Result<(), QuarryError> {
        let content = lock.to_toml_string()?;
        write_atomic(&self.path, content.as_bytes())?;
        tracing::debug!(path = %self.path.display(), "wrote lock file");
        Ok(())
    }
}

/// A lock kept in memory as its serialized document.
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    content: Mutex<Option<String>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-seeded with raw document text.
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: Mutex::new(Some(content.into())),
        }
    }

    pub fn content(&self) -> Option<String> {
        self.content.lock().ok().and_then(|guard| guard.clone())
    }
}

impl LockStore for InMemoryLockStore {
    fn load(&self) -> Result<Option<PackagesLock>, QuarryError> {
        match self.content() {
            Some(content) => PackagesLock::from_toml_str(&content).map(Some),
            None => Ok(None),
        }
    }

    fn save(&self, lock: &PackagesLock) -> Result<(), QuarryError> {
        let content = lock.to_toml_string()?;
        let mut guard = self.content.lock().map_err(|_| QuarryError::Generic {
            message: "lock store mutex poisoned".to_string(),
        })?;
        *guard = Some(content);
        Ok(())
    }
}

/// Load the stored lock, degrading to an empty one when it cannot be read.
///
/// The load error, if any, is returned alongside so callers can surface it
/// as a warning.
pub fn load_or_empty(store: &dyn LockStore) -> (PackagesLock, Option<QuarryError>) {
    match store.load() {
        Ok(lock) => (lock.unwrap_or_default(), None),
        Err(err) => {
            tracing::warn!(error = %err, "ignoring unreadable lock, resolving without hints");
            (PackagesLock::new(), Some(err))
        }
    }
}
