//! Per-resolution cache of repository answers.
//!
//! Requests are spawned as tokio tasks as soon as the solver suspects it
//! will need them, bounded by a semaphore. The solver only awaits a result
//! when it has to decide with it. The cache is owned by one `resolve` call;
//! tasks still running when it is dropped are aborted.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use quarry_core::dependency::Dependency;
use quarry_core::environment::Environment;
use quarry_core::package::{PackageDescriptor, PackageName};
use quarry_core::version::Version;

use crate::error::RepositoryError;
use crate::repository::Repository;

type Fetched<T> = Result<T, RepositoryError>;

enum Slot<T> {
    Pending(JoinHandle<Fetched<T>>),
    Ready(Fetched<T>),
}

pub struct MetadataCache<R> {
    repository: Arc<R>,
    environment: Arc<Environment>,
    permits: Arc<Semaphore>,
    listings: HashMap<PackageName, Slot<Vec<Version>>>,
    metadata: HashMap<PackageDescriptor, Slot<Vec<Dependency>>>,
}

impl<R> MetadataCache<R>
where
    R: Repository + Send + Sync + 'static,
{
    /// `max_concurrent` is clamped to at least one request in flight.
    pub fn new(repository: Arc<R>, environment: Environment, max_concurrent: usize) -> Self {
        Self {
            repository,
            environment: Arc::new(environment),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            listings: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    /// Start listing `name` unless it was already requested.
    pub fn prefetch_list(&mut self, name: &PackageName) {
        if self.listings.contains_key(name) {
            return;
        }
        tracing::debug!("Prefetching versions of {name}");
        let repository = Arc::clone(&self.repository);
        let environment = Arc::clone(&self.environment);
        let owned = name.clone();
        let handle = spawn_limited(Arc::clone(&self.permits), async move {
            repository.list(&owned, &environment).await
        });
        self.listings.insert(name.clone(), Slot::Pending(handle));
    }

    /// Start fetching the requirements of `descriptor` unless it was already
    /// requested.
    pub fn prefetch_dependencies(&mut self, descriptor: &PackageDescriptor) {
        if self.metadata.contains_key(descriptor) {
            return;
        }
        tracing::debug!("Prefetching metadata of {descriptor}");
        let repository = Arc::clone(&self.repository);
        let environment = Arc::clone(&self.environment);
        let owned = descriptor.clone();
        let handle = spawn_limited(Arc::clone(&self.permits), async move {
            repository.dependencies(&owned, &environment).await
        });
        self.metadata.insert(descriptor.clone(), Slot::Pending(handle));
    }

    /// All known versions of `name`, waiting for the fetch if needed.
    pub async fn list(&mut self, name: &PackageName) -> Fetched<Vec<Version>> {
        self.prefetch_list(name);
        settle(&mut self.listings, name).await
    }

    /// Declared requirements of `descriptor`, waiting for the fetch if needed.
    pub async fn dependencies(&mut self, descriptor: &PackageDescriptor) -> Fetched<Vec<Dependency>> {
        self.prefetch_dependencies(descriptor);
        settle(&mut self.metadata, descriptor).await
    }

    /// Number of distinct descriptors whose metadata was requested.
    pub fn metadata_len(&self) -> usize {
        self.metadata.len()
    }
}

impl<R> Drop for MetadataCache<R> {
    fn drop(&mut self) {
        for slot in self.listings.values() {
            if let Slot::Pending(handle) = slot {
                handle.abort();
            }
        }
        for slot in self.metadata.values() {
            if let Slot::Pending(handle) = slot {
                handle.abort();
            }
        }
    }
}

fn spawn_limited<T, F>(permits: Arc<Semaphore>, fetch: F) -> JoinHandle<Fetched<T>>
where
    T: Send + 'static,
    F: Future<Output = Fetched<T>> + Send + 'static,
{
    tokio::spawn(async move {
        let _permit = permits
            .acquire_owned()
            .await
            .map_err(|e| RepositoryError::TaskFailed {
                message: e.to_string(),
            })?;
        fetch.await
    })
}

async fn settle<K, T>(slots: &mut HashMap<K, Slot<T>>, key: &K) -> Fetched<T>
where
    K: Eq + Hash,
    T: Clone,
{
    let Some(slot) = slots.get_mut(key) else {
        return Err(RepositoryError::TaskFailed {
            message: "request was never issued".to_string(),
        });
    };
    let result = match slot {
        Slot::Ready(result) => return result.clone(),
        Slot::Pending(handle) => match handle.await {
            Ok(result) => result,
            Err(e) => Err(RepositoryError::TaskFailed {
                message: e.to_string(),
            }),
        },
    };
    *slot = Slot::Ready(result.clone());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;

    #[tokio::test]
    async fn metadata_is_fetched_once_per_descriptor() {
        let mut repo = InMemoryRepository::new();
        repo.add("a", "1.0", &["b>=1"]).unwrap();
        let repo = Arc::new(repo);
        let mut cache = MetadataCache::new(Arc::clone(&repo), Environment::new(), 2);

        let descriptor = PackageDescriptor::new(
            PackageName::new("a").unwrap(),
            Version::release([1, 0]),
        );
        cache.prefetch_dependencies(&descriptor);
        let first = cache.dependencies(&descriptor).await.unwrap();
        let second = cache.dependencies(&descriptor).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(repo.metadata_requests(), 1);
        assert_eq!(cache.metadata_len(), 1);
    }

    #[tokio::test]
    async fn failures_are_cached_as_errors() {
        let mut repo = InMemoryRepository::new();
        repo.add_broken("a", "1.0").unwrap();
        let mut cache = MetadataCache::new(Arc::new(repo), Environment::new(), 1);

        let missing = PackageName::new("missing").unwrap();
        assert!(matches!(
            cache.list(&missing).await,
            Err(RepositoryError::NotFound { .. })
        ));

        let descriptor = PackageDescriptor::new(
            PackageName::new("a").unwrap(),
            Version::release([1, 0]),
        );
        assert!(matches!(
            cache.dependencies(&descriptor).await,
            Err(RepositoryError::Malformed { .. })
        ));
    }
}
