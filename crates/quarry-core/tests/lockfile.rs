use quarry_core::environment::Environment;
use quarry_core::lockfile::{
    load_or_empty, FileLockStore, InMemoryLockStore, LockStore, PackagesLock,
};
use quarry_core::package::{PackageDescriptor, PackageName};
use quarry_core::version::{parse_version, Version};
use quarry_util::errors::QuarryError;

fn name(s: &str) -> PackageName {
    PackageName::new(s).unwrap()
}

fn desc(n: &str, v: &str) -> PackageDescriptor {
    PackageDescriptor::new(name(n), parse_version(v))
}

fn darwin() -> Environment {
    Environment::new()
        .with("sys_platform", "darwin")
        .with("python_version", "3.11")
}

fn linux() -> Environment {
    Environment::new()
        .with("sys_platform", "linux")
        .with("python_version", "3.11")
}

#[test]
fn multi_environment_ordering() {
    let mut lock = PackagesLock::new();
    lock.update_lock(&linux(), &[desc("A", "1.5")]);
    lock.update_lock(&darwin(), &[desc("A", "2.0")]);

    assert_eq!(
        lock.locked_versions(&darwin(), &name("A")),
        vec![desc("A", "2.0"), desc("A", "1.5")]
    );
    assert_eq!(
        lock.locked_versions(&linux(), &name("A")),
        vec![desc("A", "1.5"), desc("A", "2.0")]
    );
}

#[test]
fn duplicates_across_environments_collapse() {
    let mut lock = PackagesLock::new();
    lock.update_lock(&linux(), &[desc("a", "1.0")]);
    lock.update_lock(&darwin(), &[desc("a", "1.0")]);
    assert_eq!(lock.locked_versions(&darwin(), &name("a")), vec![desc("a", "1.0")]);
}

#[test]
fn update_replaces_only_that_environment() {
    let mut lock = PackagesLock::new();
    lock.update_lock(&linux(), &[desc("a", "1.0"), desc("b", "1.0")]);
    lock.update_lock(&darwin(), &[desc("a", "1.1")]);
    lock.update_lock(&linux(), &[desc("a", "2.0")]);

    assert_eq!(
        lock.locked_versions(&linux(), &name("a")),
        vec![desc("a", "2.0"), desc("a", "1.1")]
    );
    assert!(lock.locked_versions(&linux(), &name("b")).is_empty());
}

#[test]
fn unlock_drops_every_environment() {
    let mut lock = PackagesLock::new();
    lock.update_lock(&linux(), &[desc("a", "1.0"), desc("b", "1.0")]);
    lock.update_lock(&darwin(), &[desc("a", "1.1")]);
    lock.unlock_packages([&name("a")]);
    assert!(lock.locked_versions(&darwin(), &name("a")).is_empty());
    assert_eq!(lock.locked_versions(&linux(), &name("b")), vec![desc("b", "1.0")]);
}

#[test]
fn unknown_package_has_no_hints() {
    let lock = PackagesLock::new();
    assert!(lock.locked_versions(&linux(), &name("missing")).is_empty());
}

#[test]
fn toml_round_trip_is_lossless() {
    let mut lock = PackagesLock::new();
    lock.update_lock(
        &linux(),
        &[desc("a", "1.0"), desc("b", "2.0rc1"), desc("c", "nightly")],
    );
    lock.update_lock(
        &darwin(),
        &[
            desc("a", "1.1"),
            desc("b", "2.0"),
            PackageDescriptor::new(name("d"), Version::Named("1.0".to_string())),
            PackageDescriptor::new(name("e"), Version::Url("file:///wheels/e.whl".to_string())),
        ],
    );

    let text = lock.to_toml_string().unwrap();
    assert!(text.contains("version = 1"));
    assert!(text.contains("[[package.entry]]"));
    assert!(text.contains("kind = \"named\""));
    let back = PackagesLock::from_toml_str(&text).unwrap();
    assert_eq!(back, lock);
    assert_eq!(
        back.locked_versions(&darwin(), &name("d")),
        vec![PackageDescriptor::new(name("d"), Version::Named("1.0".to_string()))]
    );
}

#[test]
fn rows_without_kind_use_the_version_grammar() {
    let text = r#"
version = 1

[[package]]
name = "a"

[[package.entry]]
environment = "linux"
version = "1.0"

[[package.entry]]
environment = "linux"
version = "nightly"
"#;
    let lock = PackagesLock::from_toml_str(text).unwrap();
    let versions: Vec<Version> = lock
        .entries()
        .flat_map(|(_, entries)| entries.iter().map(|e| e.descriptor.version.clone()))
        .collect();
    assert_eq!(
        versions,
        vec![parse_version("1.0"), Version::Named("nightly".to_string())]
    );
    assert!(versions[0].is_standard());
}

#[test]
fn file_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileLockStore::new(dir.path().join("nested").join("quarry.lock"));
    assert!(store.load().unwrap().is_none());

    let mut lock = PackagesLock::new();
    lock.update_lock(&darwin(), &[desc("a", "2.0")]);
    store.save(&lock).unwrap();
    assert!(store.path().is_file());
    assert_eq!(store.load().unwrap(), Some(lock));
}

#[test]
fn in_memory_store_round_trip() {
    let store = InMemoryLockStore::new();
    let mut lock = PackagesLock::new();
    lock.update_lock(&linux(), &[desc("a", "1.0")]);
    store.save(&lock).unwrap();
    assert!(store.content().unwrap().contains("name = \"a\""));
    assert_eq!(store.load().unwrap(), Some(lock));
}

#[test]
fn corrupt_lock_degrades_to_empty() {
    let store = InMemoryLockStore::with_content("this is [not toml");
    let (lock, warning) = load_or_empty(&store);
    assert!(lock.is_empty());
    assert!(matches!(warning, Some(QuarryError::LockFileCorrupt { .. })));
}

#[test]
fn future_format_version_is_corrupt() {
    let err = PackagesLock::from_toml_str("version = 99\n").unwrap_err();
    assert!(err.to_string().contains("unsupported lock format version 99"));
}

#[test]
fn missing_store_yields_empty_without_warning() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileLockStore::new(dir.path().join("absent.lock"));
    let (lock, warning) = load_or_empty(&store);
    assert!(lock.is_empty());
    assert!(warning.is_none());
}
