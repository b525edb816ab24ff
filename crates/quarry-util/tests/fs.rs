use quarry_util::fs::{ensure_dir, write_atomic};
use tempfile::TempDir;

#[test]
fn test_ensure_dir_creates_nested() {
    let tmp = TempDir::new().unwrap();
    let deep = tmp.path().join("x").join("y").join("z");
    assert!(!deep.exists());
    ensure_dir(&deep).unwrap();
    assert!(deep.is_dir());
}

#[test]
fn test_ensure_dir_idempotent() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("once");
    ensure_dir(&dir).unwrap();
    ensure_dir(&dir).unwrap();
    assert!(dir.is_dir());
}

#[test]
fn test_write_atomic_creates_file_and_parents() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("nested").join("quarry.lock");
    write_atomic(&path, b"version = 1\n").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "version = 1\n");
}

#[test]
fn test_write_atomic_replaces_existing() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("quarry.lock");
    std::fs::write(&path, "old").unwrap();
    write_atomic(&path, b"new").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    let leftovers = std::fs::read_dir(tmp.path()).unwrap().count();
    assert_eq!(leftovers, 1, "temp file should have been renamed away");
}
