//! Core data types for Quarry.
//!
//! Versions and version specifiers, package names and descriptors,
//! dependency and environment-marker grammars, target environments, the
//! multi-environment packages lock, and resolver configuration.
//!
//! This crate is intentionally free of async code and network I/O.

pub mod config;
pub mod dependency;
pub mod environment;
pub mod lockfile;
pub mod marker;
pub mod package;
pub mod specifier;
pub mod version;

pub use dependency::{parse_dependency, Dependency};
pub use environment::Environment;
pub use lockfile::PackagesLock;
pub use package::{PackageDescriptor, PackageName};
pub use specifier::{parse_specifier, VersionSpecifier};
pub use version::{parse_version, StandardVersion, Version};
