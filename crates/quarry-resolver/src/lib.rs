//! Dependency resolution engine: PubGrub version solving over an async
//! repository, with background metadata prefetch, extras, environment
//! markers and lock-file hints.

pub mod cache;
pub mod error;
pub mod incompatibility;
pub mod partial_solution;
pub mod report;
pub mod repository;
pub mod solver;
pub mod term;

pub use error::{RepositoryError, ResolutionError};
pub use report::DerivationReport;
pub use repository::{Candidates, InMemoryRepository, Repository};
pub use solver::{resolve, Resolution};
