use miette::Diagnostic;
use thiserror::Error;

use quarry_util::errors::QuarryError;

use crate::report::DerivationReport;

/// Failure of a single repository request.
///
/// These are recovered inside the solver: the affected package or candidate
/// is treated as absent.
#[derive(Debug, Clone, Error, Diagnostic, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Package {package} not found")]
    NotFound { package: String },

    #[error("Malformed package source for {package}: {message}")]
    Malformed { package: String, message: String },

    /// The background fetch task panicked or was cancelled.
    #[error("Metadata fetch failed: {message}")]
    TaskFailed { message: String },
}

impl From<RepositoryError> for QuarryError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Malformed { package, message } => {
                QuarryError::MalformedPackageSource { package, message }
            }
            other => QuarryError::Generic {
                message: other.to_string(),
            },
        }
    }
}

/// Why a `resolve` call produced no solution.
#[derive(Debug, Error, Diagnostic)]
pub enum ResolutionError {
    /// The requirements are provably unsatisfiable.
    #[error("No versions satisfy the requirements:\n{report}")]
    #[diagnostic(
        code(quarry::resolve::no_versions),
        help("Relax one of the constraints named in the explanation above")
    )]
    NoVersionsSatisfy { report: DerivationReport },

    /// The solver reached a state it should never be in.
    #[error("Internal resolver error: {0}")]
    #[diagnostic(code(quarry::resolve::internal))]
    Internal(String),
}

impl ResolutionError {
    pub fn report(&self) -> Option<&DerivationReport> {
        match self {
            Self::NoVersionsSatisfy { report } => Some(report),
            Self::Internal(_) => None,
        }
    }
}
