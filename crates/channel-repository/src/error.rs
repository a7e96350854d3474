//! Repository error types

use std::io;

use thiserror::Error;

/// Errors from repository operations
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// One or more artifacts are not available in any of the repositories
    #[error("unable to resolve {artifacts:?} in repositories {repositories:?}")]
    Unresolved {
        artifacts: Vec<String>,
        repositories: Vec<String>,
    },

    /// A transfer failed and will not be retried any further
    #[error("transfer failed for {artifacts:?} in repositories {repositories:?}: {message}")]
    Transfer {
        message: String,
        artifacts: Vec<String>,
        repositories: Vec<String>,
    },

    /// Waiting for a retry was interrupted
    #[error("interrupted while retrying {artifacts:?}")]
    Interrupted { artifacts: Vec<String> },

    #[error("unsupported URL: {url}")]
    UnsupportedUrl { url: String },

    #[error("invalid repository metadata at {location}: {reason}")]
    InvalidMetadata { location: String, reason: String },

    #[error("repository client is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RepositoryError {
    /// Build an unresolved error for a single artifact
    pub fn unresolved(artifact: impl Into<String>, repositories: Vec<String>) -> Self {
        Self::Unresolved {
            artifacts: vec![artifact.into()],
            repositories,
        }
    }

    /// Whether the artifact was simply not found (as opposed to a failure)
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved { .. })
    }
}

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;
