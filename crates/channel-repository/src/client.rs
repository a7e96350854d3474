//! Repository client trait
//!
//! Abstracts the artifact repositories for testability. Implementations:
//! - `LocalRepositoryClient`: Maven layout on the local filesystem
//! - `MockRepositoryClient`: in-memory repositories for tests

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use channel_model::{ArtifactCoordinate, Repository};
use url::Url;

use crate::error::{RepositoryError, RepositoryResult};

/// A channel document to fetch: a Maven artifact or a plain URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataCoordinate {
    Maven(ArtifactCoordinate),
    Url(Url),
}

impl fmt::Display for MetadataCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Maven(coordinate) => write!(f, "{}", coordinate),
            Self::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Client for a fixed, ordered set of repositories.
///
/// Handles are created per channel and released exactly once through
/// [`RepositoryClient::close`].
pub trait RepositoryClient: Send {
    /// All versions of an artifact available in any repository
    fn all_versions(
        &self,
        group_id: &str,
        artifact_id: &str,
        extension: &str,
        classifier: &str,
    ) -> RepositoryResult<BTreeSet<String>>;

    /// Fetch one artifact, returning the local file
    fn resolve_artifact(&self, coordinate: &ArtifactCoordinate) -> RepositoryResult<PathBuf>;

    /// Fetch a batch of artifacts, returning files in request order.
    ///
    /// Fails with every unresolved coordinate when any of them is missing.
    fn resolve_artifacts(&self, coordinates: &[ArtifactCoordinate])
        -> RepositoryResult<Vec<PathBuf>>;

    /// Locate channel documents, returning URLs in request order
    fn resolve_metadata(&self, coordinates: &[MetadataCoordinate]) -> RepositoryResult<Vec<Url>>;

    /// The `latest` value of the repository metadata
    fn metadata_latest_version(
        &self,
        group_id: &str,
        artifact_id: &str,
    ) -> RepositoryResult<Option<String>>;

    /// The `release` value of the repository metadata
    fn metadata_release_version(
        &self,
        group_id: &str,
        artifact_id: &str,
    ) -> RepositoryResult<Option<String>>;

    /// Read the content behind a URL returned by [`RepositoryClient::resolve_metadata`].
    ///
    /// A missing document is reported as [`RepositoryError::Unresolved`].
    fn read_url(&self, url: &Url) -> RepositoryResult<Vec<u8>> {
        read_file_url(url)
    }

    /// Whether resolved files are served from a local cache
    fn uses_local_cache(&self) -> bool {
        false
    }

    /// Release the handle
    fn close(&self) -> RepositoryResult<()>;
}

/// Creates clients for a repository list
pub trait RepositoryClientFactory: Send + Sync {
    fn create(&self, repositories: &[Repository]) -> RepositoryResult<Box<dyn RepositoryClient>>;
}

/// Read a `file:` URL, mapping a missing file to `Unresolved`.
pub fn read_file_url(url: &Url) -> RepositoryResult<Vec<u8>> {
    if url.scheme() != "file" {
        return Err(RepositoryError::UnsupportedUrl {
            url: url.to_string(),
        });
    }
    let path = url
        .to_file_path()
        .map_err(|_| RepositoryError::UnsupportedUrl {
            url: url.to_string(),
        })?;
    match fs::read(&path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(RepositoryError::unresolved(url.to_string(), Vec::new()))
        }
        Err(e) => Err(e.into()),
    }
}
