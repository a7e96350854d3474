//! In-memory repositories for tests
//!
//! [`MockRepositories`] holds the published content of any number of
//! repositories keyed by repository id. Clients created by its factory search
//! their repositories in order and materialize resolved artifacts under a
//! work directory. Supports:
//! - transient fetch failures that clear after a number of calls
//! - close failures for clients over a given repository
//! - counters for created clients, close calls and version listings

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use channel_model::{ArtifactCoordinate, Repository};
use url::Url;

use crate::client::{read_file_url, MetadataCoordinate, RepositoryClient, RepositoryClientFactory};
use crate::error::{RepositoryError, RepositoryResult};
use crate::retry::{BatchFailure, RetryHandler, RetryPolicy};

/// Failure configuration for one artifact
#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// Error message to report
    pub message: String,
    /// Number of calls to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    pub fn always(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fail_count: None,
        }
    }

    pub fn times(message: impl Into<String>, count: u32) -> Self {
        Self {
            message: message.into(),
            fail_count: Some(count),
        }
    }
}

/// Per-artifact failure injection
#[derive(Debug, Default)]
pub struct FailureInjector {
    configs: HashMap<String, FailureConfig>,
    call_counts: HashMap<String, u32>,
}

impl FailureInjector {
    pub fn inject(&mut self, artifact: impl Into<String>, config: FailureConfig) {
        let artifact = artifact.into();
        self.call_counts.insert(artifact.clone(), 0);
        self.configs.insert(artifact, config);
    }

    /// Returns the failure message if this call should fail
    pub fn check(&mut self, artifact: &str) -> Option<String> {
        let config = self.configs.get(artifact)?;
        let count = self.call_counts.entry(artifact.to_string()).or_insert(0);
        *count += 1;
        match config.fail_count {
            Some(limit) if *count > limit => None,
            _ => Some(config.message.clone()),
        }
    }
}

/// What happened to one created client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub repositories: Vec<String>,
    pub close_calls: u32,
}

#[derive(Debug, Default)]
struct MockState {
    artifacts: BTreeMap<String, BTreeMap<ArtifactCoordinate, Vec<u8>>>,
    metadata: BTreeMap<(String, String, String), (Option<String>, Option<String>)>,
    urls: BTreeMap<String, Vec<u8>>,
    failures: FailureInjector,
    failing_close: BTreeSet<String>,
    clients: Vec<ClientRecord>,
    version_queries: u32,
}

/// Shared content of the mock repositories
#[derive(Debug, Clone)]
pub struct MockRepositories {
    state: Arc<Mutex<MockState>>,
    workdir: PathBuf,
}

impl MockRepositories {
    /// Resolved artifacts are written under `workdir`
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            workdir: workdir.into(),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // a panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publish an artifact in a repository
    pub fn publish(&self, repository: &str, coordinate: ArtifactCoordinate, content: impl Into<Vec<u8>>) {
        self.state()
            .artifacts
            .entry(repository.to_string())
            .or_default()
            .insert(coordinate, content.into());
    }

    /// Serve `content` for a URL
    pub fn publish_url(&self, url: &str, content: impl Into<Vec<u8>>) {
        self.state().urls.insert(url.to_string(), content.into());
    }

    /// Set the `latest` and `release` metadata values
    pub fn set_metadata(
        &self,
        repository: &str,
        group_id: &str,
        artifact_id: &str,
        latest: Option<&str>,
        release: Option<&str>,
    ) {
        self.state().metadata.insert(
            (
                repository.to_string(),
                group_id.to_string(),
                artifact_id.to_string(),
            ),
            (latest.map(str::to_string), release.map(str::to_string)),
        );
    }

    /// Inject fetch failures for an artifact
    pub fn inject_failure(&self, coordinate: &ArtifactCoordinate, config: FailureConfig) {
        self.state().failures.inject(coordinate.to_string(), config);
    }

    /// Make `close` fail for clients that include this repository
    pub fn fail_close(&self, repository: &str) {
        self.state().failing_close.insert(repository.to_string());
    }

    /// Every client created so far
    pub fn clients(&self) -> Vec<ClientRecord> {
        self.state().clients.clone()
    }

    /// Number of `all_versions` calls across all clients
    pub fn version_queries(&self) -> u32 {
        self.state().version_queries
    }

    pub fn factory(&self, policy: RetryPolicy) -> MockRepositoryFactory {
        MockRepositoryFactory {
            repositories: self.clone(),
            policy,
        }
    }
}

/// Creates [`MockRepositoryClient`]s over shared [`MockRepositories`]
#[derive(Debug, Clone)]
pub struct MockRepositoryFactory {
    repositories: MockRepositories,
    policy: RetryPolicy,
}

impl RepositoryClientFactory for MockRepositoryFactory {
    fn create(&self, repositories: &[Repository]) -> RepositoryResult<Box<dyn RepositoryClient>> {
        let repository_ids: Vec<String> = repositories.iter().map(|r| r.id.clone()).collect();
        let index = {
            let mut state = self.repositories.state();
            state.clients.push(ClientRecord {
                repositories: repository_ids.clone(),
                close_calls: 0,
            });
            state.clients.len() - 1
        };
        Ok(Box::new(MockRepositoryClient {
            index,
            repository_ids,
            repositories: self.repositories.clone(),
            retry: RetryHandler::new(self.policy),
        }))
    }
}

/// Client over a subset of the mock repositories
pub struct MockRepositoryClient {
    index: usize,
    repository_ids: Vec<String>,
    repositories: MockRepositories,
    retry: RetryHandler,
}

impl MockRepositoryClient {
    fn fetch(&self, coordinate: &ArtifactCoordinate) -> Result<Option<PathBuf>, String> {
        let content = {
            let mut state = self.repositories.state();
            if let Some(message) = state.failures.check(&coordinate.to_string()) {
                return Err(message);
            }
            self.repository_ids.iter().find_map(|id| {
                state
                    .artifacts
                    .get(id)
                    .and_then(|a| a.get(coordinate))
                    .map(|bytes| (id.clone(), bytes.clone()))
            })
        };

        let Some((repository, bytes)) = content else {
            return Ok(None);
        };
        let path = self
            .repositories
            .workdir
            .join(repository)
            .join(coordinate.repository_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        fs::write(&path, bytes).map_err(|e| e.to_string())?;
        Ok(Some(path))
    }

    fn metadata_value(
        &self,
        group_id: &str,
        artifact_id: &str,
        pick: fn(&(Option<String>, Option<String>)) -> Option<String>,
    ) -> Option<String> {
        let state = self.repositories.state();
        self.repository_ids.iter().find_map(|id| {
            state
                .metadata
                .get(&(id.clone(), group_id.to_string(), artifact_id.to_string()))
                .and_then(pick)
        })
    }
}

impl RepositoryClient for MockRepositoryClient {
    fn all_versions(
        &self,
        group_id: &str,
        artifact_id: &str,
        extension: &str,
        classifier: &str,
    ) -> RepositoryResult<BTreeSet<String>> {
        let mut state = self.repositories.state();
        state.version_queries += 1;
        let versions = self
            .repository_ids
            .iter()
            .filter_map(|id| state.artifacts.get(id))
            .flat_map(|artifacts| artifacts.keys())
            .filter(|c| {
                c.group_id == group_id
                    && c.artifact_id == artifact_id
                    && c.extension == extension
                    && c.classifier == classifier
            })
            .map(|c| c.version.clone())
            .collect();
        Ok(versions)
    }

    fn resolve_artifact(&self, coordinate: &ArtifactCoordinate) -> RepositoryResult<PathBuf> {
        self.resolve_artifacts(std::slice::from_ref(coordinate))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RepositoryError::unresolved(coordinate.to_string(), self.repository_ids.clone())
            })
    }

    fn resolve_artifacts(
        &self,
        coordinates: &[ArtifactCoordinate],
    ) -> RepositoryResult<Vec<PathBuf>> {
        let found = self.retry.execute(|| {
            let mut files = Vec::with_capacity(coordinates.len());
            let mut failed = BTreeSet::new();
            let mut message = String::new();
            for coordinate in coordinates {
                match self.fetch(coordinate) {
                    Ok(file) => files.push(file),
                    Err(e) => {
                        failed.insert(coordinate.to_string());
                        message = e;
                    }
                }
            }
            if failed.is_empty() {
                Ok(files)
            } else {
                Err(BatchFailure {
                    failed,
                    repositories: self.repository_ids.iter().cloned().collect(),
                    message,
                })
            }
        })?;

        let missing: Vec<String> = coordinates
            .iter()
            .zip(&found)
            .filter(|(_, file)| file.is_none())
            .map(|(coordinate, _)| coordinate.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(RepositoryError::Unresolved {
                artifacts: missing,
                repositories: self.repository_ids.clone(),
            });
        }
        Ok(found.into_iter().flatten().collect())
    }

    fn resolve_metadata(&self, coordinates: &[MetadataCoordinate]) -> RepositoryResult<Vec<Url>> {
        coordinates
            .iter()
            .map(|coordinate| match coordinate {
                MetadataCoordinate::Maven(artifact) => {
                    let path = self.resolve_artifact(artifact)?;
                    Url::from_file_path(&path).map_err(|_| RepositoryError::UnsupportedUrl {
                        url: path.display().to_string(),
                    })
                }
                MetadataCoordinate::Url(url) => Ok(url.clone()),
            })
            .collect()
    }

    fn metadata_latest_version(
        &self,
        group_id: &str,
        artifact_id: &str,
    ) -> RepositoryResult<Option<String>> {
        Ok(self.metadata_value(group_id, artifact_id, |m| m.0.clone()))
    }

    fn metadata_release_version(
        &self,
        group_id: &str,
        artifact_id: &str,
    ) -> RepositoryResult<Option<String>> {
        Ok(self.metadata_value(group_id, artifact_id, |m| m.1.clone()))
    }

    fn read_url(&self, url: &Url) -> RepositoryResult<Vec<u8>> {
        let served = self.repositories.state().urls.get(url.as_str()).cloned();
        match served {
            Some(bytes) => Ok(bytes),
            None if url.scheme() == "file" => read_file_url(url),
            None => Err(RepositoryError::unresolved(url.to_string(), Vec::new())),
        }
    }

    fn close(&self) -> RepositoryResult<()> {
        let mut state = self.repositories.state();
        state.clients[self.index].close_calls += 1;
        if self
            .repository_ids
            .iter()
            .any(|id| state.failing_close.contains(id))
        {
            return Err(RepositoryError::Transfer {
                message: "injected close failure".to_string(),
                artifacts: Vec::new(),
                repositories: self.repository_ids.clone(),
            });
        }
        Ok(())
    }
}
