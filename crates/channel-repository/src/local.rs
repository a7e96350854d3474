//! Maven-layout repositories on the local filesystem
//!
//! Repositories are `file:` URLs or plain paths. Artifacts live at
//! `<root>/<group path>/<artifactId>/<version>/<artifactId>-<version>[-<classifier>].<ext>`
//! and `maven-metadata.xml` next to the version directories provides the
//! `latest` and `release` values. Other URL schemes are skipped.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use channel_model::{compare_versions, ArtifactCoordinate, Repository};
use regex_lite::Regex;
use tracing::{debug, warn};
use url::Url;

use crate::client::{MetadataCoordinate, RepositoryClient, RepositoryClientFactory};
use crate::error::{RepositoryError, RepositoryResult};
use crate::retry::{BatchFailure, RetryHandler, RetryPolicy, ThreadSleeper};

const METADATA_FILE: &str = "maven-metadata.xml";

/// Client over local Maven-layout repositories
pub struct LocalRepositoryClient {
    repositories: Vec<Repository>,
    roots: Vec<PathBuf>,
    local_cache: Option<PathBuf>,
    retry: RetryHandler,
    closed: AtomicBool,
}

impl LocalRepositoryClient {
    pub fn new(repositories: &[Repository], retry: RetryHandler) -> Self {
        let roots = repositories
            .iter()
            .filter_map(|repo| match repository_root(&repo.url) {
                Some(root) => Some(root),
                None => {
                    warn!(
                        id = %repo.id,
                        url = %repo.url,
                        "skipping repository that is not on the local filesystem"
                    );
                    None
                }
            })
            .collect();

        Self {
            repositories: repositories.to_vec(),
            roots,
            local_cache: None,
            retry,
            closed: AtomicBool::new(false),
        }
    }

    /// Copy resolved artifacts into `cache` and serve them from there
    pub fn with_local_cache(mut self, cache: PathBuf) -> Self {
        self.local_cache = Some(cache);
        self
    }

    fn repository_names(&self) -> Vec<String> {
        self.repositories.iter().map(|r| r.to_string()).collect()
    }

    fn ensure_open(&self) -> RepositoryResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(RepositoryError::Closed)
        } else {
            Ok(())
        }
    }

    /// Locate one artifact. `Ok(None)` means it is not in any repository.
    fn fetch(&self, coordinate: &ArtifactCoordinate) -> io::Result<Option<PathBuf>> {
        let relative = coordinate.repository_path();

        if let Some(cache) = &self.local_cache {
            let cached = cache.join(&relative);
            if cached.is_file() {
                return Ok(Some(cached));
            }
        }

        let Some(found) = self
            .roots
            .iter()
            .map(|root| root.join(&relative))
            .find(|path| path.is_file())
        else {
            return Ok(None);
        };

        match &self.local_cache {
            Some(cache) => {
                let cached = cache.join(&relative);
                if let Some(parent) = cached.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(&found, &cached)?;
                debug!(artifact = %coordinate, path = %cached.display(), "cached artifact");
                Ok(Some(cached))
            }
            None => Ok(Some(found)),
        }
    }

    fn read_metadata_value(
        &self,
        group_id: &str,
        artifact_id: &str,
        element: &Regex,
    ) -> RepositoryResult<Option<String>> {
        self.ensure_open()?;

        let mut best: Option<String> = None;
        for root in &self.roots {
            let path = artifact_dir(root, group_id, artifact_id).join(METADATA_FILE);
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !content.contains("<metadata") {
                return Err(RepositoryError::InvalidMetadata {
                    location: path.display().to_string(),
                    reason: "no <metadata> element".to_string(),
                });
            }
            let value = element
                .captures(&content)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string());
            if let Some(value) = value {
                let newer = match &best {
                    Some(current) => compare_versions(&value, current).is_gt(),
                    None => true,
                };
                if newer {
                    best = Some(value);
                }
            }
        }
        Ok(best)
    }
}

impl RepositoryClient for LocalRepositoryClient {
    fn all_versions(
        &self,
        group_id: &str,
        artifact_id: &str,
        extension: &str,
        classifier: &str,
    ) -> RepositoryResult<BTreeSet<String>> {
        self.ensure_open()?;

        let mut versions = BTreeSet::new();
        for root in &self.roots {
            let dir = artifact_dir(root, group_id, artifact_id);
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            for entry in entries {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                let version = entry.file_name().to_string_lossy().to_string();
                let coordinate =
                    ArtifactCoordinate::new(group_id, artifact_id, extension, classifier, &version);
                if root.join(coordinate.repository_path()).is_file() {
                    versions.insert(version);
                }
            }
        }
        Ok(versions)
    }

    fn resolve_artifact(&self, coordinate: &ArtifactCoordinate) -> RepositoryResult<PathBuf> {
        self.resolve_artifacts(std::slice::from_ref(coordinate))?
            .into_iter()
            .next()
            .ok_or_else(|| RepositoryError::unresolved(coordinate.to_string(), self.repository_names()))
    }

    fn resolve_artifacts(
        &self,
        coordinates: &[ArtifactCoordinate],
    ) -> RepositoryResult<Vec<PathBuf>> {
        self.ensure_open()?;

        let found = self.retry.execute(|| {
            let mut files = Vec::with_capacity(coordinates.len());
            let mut failed = BTreeSet::new();
            let mut message = String::new();
            for coordinate in coordinates {
                match self.fetch(coordinate) {
                    Ok(file) => files.push(file),
                    Err(e) => {
                        failed.insert(coordinate.to_string());
                        message = e.to_string();
                    }
                }
            }
            if failed.is_empty() {
                Ok(files)
            } else {
                Err(BatchFailure {
                    failed,
                    repositories: self.repository_names().into_iter().collect(),
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
                repositories: self.repository_names(),
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
        static LATEST: OnceLock<Regex> = OnceLock::new();
        let element = LATEST.get_or_init(|| metadata_element("latest"));
        self.read_metadata_value(group_id, artifact_id, element)
    }

    fn metadata_release_version(
        &self,
        group_id: &str,
        artifact_id: &str,
    ) -> RepositoryResult<Option<String>> {
        static RELEASE: OnceLock<Regex> = OnceLock::new();
        let element = RELEASE.get_or_init(|| metadata_element("release"));
        self.read_metadata_value(group_id, artifact_id, element)
    }

    fn uses_local_cache(&self) -> bool {
        self.local_cache.is_some()
    }

    fn close(&self) -> RepositoryResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Creates [`LocalRepositoryClient`]s sharing one retry policy
#[derive(Debug, Clone, Default)]
pub struct LocalRepositoryFactory {
    policy: RetryPolicy,
    local_cache: Option<PathBuf>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl LocalRepositoryFactory {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            local_cache: None,
            interrupt: None,
        }
    }

    pub fn with_local_cache(mut self, cache: PathBuf) -> Self {
        self.local_cache = Some(cache);
        self
    }

    /// Abort retry pauses when `flag` is set
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }
}

impl RepositoryClientFactory for LocalRepositoryFactory {
    fn create(&self, repositories: &[Repository]) -> RepositoryResult<Box<dyn RepositoryClient>> {
        let sleeper = match &self.interrupt {
            Some(flag) => ThreadSleeper::with_interrupt(flag.clone()),
            None => ThreadSleeper::new(),
        };
        let retry = RetryHandler::with_sleeper(self.policy, Box::new(sleeper));
        let mut client = LocalRepositoryClient::new(repositories, retry);
        if let Some(cache) = &self.local_cache {
            client = client.with_local_cache(cache.clone());
        }
        Ok(Box::new(client))
    }
}

fn repository_root(url: &str) -> Option<PathBuf> {
    if url.starts_with("file:") {
        Url::parse(url).ok()?.to_file_path().ok()
    } else if url.contains("://") {
        None
    } else {
        Some(PathBuf::from(url))
    }
}

fn artifact_dir(root: &Path, group_id: &str, artifact_id: &str) -> PathBuf {
    root.join(group_id.replace('.', "/")).join(artifact_id)
}

fn metadata_element(name: &str) -> Regex {
    Regex::new(&format!(r"<{name}>\s*([^<]+?)\s*</{name}>")).expect("static metadata pattern")
}
