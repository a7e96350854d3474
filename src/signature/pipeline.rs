//! Resolution pipeline
//!
//! A fetch runs through an ordered list of stages. The plain pipeline only
//! fetches; channels that require signatures add a verify stage that fetches
//! the detached signature of every item and hands both to the validator.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use channel_model::ArtifactCoordinate;
use channel_repository::{MetadataCoordinate, RepositoryClient, RepositoryError};
use tracing::debug;
use url::Url;

use super::validator::{SignatureResult, SignatureValidator};
use crate::error::{ChannelError, ChannelResult};

/// Something to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    Artifact(ArtifactCoordinate),
    Metadata(MetadataCoordinate),
}

impl fmt::Display for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Artifact(coordinate) => write!(f, "{}", coordinate),
            Self::Metadata(coordinate) => write!(f, "{}", coordinate),
        }
    }
}

/// Where a fetched item can be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    Url(Url),
}

/// A request together with its location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub request: FetchRequest,
    pub location: Location,
}

impl Fetched {
    pub fn read(&self, client: &dyn RepositoryClient) -> ChannelResult<Vec<u8>> {
        match &self.location {
            Location::File(path) => Ok(fs::read(path)?),
            Location::Url(url) => Ok(client.read_url(url)?),
        }
    }
}

/// One step of the pipeline
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(
        &self,
        client: &dyn RepositoryClient,
        requests: &[FetchRequest],
        fetched: Vec<Fetched>,
    ) -> ChannelResult<Vec<Fetched>>;
}

/// Locates every request through the repository client
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchStage;

impl Stage for FetchStage {
    fn name(&self) -> &'static str {
        "fetch"
    }

    fn run(
        &self,
        client: &dyn RepositoryClient,
        requests: &[FetchRequest],
        _fetched: Vec<Fetched>,
    ) -> ChannelResult<Vec<Fetched>> {
        let mut artifacts = Vec::new();
        let mut metadata = Vec::new();
        for request in requests {
            match request {
                FetchRequest::Artifact(coordinate) => artifacts.push(coordinate.clone()),
                FetchRequest::Metadata(coordinate) => metadata.push(coordinate.clone()),
            }
        }

        let mut files = if artifacts.is_empty() {
            Vec::new()
        } else {
            client.resolve_artifacts(&artifacts)?
        }
        .into_iter();
        let mut urls = if metadata.is_empty() {
            Vec::new()
        } else {
            client.resolve_metadata(&metadata)?
        }
        .into_iter();

        requests
            .iter()
            .map(|request| {
                let location = match request {
                    FetchRequest::Artifact(_) => files.next().map(Location::File),
                    FetchRequest::Metadata(_) => urls.next().map(Location::Url),
                };
                location
                    .map(|location| Fetched {
                        request: request.clone(),
                        location,
                    })
                    .ok_or_else(|| ChannelError::Unresolved {
                        artifacts: vec![request.to_string()],
                        repositories: Vec::new(),
                    })
            })
            .collect()
    }
}

/// Checks the detached signature of every fetched item
pub struct VerifyStage {
    validator: Arc<dyn SignatureValidator>,
    key_urls: Vec<String>,
}

impl VerifyStage {
    pub fn new(validator: Arc<dyn SignatureValidator>, key_urls: Vec<String>) -> Self {
        Self {
            validator,
            key_urls,
        }
    }

    fn signature(
        &self,
        client: &dyn RepositoryClient,
        request: &FetchRequest,
    ) -> Result<Vec<u8>, RepositoryError> {
        match request {
            FetchRequest::Artifact(coordinate) => {
                let path = client.resolve_artifact(&coordinate.signature())?;
                Ok(fs::read(path)?)
            }
            FetchRequest::Metadata(MetadataCoordinate::Maven(coordinate)) => {
                let signature = MetadataCoordinate::Maven(coordinate.signature());
                let url = client
                    .resolve_metadata(std::slice::from_ref(&signature))?
                    .into_iter()
                    .next()
                    .ok_or_else(|| RepositoryError::unresolved(signature.to_string(), Vec::new()))?;
                client.read_url(&url)
            }
            FetchRequest::Metadata(MetadataCoordinate::Url(url)) => {
                let mut signature = url.clone();
                signature.set_path(&format!("{}.asc", url.path()));
                client.read_url(&signature)
            }
        }
    }

    fn verify(&self, client: &dyn RepositoryClient, item: &Fetched) -> ChannelResult<()> {
        let identifier = item.request.to_string();
        let signature = match self.signature(client, &item.request) {
            Ok(bytes) => bytes,
            Err(e) if e.is_unresolved() => {
                return Err(ChannelError::Trust {
                    artifact: identifier,
                    result: SignatureResult::NoSignature,
                })
            }
            Err(e) => return Err(e.into()),
        };
        let content = item.read(client)?;

        let result = self
            .validator
            .validate(&identifier, &content, &signature, &self.key_urls)?;
        if result.is_ok() {
            debug!(artifact = %identifier, %result, "signature accepted");
            Ok(())
        } else {
            Err(ChannelError::Trust {
                artifact: identifier,
                result,
            })
        }
    }
}

impl Stage for VerifyStage {
    fn name(&self) -> &'static str {
        "verify"
    }

    fn run(
        &self,
        client: &dyn RepositoryClient,
        _requests: &[FetchRequest],
        fetched: Vec<Fetched>,
    ) -> ChannelResult<Vec<Fetched>> {
        for item in &fetched {
            self.verify(client, item)?;
        }
        Ok(fetched)
    }
}

/// Ordered list of stages applied to every fetch
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Fetch only
    pub fn new() -> Self {
        Self {
            stages: vec![Box::new(FetchStage)],
        }
    }

    /// Fetch, then verify signatures
    pub fn verified(validator: Arc<dyn SignatureValidator>, key_urls: Vec<String>) -> Self {
        Self::new().with_stage(Box::new(VerifyStage::new(validator, key_urls)))
    }

    pub fn with_stage(mut self, stage: Box<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn run(
        &self,
        client: &dyn RepositoryClient,
        requests: &[FetchRequest],
    ) -> ChannelResult<Vec<Fetched>> {
        self.stages
            .iter()
            .try_fold(Vec::new(), |fetched, stage| stage.run(client, requests, fetched))
    }

    pub fn resolve_artifacts(
        &self,
        client: &dyn RepositoryClient,
        coordinates: &[ArtifactCoordinate],
    ) -> ChannelResult<Vec<PathBuf>> {
        let requests: Vec<FetchRequest> = coordinates
            .iter()
            .cloned()
            .map(FetchRequest::Artifact)
            .collect();
        self.run(client, &requests)?
            .into_iter()
            .map(|item| match item.location {
                Location::File(path) => Ok(path),
                Location::Url(url) => Err(ChannelError::InvalidReference {
                    reference: url.to_string(),
                    reason: "expected a local file".to_string(),
                }),
            })
            .collect()
    }

    pub fn resolve_artifact(
        &self,
        client: &dyn RepositoryClient,
        coordinate: &ArtifactCoordinate,
    ) -> ChannelResult<PathBuf> {
        self.resolve_artifacts(client, std::slice::from_ref(coordinate))?
            .into_iter()
            .next()
            .ok_or_else(|| ChannelError::Unresolved {
                artifacts: vec![coordinate.to_string()],
                repositories: Vec::new(),
            })
    }

    /// Locate and read a channel document
    pub fn read_metadata(
        &self,
        client: &dyn RepositoryClient,
        coordinate: MetadataCoordinate,
    ) -> ChannelResult<(Url, Vec<u8>)> {
        let request = FetchRequest::Metadata(coordinate);
        let item = self
            .run(client, std::slice::from_ref(&request))?
            .into_iter()
            .next()
            .ok_or_else(|| ChannelError::Unresolved {
                artifacts: vec![request.to_string()],
                repositories: Vec::new(),
            })?;
        let content = item.read(client)?;
        match item.location {
            Location::Url(url) => Ok((url, content)),
            Location::File(path) => Err(ChannelError::InvalidReference {
                reference: path.display().to_string(),
                reason: "expected a URL".to_string(),
            }),
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
