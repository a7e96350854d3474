//! Version selection and artifact fetching over the channel graph

use std::collections::BTreeSet;
use std::path::PathBuf;

use channel_model::{
    compare_versions, latest_version, ArtifactCoordinate, NoStreamStrategy, Stream,
};
use tracing::{debug, trace};

use super::graph::{ChannelGraph, NodeId};
use crate::error::{ChannelError, ChannelResult};

/// What to resolve: an artifact without a version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRequest {
    pub group_id: String,
    pub artifact_id: String,
    pub extension: String,
    pub classifier: String,
    /// Returned by channels whose no-stream strategy is `original`
    pub base_version: Option<String>,
}

impl ArtifactRequest {
    /// A `jar` without classifier
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            extension: "jar".to_string(),
            classifier: String::new(),
            base_version: None,
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = classifier.into();
        self
    }

    pub fn with_base_version(mut self, version: impl Into<String>) -> Self {
        self.base_version = Some(version.into());
        self
    }

    pub fn coordinate(&self, version: &str) -> ArtifactCoordinate {
        ArtifactCoordinate::new(
            &self.group_id,
            &self.artifact_id,
            &self.extension,
            &self.classifier,
            version,
        )
    }

    pub fn label(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }
}

/// A version and the node that supplied it
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Selected {
    pub version: String,
    pub node: NodeId,
}

fn greater(candidate: &Selected, best: &Option<Selected>) -> bool {
    match best {
        Some(best) => compare_versions(&candidate.version, &best.version).is_gt(),
        None => true,
    }
}

impl ChannelGraph {
    /// Greatest version over the configured channels; ties go to the earlier channel.
    pub fn select_version(&self, request: &ArtifactRequest) -> ChannelResult<Option<Selected>> {
        let mut best = None;
        for id in (0..self.nodes.len()).filter(|&id| self.nodes[id].configured) {
            if let Some(found) = self.version_in(id, request)? {
                trace!(
                    artifact = %request.label(),
                    channel = %self.nodes[id].name(),
                    version = %found.version,
                    "channel candidate"
                );
                if greater(&found, &best) {
                    best = Some(found);
                }
            }
        }
        Ok(best)
    }

    /// Resolve a version within one node and the nodes it requires
    fn version_in(&self, id: NodeId, request: &ArtifactRequest) -> ChannelResult<Option<Selected>> {
        let node = &self.nodes[id];
        let stream = node
            .manifest
            .as_ref()
            .and_then(|m| m.find_stream(&request.group_id, &request.artifact_id));

        if let Some(stream) = stream {
            return Ok(self
                .match_stream(id, stream, request)?
                .map(|version| Selected { version, node: id }));
        }

        let mut best = None;
        for &required in &node.required {
            if let Some(found) = self.version_in(required, request)? {
                if greater(&found, &best) {
                    best = Some(found);
                }
            }
        }
        if best.is_some() {
            return Ok(best);
        }

        Ok(self
            .no_stream_version(id, request)?
            .map(|version| Selected { version, node: id }))
    }

    /// Versions of the artifact available to a node, blocklist removed
    fn available_versions(&self, id: NodeId, request: &ArtifactRequest) -> ChannelResult<BTreeSet<String>> {
        let mut versions = self.client(id)?.all_versions(
            &request.group_id,
            &request.artifact_id,
            &request.extension,
            &request.classifier,
        )?;
        if let Some(blocklist) = &self.nodes[id].blocklist {
            let blocked = blocklist.versions_for(&request.group_id, &request.artifact_id);
            if !blocked.is_empty() {
                debug!(
                    artifact = %request.label(),
                    blocked = ?blocked,
                    "removing blocklisted versions"
                );
                versions.retain(|v| !blocked.contains(v));
            }
        }
        Ok(versions)
    }

    fn match_stream(
        &self,
        id: NodeId,
        stream: &Stream,
        request: &ArtifactRequest,
    ) -> ChannelResult<Option<String>> {
        if let Some(version) = stream.fixed_version() {
            return Ok(Some(version.to_string()));
        }
        let candidates = self.available_versions(id, request)?;
        Ok(stream.select(&candidates))
    }

    fn no_stream_version(&self, id: NodeId, request: &ArtifactRequest) -> ChannelResult<Option<String>> {
        let node = &self.nodes[id];
        let strategy = node.definition.no_stream_strategy;
        trace!(artifact = %request.label(), channel = %node.name(), %strategy, "no stream");
        match strategy {
            NoStreamStrategy::Latest => {
                let versions = self.available_versions(id, request)?;
                Ok(latest_version(versions.iter().map(String::as_str)).map(str::to_string))
            }
            NoStreamStrategy::Original => Ok(request.base_version.clone()),
            NoStreamStrategy::MavenLatest => Ok(self
                .client(id)?
                .metadata_latest_version(&request.group_id, &request.artifact_id)?),
            NoStreamStrategy::MavenRelease => Ok(self
                .client(id)?
                .metadata_release_version(&request.group_id, &request.artifact_id)?),
            NoStreamStrategy::None => Ok(None),
        }
    }

    /// Fetch artifacts for a node: required nodes first, then its own client.
    ///
    /// A required node failing to supply an artifact, whether it is missing
    /// or the transfer gave up, is not an error.
    pub fn fetch_artifacts(&self, id: NodeId, coordinates: &[ArtifactCoordinate]) -> ChannelResult<Vec<PathBuf>> {
        let mut found: Vec<Option<PathBuf>> = vec![None; coordinates.len()];

        for &required in &self.nodes[id].required {
            for (slot, coordinate) in found.iter_mut().zip(coordinates) {
                if slot.is_some() {
                    continue;
                }
                match self.fetch_artifacts(required, std::slice::from_ref(coordinate)) {
                    Ok(mut files) => *slot = files.pop(),
                    Err(e) if e.is_unresolved() => {
                        debug!(
                            artifact = %coordinate,
                            channel = %self.nodes[required].name(),
                            error = %e,
                            "required channel did not supply artifact"
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let missing: Vec<ArtifactCoordinate> = coordinates
            .iter()
            .zip(&found)
            .filter(|(_, slot)| slot.is_none())
            .map(|(coordinate, _)| coordinate.clone())
            .collect();
        if !missing.is_empty() {
            let node = &self.nodes[id];
            let mut files = node
                .pipeline
                .resolve_artifacts(self.client(id)?, &missing)
                .map_err(|e| match e {
                    ChannelError::Repository(inner) if inner.is_unresolved() => ChannelError::Unresolved {
                        artifacts: missing.iter().map(|c| c.to_string()).collect(),
                        repositories: node.repository_ids(),
                    },
                    other => other,
                })?
                .into_iter();
            for slot in found.iter_mut().filter(|slot| slot.is_none()) {
                *slot = files.next();
            }
        }

        found
            .into_iter()
            .zip(coordinates)
            .map(|(slot, coordinate)| {
                slot.ok_or_else(|| ChannelError::Unresolved {
                    artifacts: vec![coordinate.to_string()],
                    repositories: self.nodes[id].repository_ids(),
                })
            })
            .collect()
    }
}
