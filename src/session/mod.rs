//! Channel sessions
//!
//! A session is built from channel definitions and a repository client
//! factory. Construction initializes every configured channel, resolving
//! required manifests and rejecting cycles and duplicate manifest ids, so
//! a malformed configuration fails before the first query.
//!
//! Queries pick the greatest version any configured channel allows and
//! fetch the file through the channel that supplied it. Every fetched
//! artifact is recorded so the session can be exported as pinned channels.

mod graph;
mod recorder;
mod resolve;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use channel_model::{ArtifactCoordinate, ChannelDefinition, Repository};
use channel_repository::{RepositoryClient, RepositoryClientFactory};
use tracing::{debug, info};

use crate::error::{ChannelError, ChannelResult};
use crate::signature::{Pipeline, SignatureValidator};

pub use graph::{ManifestRecord, NodeStatus};
pub use recorder::{write_recording, RecordedChannel, Recorder};
pub use resolve::ArtifactRequest;

use graph::{ChannelGraph, NodeId};
use resolve::Selected;

/// A resolved version and the channel it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionResult {
    pub version: String,
    pub channel: String,
}

/// A fetched artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub coordinate: ArtifactCoordinate,
    pub file: PathBuf,
    /// `None` for direct resolution
    pub channel: Option<String>,
}

/// Resolution of exact coordinates over every configured repository
struct DirectResolver {
    repositories: Vec<Repository>,
    client: Box<dyn RepositoryClient>,
    pipeline: Pipeline,
}

/// Resolves versions and artifacts through a set of channels
pub struct ChannelSession {
    graph: ChannelGraph,
    recorder: Recorder,
    direct: Option<DirectResolver>,
    closed: bool,
}

impl ChannelSession {
    /// Build a session, initializing every channel.
    ///
    /// Clients opened before a failure are closed again.
    pub fn new(
        definitions: Vec<ChannelDefinition>,
        factory: Arc<dyn RepositoryClientFactory>,
        validator: Option<Arc<dyn SignatureValidator>>,
    ) -> ChannelResult<Self> {
        let mut graph = ChannelGraph::new(factory, validator);
        match Self::build(&mut graph, definitions) {
            Ok(()) => Ok(Self {
                graph,
                recorder: Recorder::new(),
                direct: None,
                closed: false,
            }),
            Err(e) => {
                if let Err(close_error) = graph.teardown() {
                    debug!(error = %close_error, "failed to close clients after construction error");
                }
                Err(e)
            }
        }
    }

    fn build(graph: &mut ChannelGraph, definitions: Vec<ChannelDefinition>) -> ChannelResult<()> {
        let count = definitions.len();
        for definition in definitions {
            graph.add_node(definition, true)?;
        }
        for id in 0..count {
            graph.initialize(id)?;
        }
        graph.check_duplicate_ids()?;
        info!(
            channels = count,
            nodes = graph.nodes.len(),
            "channel session ready"
        );
        Ok(())
    }

    fn ensure_open(&self) -> ChannelResult<()> {
        if self.closed {
            Err(ChannelError::Closed)
        } else {
            Ok(())
        }
    }

    fn version_result(&self, selected: &Selected) -> VersionResult {
        VersionResult {
            version: selected.version.clone(),
            channel: self.graph.nodes[selected.node].name(),
        }
    }

    /// Greatest version any channel allows, or `None`
    pub fn resolve_version(&self, request: &ArtifactRequest) -> ChannelResult<Option<VersionResult>> {
        self.ensure_open()?;
        let selected = self.graph.select_version(request)?;
        Ok(selected.map(|s| self.version_result(&s)))
    }

    /// Like [`ChannelSession::resolve_version`], failing when no channel has a version
    pub fn find_latest_version(&self, request: &ArtifactRequest) -> ChannelResult<VersionResult> {
        self.resolve_version(request)?
            .ok_or_else(|| self.unresolved(vec![request.label()]))
    }

    fn unresolved(&self, artifacts: Vec<String>) -> ChannelError {
        let repositories: BTreeSet<String> = self
            .graph
            .nodes
            .iter()
            .flat_map(|n| n.repository_ids())
            .collect();
        ChannelError::Unresolved {
            artifacts,
            repositories: repositories.into_iter().collect(),
        }
    }

    fn record(&mut self, node: NodeId, coordinate: &ArtifactCoordinate) {
        let node = &self.graph.nodes[node];
        let local_cache = node
            .client
            .as_ref()
            .is_some_and(|client| client.uses_local_cache());
        self.recorder.record(
            &node.definition.repositories,
            local_cache,
            &coordinate.group_id,
            &coordinate.artifact_id,
            &coordinate.version,
        );
    }

    /// Resolve the version of an artifact and fetch it
    pub fn resolve_artifact(&mut self, request: &ArtifactRequest) -> ChannelResult<ResolvedArtifact> {
        self.resolve_artifacts(std::slice::from_ref(request))?
            .pop()
            .ok_or_else(|| self.unresolved(vec![request.label()]))
    }

    /// Resolve and fetch a batch, fetching per supplying channel.
    ///
    /// Every request is attempted; missing artifacts are reported together.
    pub fn resolve_artifacts(&mut self, requests: &[ArtifactRequest]) -> ChannelResult<Vec<ResolvedArtifact>> {
        self.ensure_open()?;

        let mut missing = Vec::new();
        let mut batches: Vec<(NodeId, Vec<(usize, ArtifactCoordinate)>)> = Vec::new();
        for (index, request) in requests.iter().enumerate() {
            match self.graph.select_version(request)? {
                Some(selected) => {
                    let coordinate = request.coordinate(&selected.version);
                    match batches.iter_mut().find(|(node, _)| *node == selected.node) {
                        Some((_, batch)) => batch.push((index, coordinate)),
                        None => batches.push((selected.node, vec![(index, coordinate)])),
                    }
                }
                None => missing.push(request.label()),
            }
        }

        let mut resolved: Vec<Option<ResolvedArtifact>> = vec![None; requests.len()];
        let mut failures = Vec::new();
        for (node, batch) in batches {
            let coordinates: Vec<ArtifactCoordinate> = batch.iter().map(|(_, c)| c.clone()).collect();
            match self.graph.fetch_artifacts(node, &coordinates) {
                Ok(files) => {
                    let channel = self.graph.nodes[node].name();
                    for ((index, coordinate), file) in batch.into_iter().zip(files) {
                        self.record(node, &coordinate);
                        debug!(artifact = %coordinate, channel = %channel, "resolved artifact");
                        resolved[index] = Some(ResolvedArtifact {
                            coordinate,
                            file,
                            channel: Some(channel.clone()),
                        });
                    }
                }
                Err(e) if e.is_unresolved() => failures.push(e),
                Err(e) => return Err(e),
            }
        }

        // a single failed fetch keeps its own family
        if missing.is_empty() && failures.len() == 1 {
            if let Some(failure) = failures.pop() {
                return Err(failure);
            }
        }

        let mut repositories = BTreeSet::new();
        for failure in failures {
            let (artifacts, tried) = failure.into_unresolved_parts()?;
            missing.extend(artifacts);
            repositories.extend(tried);
        }
        if !missing.is_empty() {
            if repositories.is_empty() {
                return Err(self.unresolved(missing));
            }
            return Err(ChannelError::Unresolved {
                artifacts: missing,
                repositories: repositories.into_iter().collect(),
            });
        }
        Ok(resolved.into_iter().flatten().collect())
    }

    fn direct_resolver(&mut self) -> ChannelResult<&DirectResolver> {
        if self.direct.is_none() {
            let mut repositories: Vec<Repository> = Vec::new();
            let mut require_signature = false;
            let mut key_urls: Vec<String> = Vec::new();
            for node in self.graph.nodes.iter().filter(|n| n.configured) {
                for repository in &node.definition.repositories {
                    if !repositories.contains(repository) {
                        repositories.push(repository.clone());
                    }
                }
                require_signature |= node.definition.require_signature;
                for url in &node.definition.key_urls {
                    if !key_urls.contains(url) {
                        key_urls.push(url.clone());
                    }
                }
            }

            let pipeline = if require_signature {
                let combined = ChannelDefinition::new()
                    .with_name("direct")
                    .with_signature_check(key_urls);
                self.graph.pipeline_for(&combined)?
            } else {
                Pipeline::new()
            };
            let client = self.graph.factory().create(&repositories)?;
            self.direct = Some(DirectResolver {
                repositories,
                client,
                pipeline,
            });
        }
        self.direct.as_ref().ok_or(ChannelError::Closed)
    }

    /// Fetch exact coordinates from every configured repository, bypassing streams
    pub fn resolve_direct_artifacts(
        &mut self,
        coordinates: &[ArtifactCoordinate],
    ) -> ChannelResult<Vec<ResolvedArtifact>> {
        self.ensure_open()?;
        let direct = self.direct_resolver()?;
        let files = direct
            .pipeline
            .resolve_artifacts(direct.client.as_ref(), coordinates)?;
        let repositories = direct.repositories.clone();
        let local_cache = direct.client.uses_local_cache();

        let mut resolved = Vec::with_capacity(files.len());
        for (coordinate, file) in coordinates.iter().zip(files) {
            self.recorder.record(
                &repositories,
                local_cache,
                &coordinate.group_id,
                &coordinate.artifact_id,
                &coordinate.version,
            );
            resolved.push(ResolvedArtifact {
                coordinate: coordinate.clone(),
                file,
                channel: None,
            });
        }
        Ok(resolved)
    }

    pub fn resolve_direct_artifact(
        &mut self,
        coordinate: &ArtifactCoordinate,
    ) -> ChannelResult<ResolvedArtifact> {
        self.resolve_direct_artifacts(std::slice::from_ref(coordinate))?
            .pop()
            .ok_or_else(|| self.unresolved(vec![coordinate.to_string()]))
    }

    /// Channels pinned to every artifact fetched so far
    pub fn recorded_channels(&self) -> ChannelResult<Vec<RecordedChannel>> {
        self.recorder.export()
    }

    /// The manifest each channel loaded, configured and required channels alike
    pub fn manifest_records(&self) -> Vec<ManifestRecord> {
        self.graph
            .nodes
            .iter()
            .filter_map(|n| n.record.clone())
            .collect()
    }

    /// Names of the channels required by another channel
    pub fn dependency_channels(&self) -> Vec<String> {
        self.graph
            .nodes
            .iter()
            .filter(|n| n.dependency)
            .map(|n| n.name())
            .collect()
    }

    /// Names of every channel a configured channel requires, directly or not
    pub fn required_channels(&self, channel: &str) -> Vec<String> {
        self.graph
            .nodes
            .iter()
            .position(|n| n.configured && n.name() == channel)
            .map(|id| {
                self.graph
                    .transitive_requirements(id)
                    .into_iter()
                    .map(|r| self.graph.nodes[r].name())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Close every repository client once. Later calls do nothing.
    pub fn close(&mut self) -> ChannelResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut result = self.graph.teardown();
        if let Some(direct) = self.direct.take() {
            if let Err(e) = direct.client.close() {
                result = result.and(Err(e.into()));
            }
        }
        result
    }
}

impl Drop for ChannelSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
