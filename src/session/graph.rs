//! Channel node arena
//!
//! Nodes live in one arena and refer to each other by index. A node starts
//! `Uninitialized`; initialization opens its repository client, loads the
//! manifest and blocklist and resolves the manifests it requires, adding
//! one edge per requirement. After every edge a DFS from the node looks for
//! a back edge. Clients are closed by a single teardown over the arena in
//! reverse opening order.

use std::collections::BTreeMap;
use std::sync::Arc;

use channel_model::mapper::{parse_blocklist, parse_manifest};
use channel_model::{
    latest_version, ArtifactCoordinate, Blocklist, ChannelDefinition, ChannelManifest,
    ChannelReference, ManifestRequirement, MavenCoordinate, NoStreamStrategy,
    BLOCKLIST_CLASSIFIER, DOCUMENT_EXTENSION, MANIFEST_CLASSIFIER,
};
use channel_repository::{MetadataCoordinate, RepositoryClient, RepositoryClientFactory};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ChannelError, ChannelResult};
use crate::signature::{Pipeline, SignatureValidator};

pub(crate) type NodeId = usize;

/// Initialization state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Uninitialized,
    Initializing,
    Ready,
}

/// The manifest a channel actually loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    pub channel: String,
    /// Maven references carry the resolved version
    pub manifest: ChannelReference,
}

pub(crate) struct ChannelNode {
    pub definition: ChannelDefinition,
    /// Listed in the session configuration, as opposed to synthesized
    pub configured: bool,
    pub status: NodeStatus,
    pub manifest: Option<ChannelManifest>,
    pub blocklist: Option<Blocklist>,
    pub required: Vec<NodeId>,
    /// Required by another node
    pub dependency: bool,
    pub client: Option<Box<dyn RepositoryClient>>,
    pub pipeline: Pipeline,
    pub record: Option<ManifestRecord>,
}

impl ChannelNode {
    pub fn name(&self) -> String {
        self.definition.display_name()
    }

    pub fn manifest_id(&self) -> Option<&str> {
        self.manifest.as_ref().and_then(|m| m.id.as_deref())
    }

    pub fn repository_ids(&self) -> Vec<String> {
        self.definition
            .repositories
            .iter()
            .map(|r| r.id.clone())
            .collect()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

pub(crate) struct ChannelGraph {
    pub nodes: Vec<ChannelNode>,
    factory: Arc<dyn RepositoryClientFactory>,
    validator: Option<Arc<dyn SignatureValidator>>,
    /// Nodes in the order their clients were opened
    opened: Vec<NodeId>,
}

impl ChannelGraph {
    pub fn new(
        factory: Arc<dyn RepositoryClientFactory>,
        validator: Option<Arc<dyn SignatureValidator>>,
    ) -> Self {
        Self {
            nodes: Vec::new(),
            factory,
            validator,
            opened: Vec::new(),
        }
    }

    pub fn factory(&self) -> &dyn RepositoryClientFactory {
        self.factory.as_ref()
    }

    pub fn validator(&self) -> Option<&Arc<dyn SignatureValidator>> {
        self.validator.as_ref()
    }

    /// Pipeline for a channel's signature policy
    pub fn pipeline_for(&self, definition: &ChannelDefinition) -> ChannelResult<Pipeline> {
        if !definition.require_signature {
            return Ok(Pipeline::new());
        }
        match &self.validator {
            Some(validator) => Ok(Pipeline::verified(
                Arc::clone(validator),
                definition.key_urls.clone(),
            )),
            None => Err(ChannelError::SignatureValidatorMissing {
                channel: definition.display_name(),
            }),
        }
    }

    pub fn add_node(&mut self, definition: ChannelDefinition, configured: bool) -> ChannelResult<NodeId> {
        let pipeline = self.pipeline_for(&definition)?;
        self.nodes.push(ChannelNode {
            definition,
            configured,
            status: NodeStatus::Uninitialized,
            manifest: None,
            blocklist: None,
            required: Vec::new(),
            dependency: false,
            client: None,
            pipeline,
            record: None,
        });
        Ok(self.nodes.len() - 1)
    }

    pub fn client(&self, id: NodeId) -> ChannelResult<&dyn RepositoryClient> {
        self.nodes[id].client.as_deref().ok_or(ChannelError::Closed)
    }

    /// Initialize a node once. Re-entry while it is initializing is an error.
    pub fn initialize(&mut self, id: NodeId) -> ChannelResult<()> {
        match self.nodes[id].status {
            NodeStatus::Ready => return Ok(()),
            NodeStatus::Initializing => {
                return Err(ChannelError::ReentrantInitialization {
                    channel: self.nodes[id].name(),
                })
            }
            NodeStatus::Uninitialized => {}
        }
        self.nodes[id].status = NodeStatus::Initializing;
        debug!(channel = %self.nodes[id].name(), "initializing channel");

        if self.nodes[id].client.is_none() {
            let client = self.factory.create(&self.nodes[id].definition.repositories)?;
            self.nodes[id].client = Some(client);
            self.opened.push(id);
        }

        let manifest = match self.nodes[id].definition.manifest.clone() {
            Some(reference) => {
                let (manifest, record) = self.load_manifest(id, &reference)?;
                self.nodes[id].record = Some(record);
                manifest
            }
            None => ChannelManifest::new(),
        };
        let requirements = manifest.requires.clone();
        self.nodes[id].manifest = Some(manifest);

        if let Some(reference) = self.nodes[id].definition.blocklist.clone() {
            self.nodes[id].blocklist = self.load_blocklist(id, &reference)?;
        }

        for requirement in &requirements {
            let target = self.resolve_requirement(id, requirement)?;
            if !self.nodes[id].required.contains(&target) {
                self.nodes[id].required.push(target);
            }
            self.nodes[target].dependency = true;
            self.check_cycles(id)?;
        }

        self.nodes[id].status = NodeStatus::Ready;
        info!(
            channel = %self.nodes[id].name(),
            manifest = self.nodes[id].manifest_id().unwrap_or(""),
            required = self.nodes[id].required.len(),
            "channel ready"
        );
        Ok(())
    }

    /// Locate a channel document, returning where it was read from and its content
    fn fetch_document(
        &self,
        id: NodeId,
        reference: &ChannelReference,
        classifier: &str,
    ) -> ChannelResult<Option<(ChannelReference, String)>> {
        let node = &self.nodes[id];
        let client = self.client(id)?;

        let (coordinate, resolved) = match reference {
            ChannelReference::Maven(maven) => {
                let version = match &maven.version {
                    Some(version) => version.clone(),
                    None => {
                        let versions = client.all_versions(
                            &maven.group_id,
                            &maven.artifact_id,
                            DOCUMENT_EXTENSION,
                            classifier,
                        )?;
                        match latest_version(versions.iter().map(String::as_str)) {
                            Some(version) => version.to_string(),
                            None => return Ok(None),
                        }
                    }
                };
                let artifact = ArtifactCoordinate::new(
                    &maven.group_id,
                    &maven.artifact_id,
                    DOCUMENT_EXTENSION,
                    classifier,
                    &version,
                );
                (
                    MetadataCoordinate::Maven(artifact),
                    ChannelReference::Maven(maven.clone().with_version(version)),
                )
            }
            ChannelReference::Url(url) => {
                let parsed = Url::parse(url).map_err(|e| ChannelError::InvalidReference {
                    reference: url.clone(),
                    reason: e.to_string(),
                })?;
                (MetadataCoordinate::Url(parsed), reference.clone())
            }
        };

        let (_, bytes) = node.pipeline.read_metadata(client, coordinate)?;
        let content = String::from_utf8(bytes).map_err(|e| ChannelError::InvalidReference {
            reference: resolved.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some((resolved, content)))
    }

    fn load_manifest(
        &self,
        id: NodeId,
        reference: &ChannelReference,
    ) -> ChannelResult<(ChannelManifest, ManifestRecord)> {
        let Some((resolved, content)) = self.fetch_document(id, reference, MANIFEST_CLASSIFIER)?
        else {
            return Err(ChannelError::Unresolved {
                artifacts: vec![reference.to_string()],
                repositories: self.nodes[id].repository_ids(),
            });
        };
        let manifest = parse_manifest(&content)?;
        debug!(channel = %self.nodes[id].name(), manifest = %resolved, "loaded manifest");
        let record = ManifestRecord {
            channel: self.nodes[id].name(),
            manifest: resolved,
        };
        Ok((manifest, record))
    }

    fn load_blocklist(
        &self,
        id: NodeId,
        reference: &ChannelReference,
    ) -> ChannelResult<Option<Blocklist>> {
        match self.fetch_document(id, reference, BLOCKLIST_CLASSIFIER)? {
            Some((resolved, content)) => {
                let blocklist = parse_blocklist(&content)?;
                debug!(channel = %self.nodes[id].name(), blocklist = %resolved, "loaded blocklist");
                Ok(Some(blocklist))
            }
            None => {
                debug!(
                    channel = %self.nodes[id].name(),
                    blocklist = %reference,
                    "no blocklist version available"
                );
                Ok(None)
            }
        }
    }

    /// Find or create the node providing a required manifest
    fn resolve_requirement(
        &mut self,
        id: NodeId,
        requirement: &ManifestRequirement,
    ) -> ChannelResult<NodeId> {
        if let Some(found) = self.find_manifest(&requirement.id)? {
            debug!(
                channel = %self.nodes[id].name(),
                requirement = %requirement.id,
                provider = %self.nodes[found].name(),
                "required manifest found among channels"
            );
            return Ok(found);
        }

        let Some(coordinate) = &requirement.maven else {
            return Err(ChannelError::RequiredManifestNotFound {
                id: requirement.id.clone(),
                channel: self.nodes[id].name(),
            });
        };

        self.synthesize(id, requirement, coordinate)
            .map_err(|cause| {
                if cause.is_graph_error() {
                    cause
                } else {
                    ChannelError::UnresolvedRequiredManifest {
                        id: requirement.id.clone(),
                        channel: self.nodes[id].name(),
                        cause: Box::new(cause),
                    }
                }
            })
    }

    /// The node whose manifest has this id, initializing nodes as needed.
    ///
    /// Initializing a node can append created nodes to the arena; the scan
    /// covers them too.
    fn find_manifest(&mut self, manifest_id: &str) -> ChannelResult<Option<NodeId>> {
        let mut candidate = 0;
        while candidate < self.nodes.len() {
            if self.nodes[candidate].status == NodeStatus::Uninitialized {
                self.initialize(candidate)?;
            }
            if self.nodes[candidate].manifest_id() == Some(manifest_id) {
                return Ok(Some(candidate));
            }
            candidate += 1;
        }
        Ok(None)
    }

    /// Create a channel for a required manifest published in the current
    /// channel's repositories
    fn synthesize(
        &mut self,
        id: NodeId,
        requirement: &ManifestRequirement,
        coordinate: &MavenCoordinate,
    ) -> ChannelResult<NodeId> {
        let version = match &coordinate.version {
            Some(version) => version.clone(),
            None => {
                let versions = self.client(id)?.all_versions(
                    &coordinate.group_id,
                    &coordinate.artifact_id,
                    DOCUMENT_EXTENSION,
                    MANIFEST_CLASSIFIER,
                )?;
                latest_version(versions.iter().map(String::as_str))
                    .map(str::to_string)
                    .ok_or_else(|| ChannelError::Unresolved {
                        artifacts: vec![coordinate.to_string()],
                        repositories: self.nodes[id].repository_ids(),
                    })?
            }
        };

        let parent = &self.nodes[id].definition;
        let mut definition = ChannelDefinition::new()
            .with_name(requirement.id.clone())
            .with_manifest(ChannelReference::Maven(
                coordinate.clone().with_version(version),
            ))
            .with_no_stream_strategy(NoStreamStrategy::None);
        definition.repositories = parent.repositories.clone();
        definition.require_signature = parent.require_signature;
        definition.key_urls = parent.key_urls.clone();

        info!(
            channel = %self.nodes[id].name(),
            requirement = %requirement.id,
            manifest = ?definition.manifest,
            "creating channel for required manifest"
        );
        let created = self.add_node(definition, false)?;
        self.initialize(created)?;
        Ok(created)
    }

    /// DFS over required edges from `start`; a grey target is a back edge.
    fn check_cycles(&self, start: NodeId) -> ChannelResult<()> {
        let mut colour = vec![Colour::White; self.nodes.len()];
        self.visit(start, &mut colour)
    }

    fn visit(&self, id: NodeId, colour: &mut [Colour]) -> ChannelResult<()> {
        colour[id] = Colour::Grey;
        for &next in &self.nodes[id].required {
            match colour[next] {
                Colour::Grey => {
                    return Err(ChannelError::CyclicDependency {
                        from: self.label(id),
                        to: self.label(next),
                    })
                }
                Colour::White => self.visit(next, colour)?,
                Colour::Black => {}
            }
        }
        colour[id] = Colour::Black;
        Ok(())
    }

    fn label(&self, id: NodeId) -> String {
        self.nodes[id]
            .manifest_id()
            .map(str::to_string)
            .unwrap_or_else(|| self.nodes[id].name())
    }

    /// Reject manifest ids declared by more than one configured channel
    pub fn check_duplicate_ids(&self) -> ChannelResult<()> {
        let mut owners: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for node in self.nodes.iter().filter(|n| n.configured) {
            if let Some(manifest_id) = node.manifest_id() {
                owners.entry(manifest_id).or_default().push(node.name());
            }
        }
        match owners.into_iter().find(|(_, channels)| channels.len() > 1) {
            Some((id, channels)) => Err(ChannelError::DuplicateManifestId {
                id: id.to_string(),
                channels,
            }),
            None => Ok(()),
        }
    }

    /// Every node reachable through required edges from `id`, `id` excluded
    pub fn transitive_requirements(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = self.nodes[id].required.clone();
        let mut found = Vec::new();
        while let Some(next) = stack.pop() {
            if std::mem::replace(&mut seen[next], true) {
                continue;
            }
            found.push(next);
            stack.extend(self.nodes[next].required.iter().copied());
        }
        found
    }

    /// Close every open client exactly once, newest first.
    ///
    /// Continues past failures and reports the first one.
    pub fn teardown(&mut self) -> ChannelResult<()> {
        let mut first_error = None;
        while let Some(id) = self.opened.pop() {
            let Some(client) = self.nodes[id].client.take() else {
                continue;
            };
            debug!(channel = %self.nodes[id].name(), "closing repository client");
            if let Err(e) = client.close() {
                warn!(channel = %self.nodes[id].name(), error = %e, "failed to close repository client");
                first_error.get_or_insert(ChannelError::from(e));
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ChannelGraph {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}
