//! Channel manifests
//!
//! A manifest declares the streams of a channel and the other manifests it
//! requires.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::coordinate::{MavenCoordinate, WILDCARD};
use crate::error::{ModelError, ModelResult};
use crate::stream::Stream;

/// Schema version written by this crate
pub const MANIFEST_SCHEMA_VERSION: &str = "1.1.0";

/// A reference to another manifest.
///
/// The id is looked up among the manifests of the other channels first; the
/// Maven coordinate is only used when no channel declares that id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRequirement {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maven: Option<MavenCoordinate>,
}

impl ManifestRequirement {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            maven: None,
        }
    }

    pub fn with_maven(mut self, coordinate: MavenCoordinate) -> Self {
        self.maven = Some(coordinate);
        self
    }
}

/// A channel manifest document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelManifest {
    pub schema_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<ManifestRequirement>,

    #[serde(default)]
    pub streams: Vec<Stream>,
}

impl ChannelManifest {
    /// Create an empty manifest
    pub fn new() -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            name: None,
            id: None,
            description: None,
            requires: Vec::new(),
            streams: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_requirement(mut self, requirement: ManifestRequirement) -> Self {
        self.requires.push(requirement);
        self
    }

    pub fn with_stream(mut self, stream: Stream) -> Self {
        self.streams.push(stream);
        self
    }

    /// Check the invariants serde cannot express.
    pub fn validate(&self) -> ModelResult<()> {
        let mut seen = BTreeSet::new();
        for stream in &self.streams {
            if !seen.insert((stream.group_id(), stream.artifact_id())) {
                return Err(ModelError::DuplicateStream {
                    group_id: stream.group_id().to_string(),
                    artifact_id: stream.artifact_id().to_string(),
                });
            }
        }
        for requirement in &self.requires {
            if requirement.id.trim().is_empty() {
                return Err(ModelError::InvalidRequirement {
                    reason: "requirement id must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Find the stream for a coordinate.
    ///
    /// Exact `groupId:artifactId` first, then `groupId:*`, then `*:*`.
    pub fn find_stream(&self, group_id: &str, artifact_id: &str) -> Option<&Stream> {
        let lookup = |g: &str, a: &str| {
            self.streams
                .iter()
                .find(|s| s.group_id() == g && s.artifact_id() == a)
        };
        lookup(group_id, artifact_id)
            .or_else(|| lookup(group_id, WILDCARD))
            .or_else(|| lookup(WILDCARD, WILDCARD))
    }
}

impl Default for ChannelManifest {
    fn default() -> Self {
        Self::new()
    }
}
