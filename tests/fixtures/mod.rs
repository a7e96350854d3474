//! Shared helpers for the integration tests
//!
//! Channel documents are published into [`MockRepositories`] the way a real
//! repository holds them: `yaml` artifacts with the `manifest` or
//! `blocklist` classifier.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use artifact_channels::model::mapper::{blocklist_to_yaml, manifest_to_yaml};
use artifact_channels::model::{
    ArtifactCoordinate, Blocklist, ChannelDefinition, ChannelManifest, ChannelReference,
    MavenCoordinate, NoStreamStrategy, Repository, BLOCKLIST_CLASSIFIER, DOCUMENT_EXTENSION,
    MANIFEST_CLASSIFIER,
};
use artifact_channels::repository::mock::MockRepositories;
use artifact_channels::repository::{RepositoryClientFactory, RetryPolicy};
use artifact_channels::signature::{DetachedSignature, SecretKeyFile};
use tempfile::TempDir;

pub const CENTRAL: &str = "central";
pub const DOCUMENTS_GROUP: &str = "org.example.channels";

pub fn central() -> Repository {
    Repository::new(CENTRAL, "mock://central")
}

pub fn jar(group_id: &str, artifact_id: &str, version: &str) -> ArtifactCoordinate {
    ArtifactCoordinate::new(group_id, artifact_id, "jar", "", version)
}

pub fn manifest_coordinate(artifact_id: &str, version: &str) -> ArtifactCoordinate {
    ArtifactCoordinate::new(
        DOCUMENTS_GROUP,
        artifact_id,
        DOCUMENT_EXTENSION,
        MANIFEST_CLASSIFIER,
        version,
    )
}

pub fn blocklist_coordinate(artifact_id: &str, version: &str) -> ArtifactCoordinate {
    ArtifactCoordinate::new(
        DOCUMENTS_GROUP,
        artifact_id,
        DOCUMENT_EXTENSION,
        BLOCKLIST_CLASSIFIER,
        version,
    )
}

/// Reference to the latest published version of a channel document
pub fn latest_reference(artifact_id: &str) -> ChannelReference {
    ChannelReference::Maven(MavenCoordinate::new(DOCUMENTS_GROUP, artifact_id))
}

/// A channel over `central` whose manifest is the document `manifest_artifact`
pub fn channel(name: &str, manifest_artifact: &str) -> ChannelDefinition {
    ChannelDefinition::new()
        .with_name(name)
        .with_repository(central())
        .with_manifest(latest_reference(manifest_artifact))
        .with_no_stream_strategy(NoStreamStrategy::None)
}

/// Temporary work directory and mock repositories
pub struct Fixture {
    pub dir: TempDir,
    pub repos: MockRepositories,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let repos = MockRepositories::new(dir.path().join("work"));
        Self { dir, repos }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn publish_manifest(&self, artifact_id: &str, version: &str, manifest: &ChannelManifest) {
        self.repos.publish(
            CENTRAL,
            manifest_coordinate(artifact_id, version),
            manifest_to_yaml(manifest).unwrap(),
        );
    }

    pub fn publish_blocklist(&self, artifact_id: &str, version: &str, blocklist: &Blocklist) {
        self.repos.publish(
            CENTRAL,
            blocklist_coordinate(artifact_id, version),
            blocklist_to_yaml(blocklist).unwrap(),
        );
    }

    /// Publish jars for every version of `group_id:artifact_id`
    pub fn publish_versions(&self, group_id: &str, artifact_id: &str, versions: &[&str]) {
        for version in versions {
            self.repos.publish(
                CENTRAL,
                jar(group_id, artifact_id, version),
                format!("{}:{}:{}", group_id, artifact_id, version),
            );
        }
    }

    /// Publish a detached signature of `content` next to `coordinate`
    pub fn publish_signature(&self, coordinate: &ArtifactCoordinate, content: &[u8], key: &SecretKeyFile) {
        let signature = DetachedSignature::sign(content, &key.signing_key().unwrap());
        self.repos.publish(
            CENTRAL,
            coordinate.signature(),
            signature.to_json().unwrap(),
        );
    }

    pub fn factory(&self) -> Arc<dyn RepositoryClientFactory> {
        Arc::new(self.repos.factory(RetryPolicy::none()))
    }

    pub fn factory_with(&self, policy: RetryPolicy) -> Arc<dyn RepositoryClientFactory> {
        Arc::new(self.repos.factory(policy))
    }
}
