//! Channel documents and version selection rules.
//!
//! Defines the channel, manifest and blocklist documents together with the
//! version order and stream matching used to pick a single version for a
//! `groupId:artifactId` pair.

pub mod blocklist;
pub mod coordinate;
pub mod definition;
pub mod error;
pub mod manifest;
pub mod mapper;
pub mod stream;
pub mod version;

pub use blocklist::{Blocklist, BlocklistEntry};
pub use coordinate::{ArtifactCoordinate, MavenCoordinate, WILDCARD};
pub use definition::{ChannelDefinition, ChannelReference, NoStreamStrategy, Repository};
pub use error::{ModelError, ModelResult};
pub use manifest::{ChannelManifest, ManifestRequirement};
pub use stream::{Stream, VersionPattern, VersionRule};
pub use version::{compare_versions, latest_version, Version};

/// Maven classifier of published channel manifests.
pub const MANIFEST_CLASSIFIER: &str = "manifest";

/// Maven classifier of published blocklists.
pub const BLOCKLIST_CLASSIFIER: &str = "blocklist";

/// Extension of published channel documents.
pub const DOCUMENT_EXTENSION: &str = "yaml";
