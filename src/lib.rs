//! Artifact channels
//!
//! Resolves artifact versions through channels: each channel pairs a list
//! of repositories with a manifest of version streams, an optional
//! blocklist and a fallback policy. Manifests may require other manifests,
//! forming a graph that is checked for cycles when a session is built.
//! Channels can demand that every artifact carries a detached signature
//! from a trusted key.

pub mod config;
pub mod error;
pub mod session;
pub mod signature;

pub use channel_model as model;
pub use channel_repository as repository;

pub use config::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use error::{ChannelError, ChannelResult, ErrorKind};
pub use session::{
    write_recording, ArtifactRequest, ChannelSession, ManifestRecord, RecordedChannel,
    ResolvedArtifact, VersionResult,
};
pub use signature::{
    KeyringValidator, Pipeline, PublicKeyRecord, SignatureResult, SignatureValidator, TrustStore,
};
