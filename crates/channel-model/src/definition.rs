//! Channel definitions
//!
//! A channel pairs an ordered list of repositories with a manifest, an
//! optional blocklist and the policy applied when the manifest has no stream
//! for a requested artifact.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::coordinate::MavenCoordinate;

/// Schema version written by this crate
pub const CHANNEL_SCHEMA_VERSION: &str = "2.0.0";

/// A repository endpoint
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub url: String,
}

impl Repository {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.id, self.url)
    }
}

/// Where a manifest or blocklist document is published
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelReference {
    /// Published as a Maven artifact; a missing version means "latest available"
    Maven(MavenCoordinate),
    /// Fetched from a URL
    Url(String),
}

impl fmt::Display for ChannelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Maven(coordinate) => write!(f, "{}", coordinate),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// Policy applied when a channel's manifest has no stream for an artifact
/// and none of its required channels resolve it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoStreamStrategy {
    /// Greatest version available in the channel repositories
    Latest,
    /// The version the caller asked for
    #[default]
    Original,
    /// The `latest` value of the repository metadata
    MavenLatest,
    /// The `release` value of the repository metadata
    MavenRelease,
    /// No version
    None,
}

impl NoStreamStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::Original => "original",
            Self::MavenLatest => "maven-latest",
            Self::MavenRelease => "maven-release",
            Self::None => "none",
        }
    }
}

impl fmt::Display for NoStreamStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A channel definition document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDefinition {
    pub schema_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub repositories: Vec<Repository>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<ChannelReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocklist: Option<ChannelReference>,

    #[serde(rename = "resolve-if-no-stream", default)]
    pub no_stream_strategy: NoStreamStrategy,

    /// Every artifact and document must carry a valid detached signature
    #[serde(rename = "gpg-check", default)]
    pub require_signature: bool,

    /// Where signing keys may be downloaded from when not already trusted
    #[serde(rename = "gpg-urls", default, skip_serializing_if = "Vec::is_empty")]
    pub key_urls: Vec<String>,
}

impl ChannelDefinition {
    pub fn new() -> Self {
        Self {
            schema_version: CHANNEL_SCHEMA_VERSION.to_string(),
            name: None,
            description: None,
            repositories: Vec::new(),
            manifest: None,
            blocklist: None,
            no_stream_strategy: NoStreamStrategy::default(),
            require_signature: false,
            key_urls: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_repository(mut self, repository: Repository) -> Self {
        self.repositories.push(repository);
        self
    }

    pub fn with_manifest(mut self, manifest: ChannelReference) -> Self {
        self.manifest = Some(manifest);
        self
    }

    pub fn with_blocklist(mut self, blocklist: ChannelReference) -> Self {
        self.blocklist = Some(blocklist);
        self
    }

    pub fn with_no_stream_strategy(mut self, strategy: NoStreamStrategy) -> Self {
        self.no_stream_strategy = strategy;
        self
    }

    pub fn with_signature_check(mut self, key_urls: Vec<String>) -> Self {
        self.require_signature = true;
        self.key_urls = key_urls;
        self
    }

    /// Name used in log lines and resolution results
    pub fn display_name(&self) -> String {
        match (&self.name, &self.manifest) {
            (Some(name), _) => name.clone(),
            (None, Some(reference)) => reference.to_string(),
            (None, None) => "<unnamed channel>".to_string(),
        }
    }
}

impl Default for ChannelDefinition {
    fn default() -> Self {
        Self::new()
    }
}
