//! Version streams
//!
//! A stream maps a `groupId:artifactId` pair (either may be `*`) to the
//! versions a channel allows: a fixed version set, or a regular expression
//! that candidate versions must fully match.

use std::collections::BTreeSet;
use std::fmt;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::coordinate::WILDCARD;
use crate::error::ModelError;
use crate::version::latest_version;

/// A compiled version pattern that must match a whole version string.
#[derive(Clone)]
pub struct VersionPattern {
    source: String,
    regex: Regex,
}

impl VersionPattern {
    pub fn new(source: impl Into<String>) -> Result<Self, ModelError> {
        let source = source.into();
        let regex = Regex::new(&format!("^(?:{})$", source)).map_err(|e| {
            ModelError::InvalidPattern {
                pattern: source.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { source, regex })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, version: &str) -> bool {
        self.regex.is_match(version)
    }
}

impl fmt::Debug for VersionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VersionPattern").field(&self.source).finish()
    }
}

impl PartialEq for VersionPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// How a stream selects versions
#[derive(Debug, Clone, PartialEq)]
pub enum VersionRule {
    /// One or more fixed versions, in declaration order
    Fixed(Vec<String>),
    /// Candidate versions must fully match the pattern
    Pattern(VersionPattern),
}

/// Stream document shape
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStream {
    group_id: String,
    artifact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    excluded_versions: BTreeSet<String>,
}

/// A version stream in a channel manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStream", into = "RawStream")]
pub struct Stream {
    group_id: String,
    artifact_id: String,
    rule: VersionRule,
    excluded_versions: BTreeSet<String>,
}

impl Stream {
    /// Create a stream pinned to a single version.
    pub fn fixed(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self, ModelError> {
        Self::build(
            group_id.into(),
            artifact_id.into(),
            Some(version.into()),
            None,
            BTreeSet::new(),
        )
    }

    /// Create a stream accepting versions that fully match `pattern`.
    pub fn pattern(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Result<Self, ModelError> {
        Self::build(
            group_id.into(),
            artifact_id.into(),
            None,
            Some(pattern.into()),
            BTreeSet::new(),
        )
    }

    /// Add versions the stream must never select.
    pub fn with_excluded_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_versions
            .extend(versions.into_iter().map(Into::into));
        self
    }

    fn build(
        group_id: String,
        artifact_id: String,
        version: Option<String>,
        version_pattern: Option<String>,
        excluded_versions: BTreeSet<String>,
    ) -> Result<Self, ModelError> {
        let invalid = |reason: &str| ModelError::InvalidStream {
            group_id: group_id.clone(),
            artifact_id: artifact_id.clone(),
            reason: reason.to_string(),
        };

        if group_id.trim().is_empty() || artifact_id.trim().is_empty() {
            return Err(invalid("groupId and artifactId must not be empty"));
        }
        if group_id == WILDCARD && artifact_id != WILDCARD {
            return Err(invalid("groupId may only be '*' when artifactId is also '*'"));
        }

        let rule = match (version, version_pattern) {
            (Some(_), Some(_)) => {
                return Err(invalid("version and versionPattern are mutually exclusive"))
            }
            (None, None) => return Err(invalid("one of version or versionPattern is required")),
            (Some(version), None) => {
                let versions: Vec<String> = version
                    .split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .collect();
                if versions.is_empty() {
                    return Err(invalid("version must not be empty"));
                }
                VersionRule::Fixed(versions)
            }
            (None, Some(pattern)) => VersionRule::Pattern(VersionPattern::new(pattern)?),
        };

        Ok(Self {
            group_id,
            artifact_id,
            rule,
            excluded_versions,
        })
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    pub fn rule(&self) -> &VersionRule {
        &self.rule
    }

    pub fn excluded_versions(&self) -> &BTreeSet<String> {
        &self.excluded_versions
    }

    /// Whether this stream applies to the given coordinate.
    pub fn applies_to(&self, group_id: &str, artifact_id: &str) -> bool {
        (self.group_id == WILDCARD || self.group_id == group_id)
            && (self.artifact_id == WILDCARD || self.artifact_id == artifact_id)
    }

    /// The single fixed version of this stream, if it pins exactly one
    /// non-excluded version.
    pub fn fixed_version(&self) -> Option<&str> {
        match &self.rule {
            VersionRule::Fixed(versions) if versions.len() == 1 => {
                let version = versions[0].as_str();
                (!self.excluded_versions.contains(version)).then_some(version)
            }
            _ => None,
        }
    }

    /// Pick the best version among `candidates` that this stream allows.
    ///
    /// Excluded versions are removed first. Returns `None` when nothing
    /// matches.
    pub fn select(&self, candidates: &BTreeSet<String>) -> Option<String> {
        let allowed = candidates
            .iter()
            .filter(|v| !self.excluded_versions.contains(v.as_str()));

        let best = match &self.rule {
            VersionRule::Fixed(versions) => {
                latest_version(allowed.filter(|v| versions.contains(*v)).map(String::as_str))
            }
            VersionRule::Pattern(pattern) => {
                latest_version(allowed.filter(|v| pattern.is_match(v)).map(String::as_str))
            }
        };
        best.map(str::to_string)
    }
}

impl TryFrom<RawStream> for Stream {
    type Error = ModelError;

    fn try_from(raw: RawStream) -> Result<Self, Self::Error> {
        Self::build(
            raw.group_id,
            raw.artifact_id,
            raw.version,
            raw.version_pattern,
            raw.excluded_versions,
        )
    }
}

impl From<Stream> for RawStream {
    fn from(stream: Stream) -> Self {
        let (version, version_pattern) = match stream.rule {
            VersionRule::Fixed(versions) => (Some(versions.join(", ")), None),
            VersionRule::Pattern(pattern) => (None, Some(pattern.source)),
        };
        Self {
            group_id: stream.group_id,
            artifact_id: stream.artifact_id,
            version,
            version_pattern,
            excluded_versions: stream.excluded_versions,
        }
    }
}
