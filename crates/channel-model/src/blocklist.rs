//! Blocklists
//!
//! A blocklist names versions that pattern streams must never select,
//! independently of the stream rules.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::coordinate::WILDCARD;
use crate::error::{ModelError, ModelResult};

/// Schema version written by this crate
pub const BLOCKLIST_SCHEMA_VERSION: &str = "1.0.0";

/// Versions excluded for one `groupId:artifactId` (artifactId may be `*`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlocklistEntry {
    pub group_id: String,
    pub artifact_id: String,
    pub versions: BTreeSet<String>,
}

/// A blocklist document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blocklist {
    pub schema_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub blocks: Vec<BlocklistEntry>,
}

impl Blocklist {
    pub fn new() -> Self {
        Self {
            schema_version: BLOCKLIST_SCHEMA_VERSION.to_string(),
            name: None,
            blocks: Vec::new(),
        }
    }

    /// Add an entry, merging with an existing entry for the same pair
    pub fn block<I, S>(mut self, group_id: &str, artifact_id: &str, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let versions = versions.into_iter().map(Into::into);
        match self
            .blocks
            .iter_mut()
            .find(|e| e.group_id == group_id && e.artifact_id == artifact_id)
        {
            Some(entry) => entry.versions.extend(versions),
            None => self.blocks.push(BlocklistEntry {
                group_id: group_id.to_string(),
                artifact_id: artifact_id.to_string(),
                versions: versions.collect(),
            }),
        }
        self
    }

    pub fn validate(&self) -> ModelResult<()> {
        for entry in &self.blocks {
            if entry.group_id.trim().is_empty() || entry.group_id == WILDCARD {
                return Err(ModelError::InvalidBlocklistEntry {
                    group_id: entry.group_id.clone(),
                    artifact_id: entry.artifact_id.clone(),
                    reason: "groupId must be a concrete value".to_string(),
                });
            }
            if entry.artifact_id.trim().is_empty() {
                return Err(ModelError::InvalidBlocklistEntry {
                    group_id: entry.group_id.clone(),
                    artifact_id: entry.artifact_id.clone(),
                    reason: "artifactId must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Versions excluded for a coordinate.
    ///
    /// The exact entry wins over the `groupId:*` entry; no entry means no
    /// exclusions.
    pub fn versions_for(&self, group_id: &str, artifact_id: &str) -> BTreeSet<String> {
        let lookup = |a: &str| {
            self.blocks
                .iter()
                .find(|e| e.group_id == group_id && e.artifact_id == a)
        };
        lookup(artifact_id)
            .or_else(|| lookup(WILDCARD))
            .map(|e| e.versions.clone())
            .unwrap_or_default()
    }
}

impl Default for Blocklist {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_then_wildcard() {
        let blocklist = Blocklist::new()
            .block("org.wildfly", "*", ["25.0.1.Final"])
            .block("org.wildfly", "wildfly-ee", ["26.0.0.Final"]);

        let exact = blocklist.versions_for("org.wildfly", "wildfly-ee");
        assert!(exact.contains("26.0.0.Final"));
        assert!(!exact.contains("25.0.1.Final"));

        let wildcard = blocklist.versions_for("org.wildfly", "wildfly-core");
        assert!(wildcard.contains("25.0.1.Final"));

        assert!(blocklist.versions_for("org.jboss", "jboss-logging").is_empty());
    }

    #[test]
    fn test_block_merges_entries() {
        let blocklist = Blocklist::new()
            .block("org.example", "lib", ["1.0"])
            .block("org.example", "lib", ["1.1"]);
        assert_eq!(blocklist.blocks.len(), 1);
        assert_eq!(blocklist.versions_for("org.example", "lib").len(), 2);
    }

    #[test]
    fn test_validate_rejects_wildcard_group() {
        let blocklist = Blocklist::new().block("*", "*", ["1.0"]);
        assert!(matches!(
            blocklist.validate(),
            Err(ModelError::InvalidBlocklistEntry { .. })
        ));
    }
}
