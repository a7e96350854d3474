//! Record of the artifacts a session actually used
//!
//! Versions are grouped by the repositories they came from, so the export
//! is one channel per repository set, each pinned by a manifest of fixed
//! streams.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use channel_model::mapper::{channels_to_yaml, manifest_to_yaml};
use channel_model::{
    compare_versions, ChannelDefinition, ChannelManifest, ChannelReference, NoStreamStrategy,
    Repository, Stream,
};
use url::Url;

use crate::error::{ChannelError, ChannelResult};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GroupKey {
    repositories: Vec<Repository>,
    local_cache: bool,
}

/// Accumulates `(groupId, artifactId, version)` triples per repository set
#[derive(Debug, Default)]
pub struct Recorder {
    groups: BTreeMap<GroupKey, BTreeMap<(String, String), BTreeSet<String>>>,
}

/// One exported channel with its pinned manifest
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedChannel {
    pub definition: ChannelDefinition,
    pub manifest: ChannelManifest,
    /// Artifacts of this channel were served from a local cache
    pub local_cache: bool,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        repositories: &[Repository],
        local_cache: bool,
        group_id: &str,
        artifact_id: &str,
        version: &str,
    ) {
        let key = GroupKey {
            repositories: repositories.to_vec(),
            local_cache,
        };
        self.groups
            .entry(key)
            .or_default()
            .entry((group_id.to_string(), artifact_id.to_string()))
            .or_default()
            .insert(version.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Export every repository set as a channel pinned to the recorded versions
    pub fn export(&self) -> ChannelResult<Vec<RecordedChannel>> {
        let mut channels = Vec::with_capacity(self.groups.len());
        for (index, (key, artifacts)) in self.groups.iter().enumerate() {
            let mut manifest = ChannelManifest::new().with_id(format!("recorded-{}", index));
            for ((group_id, artifact_id), versions) in artifacts {
                let mut versions: Vec<&str> = versions.iter().map(String::as_str).collect();
                versions.sort_by(|a, b| compare_versions(b, a));
                manifest = manifest.with_stream(Stream::fixed(
                    group_id.as_str(),
                    artifact_id.as_str(),
                    versions.join(", "),
                )?);
            }

            let mut definition = ChannelDefinition::new()
                .with_name(format!("recorded-{}", index))
                .with_no_stream_strategy(NoStreamStrategy::None);
            definition.repositories = key.repositories.clone();
            if key.local_cache {
                definition.description = Some("resolved through a local cache".to_string());
            }
            channels.push(RecordedChannel {
                definition,
                manifest,
                local_cache: key.local_cache,
            });
        }
        Ok(channels)
    }
}

impl RecordedChannel {
    /// Write `<name>-manifest.yaml` into `dir` and point the definition at it
    pub fn write_manifest(&mut self, dir: &Path) -> ChannelResult<PathBuf> {
        let name = self.definition.display_name();
        let path = dir.join(format!("{}-manifest.yaml", name));
        fs::write(&path, manifest_to_yaml(&self.manifest)?)?;
        let absolute = path.canonicalize()?;
        let url = Url::from_file_path(&absolute).map_err(|_| ChannelError::InvalidReference {
            reference: absolute.display().to_string(),
            reason: "not an absolute path".to_string(),
        })?;
        self.definition.manifest = Some(ChannelReference::Url(url.to_string()));
        Ok(path)
    }
}

/// Write the manifests and a `channels.yaml` listing every recorded channel
pub fn write_recording(channels: &mut [RecordedChannel], dir: &Path) -> ChannelResult<PathBuf> {
    fs::create_dir_all(dir)?;
    for channel in channels.iter_mut() {
        channel.write_manifest(dir)?;
    }
    let definitions: Vec<ChannelDefinition> =
        channels.iter().map(|c| c.definition.clone()).collect();
    let path = dir.join("channels.yaml");
    fs::write(&path, channels_to_yaml(&definitions)?)?;
    Ok(path)
}
