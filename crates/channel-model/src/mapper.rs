//! YAML reading and writing of channel documents
//!
//! Every reader checks the document's `schemaVersion` against the majors
//! this crate understands and runs the validation serde cannot express.

use serde_yaml::Value;

use crate::blocklist::Blocklist;
use crate::definition::ChannelDefinition;
use crate::error::{ModelError, ModelResult};
use crate::manifest::ChannelManifest;

/// Supported major schema versions per document kind
const CHANNEL_SCHEMA_MAJORS: &[&str] = &["1", "2"];
const MANIFEST_SCHEMA_MAJORS: &[&str] = &["1"];
const BLOCKLIST_SCHEMA_MAJORS: &[&str] = &["1"];

fn check_schema(document: &'static str, version: &str, majors: &[&str]) -> ModelResult<()> {
    let major = version.split('.').next().unwrap_or_default();
    if majors.contains(&major) {
        Ok(())
    } else {
        Err(ModelError::UnsupportedSchema {
            document,
            version: version.to_string(),
        })
    }
}

/// Parse a channel document holding either one channel or a sequence of
/// channels.
pub fn parse_channels(yaml: &str) -> ModelResult<Vec<ChannelDefinition>> {
    let value: Value = serde_yaml::from_str(yaml)?;
    let channels: Vec<ChannelDefinition> = match value {
        Value::Sequence(_) => serde_yaml::from_value(value)?,
        other => vec![serde_yaml::from_value(other)?],
    };
    for channel in &channels {
        check_schema("channel", &channel.schema_version, CHANNEL_SCHEMA_MAJORS)?;
    }
    Ok(channels)
}

/// Write channels as a YAML sequence.
pub fn channels_to_yaml(channels: &[ChannelDefinition]) -> ModelResult<String> {
    Ok(serde_yaml::to_string(channels)?)
}

pub fn parse_manifest(yaml: &str) -> ModelResult<ChannelManifest> {
    let manifest: ChannelManifest = serde_yaml::from_str(yaml)?;
    check_schema("manifest", &manifest.schema_version, MANIFEST_SCHEMA_MAJORS)?;
    manifest.validate()?;
    Ok(manifest)
}

pub fn manifest_to_yaml(manifest: &ChannelManifest) -> ModelResult<String> {
    Ok(serde_yaml::to_string(manifest)?)
}

pub fn parse_blocklist(yaml: &str) -> ModelResult<Blocklist> {
    let blocklist: Blocklist = serde_yaml::from_str(yaml)?;
    check_schema("blocklist", &blocklist.schema_version, BLOCKLIST_SCHEMA_MAJORS)?;
    blocklist.validate()?;
    Ok(blocklist)
}

pub fn blocklist_to_yaml(blocklist: &Blocklist) -> ModelResult<String> {
    Ok(serde_yaml::to_string(blocklist)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::NoStreamStrategy;
    use crate::stream::Stream;

    const MANIFEST: &str = r#"
schemaVersion: "1.0.0"
name: Core
id: core
requires:
  - id: base
streams:
  - groupId: org.example
    artifactId: lib
    versionPattern: '1\.2\..*'
  - groupId: org.example
    artifactId: tool
    version: "2.0.0"
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = parse_manifest(MANIFEST).unwrap();
        assert_eq!(manifest.id.as_deref(), Some("core"));
        assert_eq!(manifest.requires.len(), 1);
        assert_eq!(manifest.streams.len(), 2);
        assert_eq!(
            manifest.find_stream("org.example", "tool").unwrap().fixed_version(),
            Some("2.0.0")
        );
    }

    #[test]
    fn test_manifest_round_trip() {
        let manifest = parse_manifest(MANIFEST).unwrap();
        let yaml = manifest_to_yaml(&manifest).unwrap();
        assert_eq!(parse_manifest(&yaml).unwrap(), manifest);
    }

    #[test]
    fn test_unsupported_schema() {
        let yaml = "schemaVersion: \"9.0.0\"\nstreams: []\n";
        assert!(matches!(
            parse_manifest(yaml),
            Err(ModelError::UnsupportedSchema { document: "manifest", .. })
        ));
    }

    #[test]
    fn test_invalid_stream_is_an_error() {
        let yaml = "schemaVersion: \"1.0.0\"\nstreams:\n  - groupId: '*'\n    artifactId: lib\n    version: '1'\n";
        assert!(parse_manifest(yaml).is_err());
    }

    #[test]
    fn test_duplicate_stream_is_an_error() {
        let yaml = "schemaVersion: \"1.0.0\"\nstreams:\n  - groupId: g\n    artifactId: a\n    version: '1'\n  - groupId: g\n    artifactId: a\n    version: '2'\n";
        assert!(matches!(
            parse_manifest(yaml),
            Err(ModelError::DuplicateStream { .. })
        ));
    }

    #[test]
    fn test_parse_single_and_multiple_channels() {
        let single = "schemaVersion: \"2.0.0\"\nname: one\nrepositories: []\n";
        assert_eq!(parse_channels(single).unwrap().len(), 1);

        let many = "- schemaVersion: \"2.0.0\"\n  name: one\n- schemaVersion: \"1.0.0\"\n  name: two\n  resolve-if-no-stream: none\n";
        let channels = parse_channels(many).unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[1].no_stream_strategy, NoStreamStrategy::None);
    }

    #[test]
    fn test_channels_round_trip() {
        let channels = vec![ChannelDefinition::new().with_name("recorded")];
        let yaml = channels_to_yaml(&channels).unwrap();
        assert_eq!(parse_channels(&yaml).unwrap(), channels);
    }

    #[test]
    fn test_parse_blocklist() {
        let yaml = "schemaVersion: \"1.0.0\"\nblocks:\n  - groupId: org.wildfly\n    artifactId: '*'\n    versions: [25.0.1.Final]\n";
        let blocklist = parse_blocklist(yaml).unwrap();
        assert!(blocklist
            .versions_for("org.wildfly", "wildfly-ee")
            .contains("25.0.1.Final"));

        let round = parse_blocklist(&blocklist_to_yaml(&blocklist).unwrap()).unwrap();
        assert_eq!(round, blocklist);
    }

    #[test]
    fn test_programmatic_manifest_serializes() {
        let manifest = ChannelManifest::new()
            .with_id("pinned")
            .with_stream(Stream::fixed("org.example", "lib", "1.2.5").unwrap());
        let yaml = manifest_to_yaml(&manifest).unwrap();
        assert!(yaml.contains("1.2.5"));
        assert_eq!(parse_manifest(&yaml).unwrap(), manifest);
    }
}
