//! Local Repository Tests
//!
//! End-to-end resolution over Maven-layout directories on disk, with the
//! channel definitions read from YAML the way the CLI reads them.

use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use artifact_channels::model::mapper::{manifest_to_yaml, parse_channels};
use artifact_channels::model::{ArtifactCoordinate, ChannelManifest, Stream};
use artifact_channels::repository::{LocalRepositoryFactory, RetryPolicy};
use artifact_channels::{ArtifactRequest, ChannelSession, EffectiveConfig};
use tempfile::TempDir;
use url::Url;

fn install(root: &Path, coordinate: &ArtifactCoordinate, content: &str) {
    let path = root.join(coordinate.repository_path());
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn install_metadata(root: &Path, group_id: &str, artifact_id: &str, latest: &str, release: &str) {
    let dir = root.join(group_id.replace('.', "/")).join(artifact_id);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("maven-metadata.xml"),
        format!(
            "<metadata>\n  <groupId>{}</groupId>\n  <artifactId>{}</artifactId>\n  <versioning>\n    <latest>{}</latest>\n    <release>{}</release>\n  </versioning>\n</metadata>\n",
            group_id, artifact_id, latest, release
        ),
    )
    .unwrap();
}

fn jar(artifact_id: &str, version: &str) -> ArtifactCoordinate {
    ArtifactCoordinate::new("org.example", artifact_id, "jar", "", version)
}

/// A repository holding a manifest and a few jars, and the channel file over it
fn setup(dir: &TempDir) -> String {
    let root = dir.path().join("repository");
    let manifest = ChannelManifest::new()
        .with_id("product")
        .with_stream(Stream::pattern("org.example", "lib", r"1\..*").unwrap());
    install(
        &root,
        &ArtifactCoordinate::new("org.example.channels", "product", "yaml", "manifest", "1.0.0"),
        &manifest_to_yaml(&manifest).unwrap(),
    );
    for version in ["1.0", "1.4", "2.0"] {
        install(&root, &jar("lib", version), &format!("lib {}", version));
    }
    install(&root, &jar("tool", "0.9"), "tool 0.9");
    install(&root, &jar("tool", "1.1"), "tool 1.1");
    install_metadata(&root, "org.example", "tool", "1.1", "0.9");

    let url = Url::from_directory_path(&root).unwrap();
    format!(
        r#"schemaVersion: "2.0.0"
name: product
repositories:
  - id: local
    url: "{}"
manifest:
  maven:
    groupId: org.example.channels
    artifactId: product
resolve-if-no-stream: maven-release
"#,
        url
    )
}

#[test]
fn test_resolution_over_local_repository() {
    let dir = TempDir::new().unwrap();
    let channels = parse_channels(&setup(&dir)).unwrap();

    let factory = LocalRepositoryFactory::new(RetryPolicy::default())
        .with_interrupt(Arc::new(AtomicBool::new(false)));
    let mut session = ChannelSession::new(channels, Arc::new(factory), None).unwrap();

    let lib = session
        .resolve_artifact(&ArtifactRequest::new("org.example", "lib"))
        .unwrap();
    assert_eq!(lib.coordinate.version, "1.4");
    assert_eq!(fs::read_to_string(&lib.file).unwrap(), "lib 1.4");
    assert_eq!(lib.channel.as_deref(), Some("product"));

    // no stream: the release value of the repository metadata
    let tool = session
        .find_latest_version(&ArtifactRequest::new("org.example", "tool"))
        .unwrap();
    assert_eq!(tool.version, "0.9");

    session.close().unwrap();
}

#[test]
fn test_local_cache_from_configuration() {
    let dir = TempDir::new().unwrap();
    let channels = parse_channels(&setup(&dir)).unwrap();
    let cache = dir.path().join("cache");

    let config = EffectiveConfig::build(
        None,
        Some(serde_json::json!({ "repository": { "local_cache": &cache } })),
    )
    .unwrap();
    let mut factory = LocalRepositoryFactory::new(config.retry_policy());
    if let Some(cache) = config.local_cache() {
        factory = factory.with_local_cache(cache);
    }
    let mut session = ChannelSession::new(channels, Arc::new(factory), None).unwrap();

    let lib = session
        .resolve_artifact(&ArtifactRequest::new("org.example", "lib"))
        .unwrap();
    assert!(lib.file.starts_with(&cache), "{}", lib.file.display());

    let recorded = session.recorded_channels().unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].definition.repositories[0].id, "local");
}
