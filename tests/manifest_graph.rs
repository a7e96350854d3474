//! Manifest Graph Tests
//!
//! Session construction over channels whose manifests require each other:
//! cycle detection, duplicate manifest ids, channels created for required
//! manifests and the exactly-once release of repository clients.

mod fixtures;

use artifact_channels::model::{
    ChannelDefinition, ChannelManifest, ChannelReference, ManifestRequirement, MavenCoordinate,
    Repository, Stream,
};
use artifact_channels::{ArtifactRequest, ChannelError, ChannelSession, ErrorKind};
use fixtures::{channel, central, Fixture, DOCUMENTS_GROUP};

fn requires(id: &str) -> ManifestRequirement {
    ManifestRequirement::new(id)
}

fn requires_published(id: &str, artifact_id: &str) -> ManifestRequirement {
    ManifestRequirement::new(id).with_maven(MavenCoordinate::new(DOCUMENTS_GROUP, artifact_id))
}

fn assert_all_closed_once(fixture: &Fixture) {
    let clients = fixture.repos.clients();
    assert!(!clients.is_empty());
    for client in clients {
        assert_eq!(client.close_calls, 1, "client {:?}", client.repositories);
    }
}

// =============================================================================
// Cycles
// =============================================================================

#[test]
fn test_self_requirement_is_a_cycle() {
    let fixture = Fixture::new();
    fixture.publish_manifest(
        "a-manifest",
        "1.0",
        &ChannelManifest::new().with_id("a").with_requirement(requires("a")),
    );

    let result = ChannelSession::new(vec![channel("A", "a-manifest")], fixture.factory(), None);

    match result {
        Err(ChannelError::CyclicDependency { from, to }) => {
            assert_eq!(from, "a");
            assert_eq!(to, "a");
        }
        other => panic!("expected a cycle, got {:?}", other.err()),
    }
    assert_all_closed_once(&fixture);
}

#[test]
fn test_two_channel_cycle() {
    let fixture = Fixture::new();
    fixture.publish_manifest(
        "a-manifest",
        "1.0",
        &ChannelManifest::new().with_id("a").with_requirement(requires("b")),
    );
    fixture.publish_manifest(
        "b-manifest",
        "1.0",
        &ChannelManifest::new().with_id("b").with_requirement(requires("a")),
    );

    let err = ChannelSession::new(
        vec![channel("A", "a-manifest"), channel("B", "b-manifest")],
        fixture.factory(),
        None,
    )
    .err()
    .unwrap();

    assert!(matches!(err, ChannelError::CyclicDependency { .. }), "{}", err);
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_all_closed_once(&fixture);
}

#[test]
fn test_cycle_through_created_channels() {
    let fixture = Fixture::new();
    fixture.publish_manifest(
        "a-manifest",
        "1.0",
        &ChannelManifest::new()
            .with_id("a")
            .with_requirement(requires_published("b", "b-manifest")),
    );
    fixture.publish_manifest(
        "b-manifest",
        "1.0",
        &ChannelManifest::new()
            .with_id("b")
            .with_requirement(requires_published("c", "c-manifest")),
    );
    fixture.publish_manifest(
        "c-manifest",
        "1.0",
        &ChannelManifest::new().with_id("c").with_requirement(requires("a")),
    );

    let err = ChannelSession::new(vec![channel("A", "a-manifest")], fixture.factory(), None)
        .err()
        .unwrap();

    assert!(matches!(err, ChannelError::CyclicDependency { .. }), "{}", err);
    // A plus the channels created for b and c
    assert_eq!(fixture.repos.clients().len(), 3);
    assert_all_closed_once(&fixture);
}

#[test]
fn test_diamond_is_not_a_cycle() {
    let fixture = Fixture::new();
    fixture.publish_manifest(
        "a-manifest",
        "1.0",
        &ChannelManifest::new()
            .with_id("a")
            .with_requirement(requires("b"))
            .with_requirement(requires("c")),
    );
    fixture.publish_manifest(
        "b-manifest",
        "1.0",
        &ChannelManifest::new().with_id("b").with_requirement(requires("d")),
    );
    fixture.publish_manifest(
        "c-manifest",
        "1.0",
        &ChannelManifest::new().with_id("c").with_requirement(requires("d")),
    );
    fixture.publish_manifest("d-manifest", "1.0", &ChannelManifest::new().with_id("d"));

    let session = ChannelSession::new(
        vec![
            channel("A", "a-manifest"),
            channel("B", "b-manifest"),
            channel("C", "c-manifest"),
            channel("D", "d-manifest"),
        ],
        fixture.factory(),
        None,
    )
    .unwrap();

    let mut required = session.required_channels("A");
    required.sort();
    assert_eq!(required, vec!["B", "C", "D"]);
}

// =============================================================================
// Manifest ids
// =============================================================================

#[test]
fn test_duplicate_manifest_ids_are_rejected() {
    let fixture = Fixture::new();
    let manifest = ChannelManifest::new().with_id("shared");
    fixture.publish_manifest("first", "1.0", &manifest);
    fixture.publish_manifest("second", "1.0", &manifest);

    let err = ChannelSession::new(
        vec![channel("A", "first"), channel("B", "second")],
        fixture.factory(),
        None,
    )
    .err()
    .unwrap();

    match err {
        ChannelError::DuplicateManifestId { id, channels } => {
            assert_eq!(id, "shared");
            assert_eq!(channels, vec!["A", "B"]);
        }
        other => panic!("expected duplicate id error, got {}", other),
    }
    assert_all_closed_once(&fixture);
}

#[test]
fn test_required_manifest_not_found() {
    let fixture = Fixture::new();
    fixture.publish_manifest(
        "a-manifest",
        "1.0",
        &ChannelManifest::new().with_id("a").with_requirement(requires("missing")),
    );

    let err = ChannelSession::new(vec![channel("A", "a-manifest")], fixture.factory(), None)
        .err()
        .unwrap();

    match err {
        ChannelError::RequiredManifestNotFound { id, channel } => {
            assert_eq!(id, "missing");
            assert_eq!(channel, "A");
        }
        other => panic!("expected missing requirement, got {}", other),
    }
}

#[test]
fn test_unpublished_required_manifest() {
    let fixture = Fixture::new();
    fixture.publish_manifest(
        "a-manifest",
        "1.0",
        &ChannelManifest::new()
            .with_id("a")
            .with_requirement(requires_published("core", "core-manifest")),
    );

    let err = ChannelSession::new(vec![channel("A", "a-manifest")], fixture.factory(), None)
        .err()
        .unwrap();

    match &err {
        ChannelError::UnresolvedRequiredManifest { id, cause, .. } => {
            assert_eq!(id, "core");
            assert!(cause.is_unresolved(), "{}", cause);
        }
        other => panic!("expected unresolved requirement, got {}", other),
    }
    assert_eq!(err.kind(), ErrorKind::Unresolved);
}

#[test]
fn test_missing_manifest_fails_construction() {
    let fixture = Fixture::new();

    let err = ChannelSession::new(vec![channel("A", "nowhere")], fixture.factory(), None)
        .err()
        .unwrap();

    assert!(err.is_unresolved(), "{}", err);
    assert_all_closed_once(&fixture);
}

// =============================================================================
// Channels created for required manifests
// =============================================================================

#[test]
fn test_required_manifest_from_repository() {
    let fixture = Fixture::new();
    fixture.publish_manifest(
        "a-manifest",
        "1.0",
        &ChannelManifest::new()
            .with_id("a")
            .with_requirement(requires_published("core", "core-manifest")),
    );
    fixture.publish_manifest(
        "core-manifest",
        "1.0",
        &ChannelManifest::new()
            .with_id("core")
            .with_stream(Stream::fixed("org.example", "lib", "1.0").unwrap()),
    );
    fixture.publish_manifest(
        "core-manifest",
        "1.1",
        &ChannelManifest::new()
            .with_id("core")
            .with_stream(Stream::fixed("org.example", "lib", "1.1").unwrap()),
    );

    let session = ChannelSession::new(vec![channel("A", "a-manifest")], fixture.factory(), None)
        .unwrap();

    assert_eq!(session.dependency_channels(), vec!["core"]);
    assert_eq!(session.required_channels("A"), vec!["core"]);

    let records = session.manifest_records();
    let core = records.iter().find(|r| r.channel == "core").unwrap();
    assert_eq!(
        core.manifest,
        ChannelReference::Maven(
            MavenCoordinate::new(DOCUMENTS_GROUP, "core-manifest").with_version("1.1")
        )
    );

    let found = session
        .resolve_version(&ArtifactRequest::new("org.example", "lib"))
        .unwrap()
        .unwrap();
    assert_eq!(found.version, "1.1");
    assert_eq!(found.channel, "core");
}

#[test]
fn test_pinned_required_manifest_version() {
    let fixture = Fixture::new();
    let requirement = ManifestRequirement::new("core").with_maven(
        MavenCoordinate::new(DOCUMENTS_GROUP, "core-manifest").with_version("1.0"),
    );
    fixture.publish_manifest(
        "a-manifest",
        "1.0",
        &ChannelManifest::new().with_id("a").with_requirement(requirement),
    );
    for version in ["1.0", "2.0"] {
        fixture.publish_manifest(
            "core-manifest",
            version,
            &ChannelManifest::new()
                .with_id("core")
                .with_stream(Stream::fixed("org.example", "lib", version).unwrap()),
        );
    }

    let session = ChannelSession::new(vec![channel("A", "a-manifest")], fixture.factory(), None)
        .unwrap();

    let found = session
        .find_latest_version(&ArtifactRequest::new("org.example", "lib"))
        .unwrap();
    assert_eq!(found.version, "1.0");
}

#[test]
fn test_shared_requirement_creates_one_channel() {
    let fixture = Fixture::new();
    for name in ["a", "b"] {
        fixture.publish_manifest(
            &format!("{}-manifest", name),
            "1.0",
            &ChannelManifest::new()
                .with_id(name)
                .with_requirement(requires_published("core", "core-manifest")),
        );
    }
    fixture.publish_manifest("core-manifest", "1.0", &ChannelManifest::new().with_id("core"));

    let session = ChannelSession::new(
        vec![channel("A", "a-manifest"), channel("B", "b-manifest")],
        fixture.factory(),
        None,
    )
    .unwrap();

    assert_eq!(session.dependency_channels(), vec!["core"]);
    assert_eq!(session.required_channels("A"), vec!["core"]);
    assert_eq!(session.required_channels("B"), vec!["core"]);
    assert_eq!(fixture.repos.clients().len(), 3);
}

// =============================================================================
// Client lifecycle
// =============================================================================

#[test]
fn test_close_releases_every_client_once() {
    let fixture = Fixture::new();
    fixture.publish_manifest(
        "a-manifest",
        "1.0",
        &ChannelManifest::new()
            .with_id("a")
            .with_requirement(requires_published("core", "core-manifest")),
    );
    fixture.publish_manifest("core-manifest", "1.0", &ChannelManifest::new().with_id("core"));

    let mut session = ChannelSession::new(vec![channel("A", "a-manifest")], fixture.factory(), None)
        .unwrap();
    session.close().unwrap();
    session.close().unwrap();
    drop(session);

    assert_eq!(fixture.repos.clients().len(), 2);
    assert_all_closed_once(&fixture);
}

#[test]
fn test_drop_closes_clients() {
    let fixture = Fixture::new();
    fixture.publish_manifest("a-manifest", "1.0", &ChannelManifest::new());

    let session = ChannelSession::new(vec![channel("A", "a-manifest")], fixture.factory(), None)
        .unwrap();
    drop(session);

    assert_all_closed_once(&fixture);
}

#[test]
fn test_failed_close_still_closes_the_rest() {
    let fixture = Fixture::new();
    fixture.publish_manifest("a-manifest", "1.0", &ChannelManifest::new());
    fixture.repos.fail_close("broken");

    let broken = ChannelDefinition::new()
        .with_name("B")
        .with_repository(Repository::new("broken", "mock://broken"));
    let mut session = ChannelSession::new(
        vec![channel("A", "a-manifest"), broken],
        fixture.factory(),
        None,
    )
    .unwrap();

    let err = session.close().err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Transfer);
    assert_all_closed_once(&fixture);

    // already closed
    assert!(session.close().is_ok());
    drop(session);
    assert_all_closed_once(&fixture);
}

#[test]
fn test_closed_session_rejects_queries() {
    let fixture = Fixture::new();
    let mut session = ChannelSession::new(
        vec![ChannelDefinition::new().with_name("bare").with_repository(central())],
        fixture.factory(),
        None,
    )
    .unwrap();
    session.close().unwrap();

    let result = session.resolve_version(&ArtifactRequest::new("org.example", "lib"));
    assert!(matches!(result, Err(ChannelError::Closed)));
    let result = session.resolve_artifact(&ArtifactRequest::new("org.example", "lib"));
    assert!(matches!(result, Err(ChannelError::Closed)));
}
