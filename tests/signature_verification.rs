//! Signature Verification Tests
//!
//! Channels that require signatures: detached signatures on artifacts and
//! manifests, trust on first use through key URLs and keyservers, and the
//! trust failures (missing, invalid, unknown, revoked and expired keys).

mod fixtures;

use std::fs;
use std::sync::Arc;

use artifact_channels::model::mapper::manifest_to_yaml;
use artifact_channels::model::{ChannelDefinition, ChannelManifest, NoStreamStrategy, Stream};
use artifact_channels::repository::RetryPolicy;
use artifact_channels::signature::{
    DetachedSignature, FileFetcher, FileTrustStore, KeyringValidator, MemoryTrustStore,
    PksKeyserver, PublicKeyRecord, SecretKeyFile, SignatureValidator, TrustStore,
};
use artifact_channels::{ArtifactRequest, ChannelError, ChannelSession, ErrorKind, SignatureResult};
use chrono::{Duration, Utc};
use fixtures::{central, jar, latest_reference, manifest_coordinate, Fixture};
use url::Url;

const CONTENT: &str = "org.example:lib:1.0";

fn signing_key() -> SecretKeyFile {
    SecretKeyFile::generate(Some("Release Team <release@example.org>"))
}

fn trusting(key: &PublicKeyRecord) -> Arc<dyn SignatureValidator> {
    let store = MemoryTrustStore::new().with_key(key.clone());
    Arc::new(KeyringValidator::new(Arc::new(store)))
}

fn signed_channel(key_urls: Vec<String>) -> ChannelDefinition {
    ChannelDefinition::new()
        .with_name("signed")
        .with_repository(central())
        .with_manifest(latest_reference("signed-manifest"))
        .with_no_stream_strategy(NoStreamStrategy::None)
        .with_signature_check(key_urls)
}

/// Publish a signed manifest pinning `org.example:lib` to 1.0 and the jar itself
fn publish_signed(fixture: &Fixture, key: &SecretKeyFile, sign_jar: bool) {
    let manifest =
        ChannelManifest::new().with_stream(Stream::fixed("org.example", "lib", "1.0").unwrap());
    let yaml = manifest_to_yaml(&manifest).unwrap();
    fixture.publish_manifest("signed-manifest", "1.0", &manifest);
    fixture.publish_signature(&manifest_coordinate("signed-manifest", "1.0"), yaml.as_bytes(), key);

    fixture.publish_versions("org.example", "lib", &["1.0"]);
    if sign_jar {
        fixture.publish_signature(&jar("org.example", "lib", "1.0"), CONTENT.as_bytes(), key);
    }
}

fn trust_failure(err: ChannelError) -> SignatureResult {
    assert_eq!(err.kind(), ErrorKind::Trust, "{}", err);
    match err {
        ChannelError::Trust { result, .. } => result,
        other => panic!("expected a trust error, got {}", other),
    }
}

fn lib() -> ArtifactRequest {
    ArtifactRequest::new("org.example", "lib")
}

// =============================================================================
// Signed channels
// =============================================================================

#[test]
fn test_signed_artifact_resolves() {
    let fixture = Fixture::new();
    let key = signing_key();
    publish_signed(&fixture, &key, true);

    let mut session = ChannelSession::new(
        vec![signed_channel(Vec::new())],
        fixture.factory(),
        Some(trusting(&key.public)),
    )
    .unwrap();

    let artifact = session.resolve_artifact(&lib()).unwrap();
    assert_eq!(fs::read_to_string(artifact.file).unwrap(), CONTENT);
}

#[test]
fn test_missing_signature_regardless_of_retries() {
    let policies = [
        RetryPolicy::none(),
        RetryPolicy {
            max_retries: 5,
            timeout: None,
        },
    ];
    for policy in policies {
        let fixture = Fixture::new();
        let key = signing_key();
        publish_signed(&fixture, &key, false);

        let mut session = ChannelSession::new(
            vec![signed_channel(Vec::new())],
            fixture.factory_with(policy),
            Some(trusting(&key.public)),
        )
        .unwrap();

        let err = session.resolve_artifact(&lib()).err().unwrap();
        assert_eq!(trust_failure(err), SignatureResult::NoSignature);
    }
}

#[test]
fn test_unsigned_manifest_fails_construction() {
    let fixture = Fixture::new();
    let key = signing_key();
    fixture.publish_manifest("signed-manifest", "1.0", &ChannelManifest::new());

    let err = ChannelSession::new(
        vec![signed_channel(Vec::new())],
        fixture.factory(),
        Some(trusting(&key.public)),
    )
    .err()
    .unwrap();

    assert_eq!(trust_failure(err), SignatureResult::NoSignature);
    assert!(fixture.repos.clients().iter().all(|c| c.close_calls == 1));
}

#[test]
fn test_tampered_artifact_is_invalid() {
    let fixture = Fixture::new();
    let key = signing_key();
    publish_signed(&fixture, &key, false);
    fixture.publish_signature(&jar("org.example", "lib", "1.0"), b"other content", &key);

    let mut session = ChannelSession::new(
        vec![signed_channel(Vec::new())],
        fixture.factory(),
        Some(trusting(&key.public)),
    )
    .unwrap();

    let result = trust_failure(session.resolve_artifact(&lib()).err().unwrap());
    assert_eq!(
        result,
        SignatureResult::Invalid {
            key_id: Some(key.public.key_id.clone())
        }
    );
}

#[test]
fn test_validator_is_required_for_signed_channels() {
    let fixture = Fixture::new();

    let err = ChannelSession::new(vec![signed_channel(Vec::new())], fixture.factory(), None)
        .err()
        .unwrap();

    assert!(
        matches!(err, ChannelError::SignatureValidatorMissing { ref channel } if channel == "signed"),
        "{}",
        err
    );
}

#[test]
fn test_direct_resolution_checks_signatures() {
    let fixture = Fixture::new();
    let key = signing_key();
    publish_signed(&fixture, &key, false);
    fixture.publish_versions("org.example", "lib", &["2.0"]);
    fixture.publish_signature(
        &jar("org.example", "lib", "2.0"),
        b"org.example:lib:2.0",
        &key,
    );

    let mut session = ChannelSession::new(
        vec![signed_channel(Vec::new())],
        fixture.factory(),
        Some(trusting(&key.public)),
    )
    .unwrap();

    assert!(session
        .resolve_direct_artifact(&jar("org.example", "lib", "2.0"))
        .is_ok());
    let err = session
        .resolve_direct_artifact(&jar("org.example", "lib", "1.0"))
        .err()
        .unwrap();
    assert_eq!(trust_failure(err), SignatureResult::NoSignature);
}

// =============================================================================
// Key lookup and trust on first use
// =============================================================================

#[test]
fn test_unknown_key_without_sources() {
    let fixture = Fixture::new();
    let key = signing_key();
    publish_signed(&fixture, &key, true);

    let validator: Arc<dyn SignatureValidator> =
        Arc::new(KeyringValidator::new(Arc::new(MemoryTrustStore::new())));
    let err = ChannelSession::new(vec![signed_channel(Vec::new())], fixture.factory(), Some(validator))
        .err()
        .unwrap();

    assert_eq!(
        trust_failure(err),
        SignatureResult::NoMatchingCert {
            key_id: key.public.key_id.clone()
        }
    );
}

#[test]
fn test_key_url_trusted_on_first_use() {
    let fixture = Fixture::new();
    let key = signing_key();
    publish_signed(&fixture, &key, true);

    let ring_path = fixture.path().join("release-keys.json");
    fs::write(&ring_path, serde_json::to_string(&vec![key.public.clone()]).unwrap()).unwrap();
    let ring_url = Url::from_file_path(&ring_path).unwrap().to_string();

    let store = Arc::new(FileTrustStore::open(fixture.path().join("trusted")).unwrap());
    let validator: Arc<dyn SignatureValidator> =
        Arc::new(KeyringValidator::new(store.clone() as Arc<dyn TrustStore>));

    let mut session = ChannelSession::new(
        vec![signed_channel(vec![ring_url])],
        fixture.factory(),
        Some(validator),
    )
    .unwrap();
    session.resolve_artifact(&lib()).unwrap();

    let trusted = store.keys().unwrap();
    assert_eq!(trusted.len(), 1);
    assert_eq!(trusted[0].key_id, key.public.key_id);
}

#[test]
fn test_import_policy_can_refuse_keys() {
    let fixture = Fixture::new();
    let key = signing_key();
    publish_signed(&fixture, &key, true);

    let ring_path = fixture.path().join("release-keys.json");
    fs::write(&ring_path, serde_json::to_string(&key.public).unwrap()).unwrap();
    let ring_url = Url::from_file_path(&ring_path).unwrap().to_string();

    let store = MemoryTrustStore::new().with_policy(Arc::new(|_: &PublicKeyRecord| false));
    let validator: Arc<dyn SignatureValidator> = Arc::new(KeyringValidator::new(Arc::new(store)));

    let err = ChannelSession::new(
        vec![signed_channel(vec![ring_url])],
        fixture.factory(),
        Some(validator),
    )
    .err()
    .unwrap();

    assert!(matches!(
        trust_failure(err),
        SignatureResult::NoMatchingCert { .. }
    ));
}

#[test]
fn test_keyserver_lookup() {
    let fixture = Fixture::new();
    let key = signing_key();
    publish_signed(&fixture, &key, true);

    // the PKS lookup path of a file-based keyserver
    let server_root = fixture.path().join("keyserver");
    fs::create_dir_all(server_root.join("pks")).unwrap();
    fs::write(
        server_root.join("pks").join("lookup"),
        serde_json::to_string(&vec![key.public.clone()]).unwrap(),
    )
    .unwrap();
    let base = Url::from_directory_path(&server_root).unwrap();

    let store = Arc::new(MemoryTrustStore::new());
    let validator = KeyringValidator::new(store.clone() as Arc<dyn TrustStore>)
        .with_keyserver(Box::new(PksKeyserver::new(base, Arc::new(FileFetcher))));

    let mut session = ChannelSession::new(
        vec![signed_channel(Vec::new())],
        fixture.factory(),
        Some(Arc::new(validator)),
    )
    .unwrap();
    session.resolve_artifact(&lib()).unwrap();

    assert_eq!(store.len(), 1);
}

// =============================================================================
// Key state
// =============================================================================

#[test]
fn test_revoked_key() {
    let key = signing_key();
    let content = b"payload";
    let signature = DetachedSignature::sign(content, &key.signing_key().unwrap())
        .to_json()
        .unwrap();

    let revoked = key.public.clone().revoked(Some("key compromised"));
    let result = trusting(&revoked)
        .validate("payload", content, signature.as_bytes(), &[])
        .unwrap();

    assert_eq!(
        result,
        SignatureResult::Revoked {
            key_id: key.public.key_id.clone(),
            reason: Some("key compromised".to_string()),
        }
    );
}

#[test]
fn test_expired_key() {
    let key = signing_key();
    let content = b"payload";
    let signature = DetachedSignature::sign(content, &key.signing_key().unwrap())
        .to_json()
        .unwrap();

    let expired = key
        .public
        .clone()
        .with_validity(Utc::now() - Duration::days(2), 3600);
    let result = trusting(&expired)
        .validate("payload", content, signature.as_bytes(), &[])
        .unwrap();

    assert_eq!(
        result,
        SignatureResult::Expired {
            key_id: key.public.key_id.clone()
        }
    );
}

#[test]
fn test_malformed_signature() {
    let key = signing_key();
    let result = trusting(&key.public)
        .validate("payload", b"payload", b"not a signature", &[])
        .unwrap();

    assert_eq!(result, SignatureResult::Invalid { key_id: None });
    assert!(!result.is_ok());
}
