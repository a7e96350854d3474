//! Ed25519 keys, key rings and detached signatures
//!
//! A key ring is a JSON array of [`PublicKeyRecord`]s. A record may carry
//! signing sub-keys; a signature names the (sub-)key that produced it by
//! its key id, the first eight bytes of the SHA-256 of the public key in
//! upper-case hex.

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{SignatureError, SignatureOutcome};

/// Signature algorithm identifier
pub const SIGNATURE_ALGORITHM: &str = "Ed25519";

/// Key id of a public key
pub fn key_id(key: &VerifyingKey) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode_upper(&digest[..8])
}

fn decode_verifying_key(key_id: &str, encoded: &str) -> SignatureOutcome<VerifyingKey> {
    let bytes = STANDARD.decode(encoded)?;
    let bytes: [u8; 32] = bytes.try_into().map_err(|_| SignatureError::InvalidKey {
        key_id: key_id.to_string(),
        reason: "public key must be 32 bytes".to_string(),
    })?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| SignatureError::InvalidKey {
        key_id: key_id.to_string(),
        reason: e.to_string(),
    })
}

/// Revocation of a key or sub-key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A signing sub-key bound to a primary key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubkeyRecord {
    pub key_id: String,
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation: Option<Revocation>,
}

impl SubkeyRecord {
    pub fn new(key: &VerifyingKey) -> Self {
        Self {
            key_id: key_id(key),
            public_key: STANDARD.encode(key.as_bytes()),
            revocation: None,
        }
    }

    pub fn revoked(mut self, reason: Option<&str>) -> Self {
        self.revocation = Some(Revocation {
            reason: reason.map(str::to_string),
        });
        self
    }
}

/// A public key as published in a key ring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyRecord {
    pub key_id: String,
    pub public_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Validity after creation; 0 means the key never expires
    #[serde(default)]
    pub valid_seconds: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation: Option<Revocation>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subkeys: Vec<SubkeyRecord>,
}

impl PublicKeyRecord {
    pub fn new(key: &VerifyingKey) -> Self {
        Self {
            key_id: key_id(key),
            public_key: STANDARD.encode(key.as_bytes()),
            user_id: None,
            created_at: Utc::now(),
            valid_seconds: 0,
            revocation: None,
            subkeys: Vec::new(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_validity(mut self, created_at: DateTime<Utc>, valid_seconds: u64) -> Self {
        self.created_at = created_at;
        self.valid_seconds = valid_seconds;
        self
    }

    pub fn with_subkey(mut self, subkey: SubkeyRecord) -> Self {
        self.subkeys.push(subkey);
        self
    }

    pub fn revoked(mut self, reason: Option<&str>) -> Self {
        self.revocation = Some(Revocation {
            reason: reason.map(str::to_string),
        });
        self
    }

    /// The primary key or sub-key with this id
    pub fn find(&self, key_id: &str) -> Option<KeyMatch<'_>> {
        if self.key_id.eq_ignore_ascii_case(key_id) {
            return Some(KeyMatch {
                primary: self,
                subkey: None,
            });
        }
        self.subkeys
            .iter()
            .find(|s| s.key_id.eq_ignore_ascii_case(key_id))
            .map(|subkey| KeyMatch {
                primary: self,
                subkey: Some(subkey),
            })
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.valid_seconds == 0 {
            return None;
        }
        let seconds = i64::try_from(self.valid_seconds).unwrap_or(i64::MAX);
        Duration::try_seconds(seconds).and_then(|d| self.created_at.checked_add_signed(d))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expiry| now >= expiry)
    }

    /// Check that every key id matches its public key
    pub fn check(&self) -> SignatureOutcome<()> {
        let primary = decode_verifying_key(&self.key_id, &self.public_key)?;
        if !key_id(&primary).eq_ignore_ascii_case(&self.key_id) {
            return Err(SignatureError::InvalidKey {
                key_id: self.key_id.clone(),
                reason: "key id does not match the public key".to_string(),
            });
        }
        for subkey in &self.subkeys {
            let key = decode_verifying_key(&subkey.key_id, &subkey.public_key)?;
            if !key_id(&key).eq_ignore_ascii_case(&subkey.key_id) {
                return Err(SignatureError::InvalidKey {
                    key_id: subkey.key_id.clone(),
                    reason: "sub-key id does not match the public key".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A key found in a [`PublicKeyRecord`]
#[derive(Debug, Clone, Copy)]
pub struct KeyMatch<'a> {
    pub primary: &'a PublicKeyRecord,
    pub subkey: Option<&'a SubkeyRecord>,
}

impl KeyMatch<'_> {
    pub fn key_id(&self) -> &str {
        match self.subkey {
            Some(subkey) => &subkey.key_id,
            None => &self.primary.key_id,
        }
    }

    /// Revocation of the primary key, else of the matched sub-key
    pub fn revocation(&self) -> Option<&Revocation> {
        self.primary
            .revocation
            .as_ref()
            .or_else(|| self.subkey.and_then(|s| s.revocation.as_ref()))
    }

    pub fn verifying_key(&self) -> SignatureOutcome<VerifyingKey> {
        match self.subkey {
            Some(subkey) => decode_verifying_key(&subkey.key_id, &subkey.public_key),
            None => decode_verifying_key(&self.primary.key_id, &self.primary.public_key),
        }
    }
}

/// Parse a key ring: a JSON array of records, or a single record.
pub fn parse_key_ring(bytes: &[u8]) -> SignatureOutcome<Vec<PublicKeyRecord>> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    let records: Vec<PublicKeyRecord> = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    for record in &records {
        record.check()?;
    }
    Ok(records)
}

/// Detached signature published as `<artifact>.asc`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachedSignature {
    pub key_id: String,
    pub algorithm: String,
    /// Base64-encoded signature over the artifact bytes
    pub signature: String,
}

impl DetachedSignature {
    pub fn sign(content: &[u8], signing_key: &SigningKey) -> Self {
        let signature = signing_key.sign(content);
        Self {
            key_id: key_id(&signing_key.verifying_key()),
            algorithm: SIGNATURE_ALGORITHM.to_string(),
            signature: STANDARD.encode(signature.to_bytes()),
        }
    }

    pub fn parse(bytes: &[u8]) -> SignatureOutcome<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Whether this signature was made over `content` by `key`
    pub fn verify(&self, content: &[u8], key: &VerifyingKey) -> bool {
        if self.algorithm != SIGNATURE_ALGORITHM {
            return false;
        }
        let Ok(bytes) = STANDARD.decode(&self.signature) else {
            return false;
        };
        match Signature::from_slice(&bytes) {
            Ok(signature) => key.verify(content, &signature).is_ok(),
            Err(_) => false,
        }
    }
}

/// A signing key with its public record, as written by `channels keygen`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretKeyFile {
    pub secret_key: String,
    pub public: PublicKeyRecord,
}

impl SecretKeyFile {
    pub fn generate(user_id: Option<&str>) -> Self {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        let mut public = PublicKeyRecord::new(&signing_key.verifying_key());
        public.user_id = user_id.map(str::to_string);
        Self {
            secret_key: STANDARD.encode(signing_key.to_bytes()),
            public,
        }
    }

    pub fn signing_key(&self) -> SignatureOutcome<SigningKey> {
        let bytes = STANDARD.decode(&self.secret_key)?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| SignatureError::InvalidKey {
            key_id: self.public.key_id.clone(),
            reason: "secret key must be 32 bytes".to_string(),
        })?;
        Ok(SigningKey::from_bytes(&bytes))
    }

    pub fn load(path: &Path) -> SignatureOutcome<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> SignatureOutcome<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
