//! Signature validation with trust on first use
//!
//! The signing key is taken from the trust store when present. Otherwise
//! configured keyservers are asked, then the key URLs declared by the
//! channel; a key ring found remotely is offered to the trust store before
//! revocation, expiry and the signature bytes are checked.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use url::Url;

use super::key::{parse_key_ring, DetachedSignature, PublicKeyRecord};
use super::keyserver::{HttpFetcher, Keyserver, UrlFetcher};
use super::listener::{LoggingListener, ValidationListener};
use super::trust_store::TrustStore;
use super::SignatureOutcome;

/// Outcome of a signature check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureResult {
    Ok { key_id: String },
    NoMatchingCert { key_id: String },
    Revoked { key_id: String, reason: Option<String> },
    Expired { key_id: String },
    NoSignature,
    Invalid { key_id: Option<String> },
}

impl SignatureResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn key_id(&self) -> Option<&str> {
        match self {
            Self::Ok { key_id }
            | Self::NoMatchingCert { key_id }
            | Self::Revoked { key_id, .. }
            | Self::Expired { key_id } => Some(key_id),
            Self::Invalid { key_id } => key_id.as_deref(),
            Self::NoSignature => None,
        }
    }
}

impl fmt::Display for SignatureResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok { key_id } => write!(f, "signed by {}", key_id),
            Self::NoMatchingCert { key_id } => write!(f, "no trusted certificate for key {}", key_id),
            Self::Revoked { key_id, reason } => match reason {
                Some(reason) => write!(f, "key {} is revoked: {}", key_id, reason),
                None => write!(f, "key {} is revoked", key_id),
            },
            Self::Expired { key_id } => write!(f, "key {} has expired", key_id),
            Self::NoSignature => f.write_str("no signature"),
            Self::Invalid { key_id: Some(key_id) } => {
                write!(f, "invalid signature by key {}", key_id)
            }
            Self::Invalid { key_id: None } => f.write_str("malformed signature"),
        }
    }
}

/// Checks a detached signature over artifact bytes
pub trait SignatureValidator: Send + Sync {
    fn validate(
        &self,
        identifier: &str,
        content: &[u8],
        signature: &[u8],
        key_urls: &[String],
    ) -> SignatureOutcome<SignatureResult>;
}

/// Validator backed by a trust store, keyservers and channel key URLs
pub struct KeyringValidator {
    trust_store: Arc<dyn TrustStore>,
    keyservers: Vec<Box<dyn Keyserver>>,
    fetcher: Arc<dyn UrlFetcher>,
    listener: Arc<dyn ValidationListener>,
    now: fn() -> DateTime<Utc>,
}

impl KeyringValidator {
    pub fn new(trust_store: Arc<dyn TrustStore>) -> Self {
        Self {
            trust_store,
            keyservers: Vec::new(),
            fetcher: Arc::new(HttpFetcher::default()),
            listener: Arc::new(LoggingListener),
            now: Utc::now,
        }
    }

    pub fn with_keyserver(mut self, keyserver: Box<dyn Keyserver>) -> Self {
        self.keyservers.push(keyserver);
        self
    }

    /// Fetcher used for channel key URLs
    pub fn with_fetcher(mut self, fetcher: Arc<dyn UrlFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ValidationListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_clock(mut self, now: fn() -> DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    fn from_keyservers(&self, key_id: &str) -> Option<Vec<PublicKeyRecord>> {
        for keyserver in &self.keyservers {
            match keyserver.lookup(key_id) {
                Ok(Some(ring)) => {
                    debug!(key_id, keyserver = %keyserver.name(), "key found on keyserver");
                    return Some(ring);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(key_id, keyserver = %keyserver.name(), error = %e, "keyserver lookup failed")
                }
            }
        }
        None
    }

    fn from_key_urls(&self, key_id: &str, key_urls: &[String]) -> Option<Vec<PublicKeyRecord>> {
        for key_url in key_urls {
            let url = match Url::parse(key_url) {
                Ok(url) => url,
                Err(e) => {
                    warn!(url = %key_url, error = %e, "ignoring malformed key URL");
                    continue;
                }
            };
            let ring = match self.fetcher.fetch(&url) {
                Ok(Some(bytes)) => parse_key_ring(&bytes),
                Ok(None) => continue,
                Err(e) => Err(e),
            };
            match ring {
                Ok(ring) if ring.iter().any(|r| r.find(key_id).is_some()) => {
                    debug!(key_id, %url, "key found at channel key URL");
                    return Some(ring);
                }
                Ok(_) => {}
                Err(e) => warn!(%url, error = %e, "unable to read key ring"),
            }
        }
        None
    }

    /// Find the record for `key_id`, trusting remotely found keys.
    fn locate(
        &self,
        key_id: &str,
        key_urls: &[String],
    ) -> SignatureOutcome<Result<PublicKeyRecord, SignatureResult>> {
        if let Some(record) = self.trust_store.get(key_id)? {
            return Ok(Ok(record));
        }

        let Some(ring) = self
            .from_keyservers(key_id)
            .or_else(|| self.from_key_urls(key_id, key_urls))
        else {
            return Ok(Err(SignatureResult::NoMatchingCert {
                key_id: key_id.to_string(),
            }));
        };

        if !self.trust_store.add(&ring)? {
            debug!(key_id, "trust store rejected key");
            return Ok(Err(SignatureResult::NoMatchingCert {
                key_id: key_id.to_string(),
            }));
        }
        let record = ring.into_iter().find(|r| r.find(key_id).is_some());
        Ok(record.ok_or_else(|| SignatureResult::NoMatchingCert {
            key_id: key_id.to_string(),
        }))
    }

    fn check(
        &self,
        content: &[u8],
        signature: &[u8],
        key_urls: &[String],
    ) -> SignatureOutcome<(SignatureResult, Option<PublicKeyRecord>)> {
        let Ok(signature) = DetachedSignature::parse(signature) else {
            return Ok((SignatureResult::Invalid { key_id: None }, None));
        };
        let key_id = signature.key_id.to_ascii_uppercase();

        let record = match self.locate(&key_id, key_urls)? {
            Ok(record) => record,
            Err(result) => return Ok((result, None)),
        };
        let Some(matched) = record.find(&key_id) else {
            return Ok((SignatureResult::NoMatchingCert { key_id }, None));
        };

        if let Some(revocation) = matched.revocation() {
            let result = SignatureResult::Revoked {
                key_id,
                reason: revocation.reason.clone(),
            };
            return Ok((result, None));
        }
        if record.is_expired((self.now)()) {
            return Ok((SignatureResult::Expired { key_id }, None));
        }

        let verifying_key = matched.verifying_key()?;
        if signature.verify(content, &verifying_key) {
            let result = SignatureResult::Ok { key_id };
            Ok((result, Some(record)))
        } else {
            Ok((SignatureResult::Invalid { key_id: Some(key_id) }, None))
        }
    }
}

impl SignatureValidator for KeyringValidator {
    fn validate(
        &self,
        identifier: &str,
        content: &[u8],
        signature: &[u8],
        key_urls: &[String],
    ) -> SignatureOutcome<SignatureResult> {
        let (result, record) = self.check(content, signature, key_urls)?;
        match &record {
            Some(record) => self.listener.signature_correct(identifier, record),
            None => self.listener.signature_invalid(identifier, &result),
        }
        Ok(result)
    }
}
