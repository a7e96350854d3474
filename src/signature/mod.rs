//! Detached signatures and key trust
//!
//! Artifacts of signature-checking channels are published with a detached
//! `.asc` signature next to them. Signing keys are looked up in the local
//! trust store, then on keyservers, then at the key URLs a channel declares;
//! keys found remotely are trusted on first use.

mod key;
mod keyserver;
mod listener;
mod pipeline;
mod trust_store;
mod validator;

use std::io;

use thiserror::Error;

pub use key::{
    key_id, parse_key_ring, DetachedSignature, KeyMatch, PublicKeyRecord, Revocation,
    SecretKeyFile, SubkeyRecord, SIGNATURE_ALGORITHM,
};
pub use keyserver::{
    FileFetcher, HttpFetcher, Keyserver, PksKeyserver, UrlFetcher, DEFAULT_HTTP_TIMEOUT,
};
pub use listener::{LoggingListener, ValidationListener};
pub use pipeline::{FetchRequest, FetchStage, Fetched, Location, Pipeline, Stage, VerifyStage};
pub use trust_store::{FileTrustStore, ImportPolicy, MemoryTrustStore, TrustStore};
pub use validator::{KeyringValidator, SignatureResult, SignatureValidator};

/// Errors from key and signature handling
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid key {key_id}: {reason}")]
    InvalidKey { key_id: String, reason: String },

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("download of {url} failed: {reason}")]
    Http { url: String, reason: String },
}

/// Result type for signature operations
pub type SignatureOutcome<T> = Result<T, SignatureError>;
