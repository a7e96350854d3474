//! Trusted public keys
//!
//! Keys seen for the first time are offered to the store through
//! [`TrustStore::add`]; an optional import policy decides whether they are
//! accepted.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use super::key::PublicKeyRecord;
use super::SignatureOutcome;

/// Decides whether a newly seen key may be trusted
pub type ImportPolicy = Arc<dyn Fn(&PublicKeyRecord) -> bool + Send + Sync>;

/// Store of trusted keys
pub trait TrustStore: Send + Sync {
    /// The record holding `key_id` as primary key or sub-key
    fn get(&self, key_id: &str) -> SignatureOutcome<Option<PublicKeyRecord>>;

    /// Trust `keys`. Returns `false`, storing nothing, when any is rejected.
    fn add(&self, keys: &[PublicKeyRecord]) -> SignatureOutcome<bool>;
}

fn accepted(policy: &Option<ImportPolicy>, keys: &[PublicKeyRecord]) -> bool {
    match policy {
        Some(policy) => keys.iter().all(|key| policy(key)),
        None => true,
    }
}

/// Keeps keys in memory for the lifetime of the process
#[derive(Default)]
pub struct MemoryTrustStore {
    keys: Mutex<BTreeMap<String, PublicKeyRecord>>,
    policy: Option<ImportPolicy>,
}

impl MemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: ImportPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_key(self, key: PublicKeyRecord) -> Self {
        self.keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.key_id.clone(), key);
        self
    }

    pub fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrustStore for MemoryTrustStore {
    fn get(&self, key_id: &str) -> SignatureOutcome<Option<PublicKeyRecord>> {
        let keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        Ok(keys.values().find(|k| k.find(key_id).is_some()).cloned())
    }

    fn add(&self, keys: &[PublicKeyRecord]) -> SignatureOutcome<bool> {
        if !accepted(&self.policy, keys) {
            return Ok(false);
        }
        let mut stored = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        for key in keys {
            stored.insert(key.key_id.clone(), key.clone());
        }
        Ok(true)
    }
}

/// Directory of `<KEYID>.json` records
pub struct FileTrustStore {
    dir: PathBuf,
    policy: Option<ImportPolicy>,
}

impl FileTrustStore {
    /// Open the store, creating the directory when missing
    pub fn open(dir: impl Into<PathBuf>) -> SignatureOutcome<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, policy: None })
    }

    pub fn with_policy(mut self, policy: ImportPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key_id.to_ascii_uppercase()))
    }

    fn read_record(path: &Path) -> SignatureOutcome<Option<PublicKeyRecord>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Every stored record
    pub fn keys(&self) -> SignatureOutcome<Vec<PublicKeyRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable key"),
            }
        }
        Ok(records)
    }
}

impl TrustStore for FileTrustStore {
    fn get(&self, key_id: &str) -> SignatureOutcome<Option<PublicKeyRecord>> {
        if let Some(record) = Self::read_record(&self.record_path(key_id))? {
            return Ok(Some(record));
        }
        // sub-keys are stored under their primary key id
        Ok(self
            .keys()?
            .into_iter()
            .find(|record| record.find(key_id).is_some()))
    }

    fn add(&self, keys: &[PublicKeyRecord]) -> SignatureOutcome<bool> {
        if !accepted(&self.policy, keys) {
            debug!(count = keys.len(), "import policy rejected keys");
            return Ok(false);
        }
        for key in keys {
            let path = self.record_path(&key.key_id);
            fs::write(&path, serde_json::to_string_pretty(key)?)?;
            info!(key_id = %key.key_id, path = %path.display(), "trusted new key");
        }
        Ok(true)
    }
}
