//! Remote key lookup
//!
//! Keyservers answer the PKS `get` operation:
//! `<server>/pks/lookup?op=get&options=mr&search=0x<KEYID>`.

use std::fs;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use super::key::{parse_key_ring, PublicKeyRecord};
use super::{SignatureError, SignatureOutcome};

/// Downloads the content behind a URL. `Ok(None)` means nothing is there.
pub trait UrlFetcher: Send + Sync {
    fn fetch(&self, url: &Url) -> SignatureOutcome<Option<Vec<u8>>>;
}

/// Serves `file:` URLs from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl UrlFetcher for FileFetcher {
    fn fetch(&self, url: &Url) -> SignatureOutcome<Option<Vec<u8>>> {
        if url.scheme() != "file" {
            warn!(%url, "only file URLs can be fetched, skipping");
            return Ok(None);
        }
        let path = url.to_file_path().map_err(|_| SignatureError::InvalidUrl {
            url: url.to_string(),
            reason: "not a local path".to_string(),
        })?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Default time allowed for one key download
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Downloads `http` and `https` URLs; `file` URLs are read from disk
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: Duration,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_HTTP_TIMEOUT)
    }
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn get(&self, url: &Url) -> SignatureOutcome<Option<Vec<u8>>> {
        debug!(%url, "downloading");
        let response = ureq::get(url.as_str()).timeout(self.timeout).call();
        if let Some(error) = response.synthetic_error() {
            return Err(SignatureError::Http {
                url: url.to_string(),
                reason: error.to_string(),
            });
        }
        match response.status() {
            200..=299 => {
                let mut bytes = Vec::new();
                response.into_reader().read_to_end(&mut bytes)?;
                Ok(Some(bytes))
            }
            404 | 410 => Ok(None),
            status => Err(SignatureError::Http {
                url: url.to_string(),
                reason: format!("HTTP status {}", status),
            }),
        }
    }
}

impl UrlFetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> SignatureOutcome<Option<Vec<u8>>> {
        match url.scheme() {
            "http" | "https" => self.get(url),
            "file" => FileFetcher.fetch(url),
            scheme => {
                warn!(%url, scheme, "unsupported URL scheme, skipping");
                Ok(None)
            }
        }
    }
}

/// A source of public keys addressed by key id
pub trait Keyserver: Send + Sync {
    fn name(&self) -> String;

    /// The key ring holding `key_id`, if the server knows it
    fn lookup(&self, key_id: &str) -> SignatureOutcome<Option<Vec<PublicKeyRecord>>>;
}

/// Keyserver speaking the PKS lookup protocol
pub struct PksKeyserver {
    base: Url,
    fetcher: Arc<dyn UrlFetcher>,
}

impl PksKeyserver {
    pub fn new(base: Url, fetcher: Arc<dyn UrlFetcher>) -> Self {
        Self { base, fetcher }
    }

    pub fn lookup_url(&self, key_id: &str) -> SignatureOutcome<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SignatureError::InvalidUrl {
                url: self.base.to_string(),
                reason: "keyserver URL cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .extend(["pks", "lookup"]);
        url.query_pairs_mut()
            .clear()
            .append_pair("op", "get")
            .append_pair("options", "mr")
            .append_pair("search", &format!("0x{}", key_id.to_ascii_uppercase()));
        Ok(url)
    }
}

impl Keyserver for PksKeyserver {
    fn name(&self) -> String {
        self.base.to_string()
    }

    fn lookup(&self, key_id: &str) -> SignatureOutcome<Option<Vec<PublicKeyRecord>>> {
        let url = self.lookup_url(key_id)?;
        debug!(%url, key_id, "querying keyserver");
        let Some(bytes) = self.fetcher.fetch(&url)? else {
            return Ok(None);
        };
        let ring = parse_key_ring(&bytes)?;
        if ring.iter().any(|record| record.find(key_id).is_some()) {
            Ok(Some(ring))
        } else {
            warn!(%url, key_id, "keyserver answered with unrelated keys");
            Ok(None)
        }
    }
}
