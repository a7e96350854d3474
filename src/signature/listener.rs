//! Audit hook for signature checks

use tracing::{info, warn};

use super::key::PublicKeyRecord;
use super::validator::SignatureResult;

/// Observes every signature check made by a validator
pub trait ValidationListener: Send + Sync {
    fn signature_correct(&self, identifier: &str, key: &PublicKeyRecord);

    fn signature_invalid(&self, identifier: &str, result: &SignatureResult);
}

/// Reports checks through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

impl ValidationListener for LoggingListener {
    fn signature_correct(&self, identifier: &str, key: &PublicKeyRecord) {
        info!(
            artifact = identifier,
            key_id = %key.key_id,
            user_id = key.user_id.as_deref().unwrap_or(""),
            "signature verified"
        );
    }

    fn signature_invalid(&self, identifier: &str, result: &SignatureResult) {
        warn!(artifact = identifier, %result, "signature rejected");
    }
}
