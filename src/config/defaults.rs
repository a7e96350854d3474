//! Built-in defaults (lowest layer)

use channel_repository::DEFAULT_MAX_RETRIES;
use serde::{Deserialize, Serialize};

/// Values used when no other layer sets them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Retries while the same artifacts keep failing
    pub max_retries: u32,

    /// Pause between retries in milliseconds (0 = no pause)
    pub retry_timeout_ms: u64,

    /// PKS keyservers asked for unknown signing keys
    pub keyservers: Vec<String>,

    /// Work without keyservers
    pub offline: bool,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_timeout_ms: 0,
            keyservers: Vec::new(),
            offline: false,
        }
    }
}

impl BuiltinDefaults {
    /// The defaults as a config layer
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "retry": {
                "max_retries": self.max_retries,
                "timeout_ms": self.retry_timeout_ms
            },
            "signature": {
                "keyservers": self.keyservers
            },
            "repository": {
                "offline": self.offline
            }
        })
    }
}
