//! Error types for channel documents.

use thiserror::Error;

/// Errors raised while parsing or validating channel documents.
///
/// All of these are configuration errors: they are never retried.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid stream {group_id}:{artifact_id}: {reason}")]
    InvalidStream {
        group_id: String,
        artifact_id: String,
        reason: String,
    },

    #[error("invalid version pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("duplicate stream {group_id}:{artifact_id} in manifest")]
    DuplicateStream {
        group_id: String,
        artifact_id: String,
    },

    #[error("invalid blocklist entry {group_id}:{artifact_id}: {reason}")]
    InvalidBlocklistEntry {
        group_id: String,
        artifact_id: String,
        reason: String,
    },

    #[error("invalid manifest requirement: {reason}")]
    InvalidRequirement { reason: String },

    #[error("unsupported {document} schema version: {version}")]
    UnsupportedSchema {
        document: &'static str,
        version: String,
    },

    #[error("invalid coordinate '{value}': {reason}")]
    InvalidCoordinate { value: String, reason: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for document operations
pub type ModelResult<T> = Result<T, ModelError>;
