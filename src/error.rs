//! Session error taxonomy
//!
//! Errors fall in four families, reported through [`ChannelError::kind`]:
//! - configuration: malformed documents, duplicate manifest ids, cycles
//! - unresolved: no version or file for a query
//! - transfer: repository failures after the retry budget
//! - trust: missing, invalid, expired or revoked signatures

use std::fmt;
use std::io;

use channel_model::ModelError;
use channel_repository::RepositoryError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::signature::{SignatureError, SignatureResult};

/// Error family, used for exit codes and log fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Unresolved,
    Transfer,
    Trust,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Unresolved => "unresolved",
            Self::Transfer => "transfer",
            Self::Trust => "trust",
            Self::Io => "io",
        }
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration => 2,
            Self::Unresolved => 3,
            Self::Transfer => 4,
            Self::Trust => 5,
            Self::Io => 6,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from channel sessions
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid channel document: {0}")]
    Model(#[from] ModelError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("signature handling failed: {0}")]
    Signature(#[from] SignatureError),

    #[error("manifest id '{id}' is declared by more than one channel: {channels:?}")]
    DuplicateManifestId { id: String, channels: Vec<String> },

    #[error("cyclic manifest dependency between '{from}' and '{to}'")]
    CyclicDependency { from: String, to: String },

    #[error("channel '{channel}' is already being initialized")]
    ReentrantInitialization { channel: String },

    #[error("required manifest '{id}' of channel '{channel}' was not found")]
    RequiredManifestNotFound { id: String, channel: String },

    #[error("unable to resolve required manifest '{id}' of channel '{channel}': {cause}")]
    UnresolvedRequiredManifest {
        id: String,
        channel: String,
        #[source]
        cause: Box<ChannelError>,
    },

    #[error("invalid reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("unable to resolve {artifacts:?} in repositories {repositories:?}")]
    Unresolved {
        artifacts: Vec<String>,
        repositories: Vec<String>,
    },

    #[error("signature check failed for {artifact}: {result}")]
    Trust {
        artifact: String,
        result: SignatureResult,
    },

    #[error("channel '{channel}' requires signatures but no signature validator is configured")]
    SignatureValidatorMissing { channel: String },

    #[error("channel session is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChannelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Model(_)
            | Self::Config(_)
            | Self::DuplicateManifestId { .. }
            | Self::CyclicDependency { .. }
            | Self::ReentrantInitialization { .. }
            | Self::InvalidReference { .. }
            | Self::SignatureValidatorMissing { .. }
            | Self::Yaml(_)
            | Self::Json(_) => ErrorKind::Configuration,
            Self::Repository(e) => match e {
                RepositoryError::Unresolved { .. } => ErrorKind::Unresolved,
                RepositoryError::Io(_) => ErrorKind::Io,
                RepositoryError::UnsupportedUrl { .. } => ErrorKind::Configuration,
                _ => ErrorKind::Transfer,
            },
            Self::RequiredManifestNotFound { .. }
            | Self::UnresolvedRequiredManifest { .. }
            | Self::Unresolved { .. } => ErrorKind::Unresolved,
            Self::Trust { .. } | Self::Signature(_) => ErrorKind::Trust,
            Self::Closed => ErrorKind::Configuration,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    /// Whether the artifacts could not be obtained: not found, or still
    /// failing once the retry budget is spent.
    pub fn is_unresolved(&self) -> bool {
        matches!(
            self,
            Self::Unresolved { .. }
                | Self::Repository(RepositoryError::Unresolved { .. })
                | Self::Repository(RepositoryError::Transfer { .. })
        )
    }

    /// The failed coordinates and attempted repositories of an unresolved error
    pub(crate) fn into_unresolved_parts(self) -> Result<(Vec<String>, Vec<String>), Self> {
        match self {
            Self::Unresolved {
                artifacts,
                repositories,
            }
            | Self::Repository(RepositoryError::Unresolved {
                artifacts,
                repositories,
            })
            | Self::Repository(RepositoryError::Transfer {
                artifacts,
                repositories,
                ..
            }) => Ok((artifacts, repositories)),
            other => Err(other),
        }
    }

    /// Graph errors that must surface unchanged through requirement resolution
    pub(crate) fn is_graph_error(&self) -> bool {
        matches!(
            self,
            Self::CyclicDependency { .. }
                | Self::ReentrantInitialization { .. }
                | Self::DuplicateManifestId { .. }
        )
    }
}

/// Result type for session operations
pub type ChannelResult<T> = Result<T, ChannelError>;
