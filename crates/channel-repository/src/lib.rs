//! Repository clients
//!
//! The seam between channel resolution and the artifact repositories:
//! - [`RepositoryClient`]: version listing, artifact and document fetches
//! - [`RetryHandler`]: bounded retries of batch fetches
//! - [`LocalRepositoryClient`]: Maven-layout repositories on the local filesystem
//! - [`mock`]: in-memory repositories with failure injection for tests

pub mod client;
pub mod error;
pub mod local;
pub mod mock;
pub mod retry;

pub use client::{MetadataCoordinate, RepositoryClient, RepositoryClientFactory};
pub use error::{RepositoryError, RepositoryResult};
pub use local::{LocalRepositoryClient, LocalRepositoryFactory};
pub use retry::{
    BatchFailure, Interrupted, RetryHandler, RetryPolicy, Sleeper, ThreadSleeper, DEFAULT_MAX_RETRIES,
};
