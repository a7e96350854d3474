//! Bounded retries of batch fetches
//!
//! A batch attempt either succeeds or reports the set of artifacts that
//! failed. When the failing set changes between attempts, part of the batch
//! went through and the retry budget starts over; when it stays the same the
//! counter grows until `max_retries` is exceeded.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{RepositoryError, RepositoryResult};

/// Default number of retries for an unchanged failing set
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed while the failing set stays the same
    pub max_retries: u32,
    /// Pause between attempts
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Never retry
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            timeout: None,
        }
    }
}

/// A failed batch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Artifacts that could not be fetched in this attempt
    pub failed: BTreeSet<String>,
    /// Repositories that were tried
    pub repositories: BTreeSet<String>,
    /// Cause of the last failure
    pub message: String,
}

/// The sleep was interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

/// Waits between attempts
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted>;
}

/// Sleeps on the current thread, polling an interrupt flag
#[derive(Debug, Clone, Default)]
pub struct ThreadSleeper {
    interrupted: Arc<AtomicBool>,
}

impl ThreadSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an interrupt flag, e.g. one set from a Ctrl-C handler
    pub fn with_interrupt(interrupted: Arc<AtomicBool>) -> Self {
        Self { interrupted }
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        const TICK: Duration = Duration::from_millis(50);

        let deadline = Instant::now() + duration;
        loop {
            if self.interrupted.load(Ordering::SeqCst) {
                return Err(Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep(TICK.min(deadline - now));
        }
    }
}

/// Runs a batch operation under a [`RetryPolicy`]
pub struct RetryHandler {
    policy: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
}

impl RetryHandler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_sleeper(policy, Box::new(ThreadSleeper::new()))
    }

    pub fn with_sleeper(policy: RetryPolicy, sleeper: Box<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `attempt` until it succeeds or the retry budget is spent.
    pub fn execute<T, F>(&self, mut attempt: F) -> RepositoryResult<T>
    where
        F: FnMut() -> Result<T, BatchFailure>,
    {
        let mut retries: u32 = 0;
        let mut previous: Option<BTreeSet<String>> = None;

        loop {
            let failure = match attempt() {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };

            if previous.as_ref() == Some(&failure.failed) {
                retries += 1;
            } else {
                if previous.is_some() {
                    debug!(
                        failing = failure.failed.len(),
                        "failing set changed, resetting retry budget"
                    );
                }
                retries = 0;
            }

            if retries >= self.policy.max_retries {
                warn!(
                    artifacts = ?failure.failed,
                    retries,
                    "giving up after exhausting retries"
                );
                return Err(RepositoryError::Transfer {
                    message: failure.message,
                    artifacts: failure.failed.into_iter().collect(),
                    repositories: failure.repositories.into_iter().collect(),
                });
            }

            debug!(
                artifacts = ?failure.failed,
                attempt = retries + 1,
                max_retries = self.policy.max_retries,
                "retrying batch"
            );

            if let Some(timeout) = self.policy.timeout {
                if self.sleeper.sleep(timeout).is_err() {
                    return Err(RepositoryError::Interrupted {
                        artifacts: failure.failed.into_iter().collect(),
                    });
                }
            }

            previous = Some(failure.failed);
        }
    }
}
