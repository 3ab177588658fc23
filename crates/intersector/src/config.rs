//! Tunables for workers, pools and the intersection engine.
//!
//! ## Key Concepts
//! - **Backpressure**: each worker buffers at most `buffer_capacity` items.
//!   A producer facing a full buffer blocks for up to `push_backoff` before
//!   re-checking whether it has been stopped.
//! - **Admission**: a pool never holds more than `pool_limit` live workers.
//!   `add` waits up to `admission_poll` between liveness checks.
//! - **Polling**: the orchestrator waits up to `poll_timeout` on each worker
//!   before moving on to the next one.

use crate::error::{Error, Result};
use core::time::Duration;

/// Default per-worker buffer capacity.
pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

/// Default time a producer blocks on a full buffer before re-checking its
/// stop flag.
pub const DEFAULT_PUSH_BACKOFF: Duration = Duration::from_millis(250);

/// Default maximum number of live workers in a pool.
pub const DEFAULT_POOL_LIMIT: usize = 128;

/// Default wait between admission checks of a full pool.
pub const DEFAULT_ADMISSION_POLL: Duration = Duration::from_secs(2);

/// Default orchestrator wait on an empty worker buffer.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// What the engine does when an input sequence fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FailurePolicy {
    /// Record the failure and keep polling the remaining workers.
    ///
    /// Items that depended on the failed worker never reach full membership
    /// and are pruned by the early-stop test.
    #[default]
    Continue,
    /// Stop every worker and end the output at the first failure.
    Abort,
}

/// Runtime configuration shared by workers, pools and the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    pub buffer_capacity: usize,
    pub push_backoff: Duration,
    pub pool_limit: usize,
    pub admission_poll: Duration,
    pub poll_timeout: Duration,
    /// Remember emitted items so a value repeated by every input is still
    /// emitted only once per run.
    ///
    /// The remembered set grows with the output and is only released when
    /// the run ends, so long runs hold one copy of every emitted item.
    pub dedup_emitted: bool,
    pub failure_policy: FailurePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            push_backoff: DEFAULT_PUSH_BACKOFF,
            pool_limit: DEFAULT_POOL_LIMIT,
            admission_poll: DEFAULT_ADMISSION_POLL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            dedup_emitted: true,
            failure_policy: FailurePolicy::Continue,
        }
    }
}

impl Config {
    pub fn with_buffer_capacity(mut self, buffer_capacity: usize) -> Self {
        self.buffer_capacity = buffer_capacity;
        self
    }

    pub fn with_push_backoff(mut self, push_backoff: Duration) -> Self {
        self.push_backoff = push_backoff;
        self
    }

    pub fn with_pool_limit(mut self, pool_limit: usize) -> Self {
        self.pool_limit = pool_limit;
        self
    }

    pub fn with_admission_poll(mut self, admission_poll: Duration) -> Self {
        self.admission_poll = admission_poll;
        self
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn with_dedup_emitted(mut self, dedup_emitted: bool) -> Self {
        self.dedup_emitted = dedup_emitted;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a capacity, limit or duration is
    /// zero. A zero-capacity buffer would turn every push into a rendezvous
    /// and a zero duration would spin.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(invalid("buffer_capacity must be greater than 0"));
        }
        if self.pool_limit == 0 {
            return Err(invalid("pool_limit must be greater than 0"));
        }
        if self.push_backoff.is_zero() {
            return Err(invalid("push_backoff must be non-zero"));
        }
        if self.admission_poll.is_zero() {
            return Err(invalid("admission_poll must be non-zero"));
        }
        if self.poll_timeout.is_zero() {
            return Err(invalid("poll_timeout must be non-zero"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> Error {
    Error::InvalidConfig {
        reason: reason.to_owned(),
    }
}
