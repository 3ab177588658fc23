//! Error types for the intersection engine.
//!
//! [`Error`] covers everything that can go wrong while setting up or running
//! an intersection. [`WorkerFailure`] is the terminal value a worker reports
//! when its input sequence fails, either by yielding an error or by
//! panicking.

use crate::worker::WorkerId;
use core::fmt;
use thiserror::Error;

/// A result type defaulting to [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// The boxed error type an input sequence may yield.
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All errors `intersector` can produce.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// An intersection was requested over zero inputs.
    #[error("intersection requires at least one input sequence")]
    NoInputs,

    /// A [`crate::Config`] value was out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// [`crate::BoundedWorker::start`] was called on a worker that already
    /// left its idle state.
    #[error("worker {worker} was already started or stopped")]
    AlreadyStarted { worker: WorkerId },

    /// The operating system refused to spawn a worker thread.
    #[error("failed to spawn thread for worker {worker}")]
    Spawn {
        worker: WorkerId,
        #[source]
        source: std::io::Error,
    },

    /// A worker's input sequence failed.
    #[error(transparent)]
    WorkerFailed(#[from] WorkerFailure),
}

/// How an input sequence failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FailureKind {
    /// The sequence yielded an `Err`.
    Error,
    /// The producer panicked while pulling from the sequence.
    Panicked,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Panicked => f.write_str("panic"),
        }
    }
}

/// Terminal report of a worker whose input sequence failed.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[error("worker {worker} failed with {kind}: {message}")]
pub struct WorkerFailure {
    pub worker: WorkerId,
    pub kind: FailureKind,
    pub message: String,
}

impl WorkerFailure {
    pub(crate) fn error(worker: WorkerId, err: &SourceError) -> Self {
        Self {
            worker,
            kind: FailureKind::Error,
            message: err.to_string(),
        }
    }

    pub(crate) fn not_started(worker: WorkerId, err: &Error) -> Self {
        Self {
            worker,
            kind: FailureKind::Error,
            message: err.to_string(),
        }
    }

    pub(crate) fn panicked(worker: WorkerId, payload: &(dyn core::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };

        Self {
            worker,
            kind: FailureKind::Panicked,
            message,
        }
    }
}
