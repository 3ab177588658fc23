use crate::error::WorkerFailure;

/// Outcome of polling a [`crate::BoundedWorker`] for its next item.
///
/// - [`Poll::Ready`] carries the next buffered item.
/// - [`Poll::Empty`] means the buffer stayed empty for the whole timeout but
///   the input sequence is still live.
/// - [`Poll::Exhausted`] means the worker will never produce again: its
///   sequence ended and the buffer is drained, or it was stopped.
/// - [`Poll::Failed`] is reported once when the input sequence failed. Every
///   later poll returns [`Poll::Exhausted`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll<T> {
    /// The next item produced by the worker.
    Ready(T),
    /// Nothing buffered yet; try again later.
    Empty,
    /// The worker is finished and drained.
    Exhausted,
    /// The worker's input sequence failed.
    Failed(WorkerFailure),
}

impl<T> Poll<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Whether the worker that returned this will never produce again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exhausted | Self::Failed(_))
    }

    /// Returns the contained item.
    ///
    /// # Panics
    ///
    /// Panics if the poll did not produce an item.
    pub fn unwrap_ready(self) -> T {
        match self {
            Self::Ready(item) => item,
            Self::Empty => panic!("called `Poll::unwrap_ready()` on an `Empty` value"),
            Self::Exhausted => panic!("called `Poll::unwrap_ready()` on an `Exhausted` value"),
            Self::Failed(failure) => {
                panic!("called `Poll::unwrap_ready()` on a `Failed` value: {failure}")
            }
        }
    }

    /// Returns the contained failure.
    ///
    /// # Panics
    ///
    /// Panics if the poll is not [`Poll::Failed`].
    pub fn unwrap_failed(self) -> WorkerFailure {
        match self {
            Self::Failed(failure) => failure,
            _ => panic!("called `Poll::unwrap_failed()` on a non-`Failed` value"),
        }
    }
}

/// Lifecycle of one engine run.
///
/// `SpinningUp -> Polling -> {EarlyStopped | Exhausted}` is the normal path.
/// `Cancelled` and `Aborted` are reached through a
/// [`crate::CancellationToken`] or [`crate::FailurePolicy::Abort`]. All
/// terminal states look the same to the consumer of the output: the iterator
/// ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EngineState {
    /// Some inputs still wait for room in the pool. Admitted workers are
    /// already being polled.
    SpinningUp,
    /// The orchestrator is polling workers.
    Polling,
    /// Polling ended because no pending item could still reach full
    /// membership.
    EarlyStopped,
    /// Every worker finished and was drained.
    Exhausted,
    /// A cancel signal was observed.
    Cancelled,
    /// A worker failed under [`crate::FailurePolicy::Abort`].
    Aborted,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::SpinningUp | Self::Polling)
    }
}
