use crate::{
    config::Config,
    error::{Error, Result, SourceError, WorkerFailure},
    status::Poll,
    worker::WorkerId,
};
use core::{mem, time::Duration};
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

type BoxedSource<T> = Box<dyn Iterator<Item = Result<T, SourceError>> + Send>;

/// What a producer thread pushes into its buffer.
enum Message<T> {
    Item(T),
    Failed(WorkerFailure),
}

enum Stage<T> {
    Idle {
        source: BoxedSource<T>,
    },
    Running {
        rx: Receiver<Message<T>>,
        // Never joined; dropping the handle detaches the thread.
        _handle: thread::JoinHandle<()>,
    },
    Done,
}

/// Flags shared between a worker and its producer thread.
#[derive(Default)]
struct Shared {
    stopped: AtomicBool,
    exited: AtomicBool,
}

/// Runs one input sequence to completion on a dedicated thread, buffering
/// what it produces in a bounded FIFO.
///
/// The producer never drops items: when the buffer is full it blocks for up
/// to `push_backoff`, re-checks whether it has been stopped, and tries again.
/// The consumer side pulls with [`BoundedWorker::next`].
///
/// A worker is single-pass. Once it reports [`Poll::Exhausted`] or
/// [`Poll::Failed`], or once [`BoundedWorker::stop`] is called, every later
/// poll returns [`Poll::Exhausted`].
///
/// Dropping a worker stops it. A producer blocked inside its input sequence
/// (e.g. on I/O) exits after that call returns; threads are never joined and
/// never keep the process alive.
pub struct BoundedWorker<T> {
    id: WorkerId,
    capacity: usize,
    push_backoff: Duration,
    shared: Arc<Shared>,
    spawned: bool,
    stage: Stage<T>,
}

impl<T> BoundedWorker<T>
where
    T: Send + 'static,
{
    /// Wraps an infallible input sequence.
    pub fn new<S>(id: WorkerId, source: S, config: &Config) -> Self
    where
        S: IntoIterator<Item = T>,
        S::IntoIter: Send + 'static,
    {
        Self::from_boxed(id, Box::new(source.into_iter().map(Ok)), config)
    }

    /// Wraps an input sequence whose items may fail.
    ///
    /// The first `Err` ends the sequence and is reported to the consumer as
    /// [`Poll::Failed`].
    pub fn try_new<S, E>(id: WorkerId, source: S, config: &Config) -> Self
    where
        S: IntoIterator<Item = Result<T, E>>,
        S::IntoIter: Send + 'static,
        E: Into<SourceError>,
    {
        let source = source.into_iter().map(|next| next.map_err(Into::into));
        Self::from_boxed(id, Box::new(source), config)
    }

    fn from_boxed(id: WorkerId, source: BoxedSource<T>, config: &Config) -> Self {
        Self {
            id,
            capacity: config.buffer_capacity.max(1),
            push_backoff: config.push_backoff,
            shared: Arc::new(Shared::default()),
            spawned: false,
            stage: Stage::Idle { source },
        }
    }

    /// Starts draining the input sequence on a background thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] if the worker was started or stopped
    /// before, and [`Error::Spawn`] if the thread could not be created.
    pub fn start(&mut self) -> Result<()> {
        self.spawn(None)
    }

    pub(crate) fn start_notifying(&mut self, exits: Sender<WorkerId>) -> Result<()> {
        self.spawn(Some(exits))
    }

    fn spawn(&mut self, exits: Option<Sender<WorkerId>>) -> Result<()> {
        let source = match mem::replace(&mut self.stage, Stage::Done) {
            Stage::Idle { source } => source,
            other => {
                self.stage = other;
                return Err(Error::AlreadyStarted { worker: self.id });
            }
        };

        let (tx, rx) = bounded(self.capacity);
        let producer = Producer {
            id: self.id,
            source,
            tx,
            shared: Arc::clone(&self.shared),
            push_backoff: self.push_backoff,
            exits,
        };

        let handle = thread::Builder::new()
            .name(format!("intersector-worker-{}", self.id.get()))
            .spawn(move || producer.run())
            .map_err(|source| Error::Spawn {
                worker: self.id,
                source,
            })?;

        #[cfg(feature = "tracing")]
        tracing::debug!(worker = %self.id, capacity = self.capacity, "worker started");

        self.spawned = true;
        self.stage = Stage::Running {
            rx,
            _handle: handle,
        };
        Ok(())
    }
}

impl<T> BoundedWorker<T> {
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Pops the next buffered item, waiting at most `timeout` for one.
    ///
    /// An unstarted worker always reports [`Poll::Empty`].
    pub fn next(&mut self, timeout: Duration) -> Poll<T> {
        let received = match &self.stage {
            Stage::Running { rx, .. } => rx.recv_timeout(timeout),
            Stage::Idle { .. } => return Poll::Empty,
            Stage::Done => return Poll::Exhausted,
        };

        match received {
            Ok(Message::Item(item)) => Poll::Ready(item),
            Ok(Message::Failed(failure)) => {
                self.stage = Stage::Done;
                Poll::Failed(failure)
            }
            Err(RecvTimeoutError::Timeout) => Poll::Empty,
            Err(RecvTimeoutError::Disconnected) => {
                self.stage = Stage::Done;
                Poll::Exhausted
            }
        }
    }

    /// Stops the worker and discards anything still buffered.
    ///
    /// Idempotent. Returns the number of items that were buffered but never
    /// delivered. The producer thread observes the stop within one
    /// `push_backoff` interval, or as soon as its current pull from the input
    /// sequence returns.
    pub fn stop(&mut self) -> usize {
        self.shared.stopped.store(true, Ordering::Release);

        let discarded = match mem::replace(&mut self.stage, Stage::Done) {
            // Dropping the receiver disconnects the buffer, which wakes a
            // producer blocked on a full channel.
            Stage::Running { rx, .. } => rx.len(),
            Stage::Idle { .. } | Stage::Done => 0,
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(worker = %self.id, discarded, "worker stopped");

        discarded
    }

    /// Whether this worker can still deliver items.
    ///
    /// True while the producer thread is running or the buffer still holds
    /// undelivered items. Unstarted, stopped, failed and drained workers are
    /// not alive.
    pub fn is_alive(&self) -> bool {
        match &self.stage {
            // `exited` is published after the producer's last push, so an
            // empty buffer observed afterwards stays empty.
            Stage::Running { rx, .. } => {
                !(self.shared.exited.load(Ordering::Acquire) && rx.is_empty())
            }
            Stage::Idle { .. } | Stage::Done => false,
        }
    }

    /// Whether the producer thread is still running.
    pub fn is_running(&self) -> bool {
        self.spawned && !self.has_exited()
    }

    /// Whether the producer thread has finished.
    ///
    /// Stays false for a worker that was never started.
    pub fn has_exited(&self) -> bool {
        self.shared.exited.load(Ordering::Acquire)
    }

    /// Whether a producer thread was ever spawned for this worker.
    pub fn is_started(&self) -> bool {
        self.spawned
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    /// Number of items produced but not yet consumed.
    pub fn buffered(&self) -> usize {
        match &self.stage {
            Stage::Running { rx, .. } => rx.len(),
            Stage::Idle { .. } | Stage::Done => 0,
        }
    }

    /// Whether the input is known to be empty without consuming it.
    ///
    /// Uses the upper bound of the sequence's `size_hint`, so only sequences
    /// that are empty by construction are recognized. Always false once the
    /// worker has started.
    pub fn is_known_empty(&self) -> bool {
        match &self.stage {
            Stage::Idle { source } => source.size_hint().1 == Some(0),
            Stage::Running { .. } | Stage::Done => false,
        }
    }
}

impl<T> Drop for BoundedWorker<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The producer half, moved onto the worker thread.
struct Producer<T> {
    id: WorkerId,
    source: BoxedSource<T>,
    tx: Sender<Message<T>>,
    shared: Arc<Shared>,
    push_backoff: Duration,
    exits: Option<Sender<WorkerId>>,
}

enum Outcome {
    Exhausted,
    Stopped,
    Failed(WorkerFailure),
}

impl<T> Producer<T> {
    fn run(self) {
        let Producer {
            id,
            mut source,
            tx,
            shared,
            push_backoff,
            exits,
        } = self;

        // Dropped when `run` returns, after the last push.
        let _exit = ExitNotice {
            id,
            shared: Arc::clone(&shared),
            exits,
        };

        let drained = panic::catch_unwind(AssertUnwindSafe(|| {
            Self::drain(id, &mut source, &tx, &shared, push_backoff)
        }));

        let failure = match drained {
            Ok(Outcome::Failed(failure)) => Some(failure),
            Ok(Outcome::Exhausted | Outcome::Stopped) => None,
            Err(payload) => Some(WorkerFailure::panicked(id, payload.as_ref())),
        };

        if let Some(failure) = failure {
            #[cfg(feature = "tracing")]
            tracing::warn!(worker = %id, kind = %failure.kind, message = %failure.message, "input sequence failed");

            push(&tx, Message::Failed(failure), &shared, push_backoff);
        }
    }

    fn drain(
        id: WorkerId,
        source: &mut BoxedSource<T>,
        tx: &Sender<Message<T>>,
        shared: &Shared,
        push_backoff: Duration,
    ) -> Outcome {
        loop {
            if shared.stopped.load(Ordering::Acquire) {
                return Outcome::Stopped;
            }

            match source.next() {
                Some(Ok(item)) => {
                    if !push(tx, Message::Item(item), shared, push_backoff) {
                        return Outcome::Stopped;
                    }
                }
                Some(Err(err)) => return Outcome::Failed(WorkerFailure::error(id, &err)),
                None => return Outcome::Exhausted,
            }
        }
    }
}

/// Pushes into the buffer, blocking while it is full.
///
/// Returns `false` if the worker was stopped or the consumer went away
/// before the message could be delivered.
fn push<T>(tx: &Sender<Message<T>>, mut msg: Message<T>, shared: &Shared, backoff: Duration) -> bool {
    loop {
        if shared.stopped.load(Ordering::Acquire) {
            return false;
        }

        match tx.send_timeout(msg, backoff) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(returned)) => msg = returned,
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

struct ExitNotice {
    id: WorkerId,
    shared: Arc<Shared>,
    exits: Option<Sender<WorkerId>>,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        self.shared.exited.store(true, Ordering::Release);

        #[cfg(feature = "tracing")]
        tracing::trace!(worker = %self.id, "worker thread exiting");

        if let Some(exits) = &self.exits {
            // The pool may be gone already.
            let _ = exits.send(self.id);
        }
    }
}
