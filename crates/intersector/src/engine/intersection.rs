use super::cache::MembershipCache;
use crate::{
    config::{Config, FailurePolicy},
    error::WorkerFailure,
    pool::WorkerPool,
    status::{EngineState, Poll},
    worker::{BoundedWorker, WorkerId},
};
use core::{fmt, hash::Hash, iter::FusedIterator, time::Duration};
use std::collections::{HashSet, VecDeque};
use tokio_util::sync::CancellationToken;

/// Counters describing one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunStats {
    pub inputs: usize,
    pub state: EngineState,
    /// Worker polls performed by the orchestrator.
    pub polls: u64,
    /// Items received from workers, including repeats.
    pub received: u64,
    /// Items yielded to the caller.
    pub emitted: u64,
    /// Items still waiting for full membership. Once the run is over, the
    /// number that never got there.
    pub pending: usize,
    pub failures: usize,
}

/// A running intersection; an iterator over the items every input produced.
///
/// The orchestrator runs on the thread calling [`Iterator::next`]. It polls
/// each worker in turn for up to `poll_timeout`, records which workers
/// reported each item, and yields an item as soon as all of them have.
///
/// Inputs beyond the pool limit wait in a queue and are started, in order,
/// whenever a running producer finishes. Queued inputs count as live.
///
/// The run ends when every worker is drained, or earlier once the live
/// workers are too few for any pending item to reach full membership. Either
/// way every worker is stopped, and so is every worker when the iterator is
/// dropped early.
pub struct Intersection<T> {
    pool: WorkerPool<T>,
    /// Workers not yet admitted to the pool.
    queued: VecDeque<BoundedWorker<T>>,
    cache: MembershipCache<T>,
    /// Everything yielded so far, when repeats are suppressed.
    emitted: Option<HashSet<T>>,
    inputs: usize,
    cursor: usize,
    poll_timeout: Duration,
    failure_policy: FailurePolicy,
    cancel: CancellationToken,
    state: EngineState,
    failures: Vec<WorkerFailure>,
    polls: u64,
    received: u64,
    emitted_count: u64,
    abandoned: usize,
}

impl<T> Intersection<T>
where
    T: Eq + Hash + Clone + Send + 'static,
{
    pub(crate) fn new(
        inputs: usize,
        pool: WorkerPool<T>,
        queued: VecDeque<BoundedWorker<T>>,
        config: &Config,
        cancel: &CancellationToken,
        state: EngineState,
    ) -> Self {
        Self {
            pool,
            queued,
            cache: MembershipCache::new(inputs),
            emitted: config.dedup_emitted.then(HashSet::new),
            inputs,
            cursor: 0,
            poll_timeout: config.poll_timeout,
            failure_policy: config.failure_policy,
            cancel: cancel.clone(),
            state,
            failures: Vec::new(),
            polls: 0,
            received: 0,
            emitted_count: 0,
            abandoned: 0,
        }
    }

    /// Polls the next worker in round-robin order once.
    ///
    /// Returns an item if this poll completed its membership. May move the
    /// run into a terminal state; a completed item is still returned then.
    fn step(&mut self) -> Option<T> {
        if !self.queued.is_empty() && !self.admit() {
            return None;
        }

        let len = self.pool.len();
        if len == 0 {
            self.finish(EngineState::Exhausted);
            return None;
        }

        let slot = self.cursor % len;
        self.cursor = slot + 1;
        self.polls += 1;

        let mut completed = None;
        match self.pool.poll(slot, self.poll_timeout) {
            Some((worker, Poll::Ready(item))) => {
                self.received += 1;
                completed = self.record(worker, item);
            }
            Some((_, Poll::Failed(failure))) => {
                if !self.fail(failure) {
                    return None;
                }
            }
            Some((_, Poll::Empty | Poll::Exhausted)) | None => {}
        }

        let active = self.pool.active_count() + self.queued.len();
        let best = self.cache.max_membership().unwrap_or(self.inputs);

        if active == 0 {
            self.finish(EngineState::Exhausted);
        } else if active < self.inputs && self.inputs - best > active {
            // Even if every live worker reported every pending item, none of
            // them could reach full membership.
            #[cfg(feature = "tracing")]
            tracing::debug!(active, best, inputs = self.inputs, "no pending item can complete");

            self.finish(EngineState::EarlyStopped);
        }

        completed
    }

    /// Starts queued workers while the pool has room.
    ///
    /// Returns `false` if a failed start aborted the run.
    fn admit(&mut self) -> bool {
        while self.pool.has_room() {
            let Some(worker) = self.queued.pop_front() else {
                break;
            };

            let id = worker.id();
            if let Err(err) = self.pool.add(worker) {
                if !self.fail(WorkerFailure::not_started(id, &err)) {
                    return false;
                }
            }
        }

        if self.queued.is_empty() && self.state == EngineState::SpinningUp {
            #[cfg(feature = "tracing")]
            tracing::debug!(inputs = self.inputs, "every worker admitted");

            self.state = EngineState::Polling;
        }
        true
    }

    /// Records a worker failure. Returns `false` if it aborted the run.
    fn fail(&mut self, failure: WorkerFailure) -> bool {
        #[cfg(feature = "tracing")]
        tracing::warn!(%failure, "worker failed");

        self.failures.push(failure);
        if self.failure_policy == FailurePolicy::Abort {
            self.finish(EngineState::Aborted);
            return false;
        }
        true
    }

    fn record(&mut self, worker: WorkerId, item: T) -> Option<T> {
        if self.emitted.as_ref().is_some_and(|seen| seen.contains(&item)) {
            return None;
        }

        let item = self.cache.record(item, worker)?;
        if let Some(emitted) = &mut self.emitted {
            emitted.insert(item.clone());
        }
        self.emitted_count += 1;
        Some(item)
    }
}

impl<T> Intersection<T> {
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Failures reported by workers so far.
    pub fn failures(&self) -> &[WorkerFailure] {
        &self.failures
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            inputs: self.inputs,
            state: self.state,
            polls: self.polls,
            received: self.received,
            emitted: self.emitted_count,
            pending: if self.state.is_terminal() {
                self.abandoned
            } else {
                self.cache.len()
            },
            failures: self.failures.len(),
        }
    }

    /// Stops every worker and ends the output. No-op once the run is over.
    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            self.finish(EngineState::Cancelled);
        }
    }

    fn finish(&mut self, state: EngineState) {
        self.state = state;
        self.abandoned = self.cache.len();
        self.cache.clear();
        self.emitted = None;
        self.queued.clear();

        let _reports = self.pool.stop_all();

        #[cfg(feature = "tracing")]
        {
            let discarded: usize = _reports.iter().map(|r| r.discarded).sum();
            tracing::debug!(
                ?state,
                emitted = self.emitted_count,
                pending = self.abandoned,
                discarded,
                "intersection finished"
            );
        }
    }
}

impl<T> Iterator for Intersection<T>
where
    T: Eq + Hash + Clone + Send + 'static,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            if self.state.is_terminal() {
                return None;
            }

            if self.cancel.is_cancelled() {
                self.finish(EngineState::Cancelled);
                return None;
            }

            if let Some(item) = self.step() {
                return Some(item);
            }
        }
    }
}

impl<T> FusedIterator for Intersection<T> where T: Eq + Hash + Clone + Send + 'static {}

impl<T> fmt::Debug for Intersection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Intersection")
            .field("inputs", &self.inputs)
            .field("state", &self.state)
            .field("workers", &self.pool.len())
            .field("queued", &self.queued.len())
            .field("pending", &self.cache.len())
            .field("failures", &self.failures)
            .finish_non_exhaustive()
    }
}
