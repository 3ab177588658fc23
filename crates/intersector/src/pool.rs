use crate::{
    config::Config,
    error::Result,
    status::Poll,
    worker::{BoundedWorker, WorkerId},
};
use core::time::Duration;
use crossbeam_channel::{Receiver, Sender, unbounded};

/// What [`WorkerPool::stop_all`] left behind in one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopReport {
    pub worker: WorkerId,
    /// Items that were buffered but never delivered.
    pub discarded: usize,
}

/// A concurrency-limited collection of [`BoundedWorker`]s.
///
/// Admission is bounded by *running* producer threads: [`WorkerPool::add`]
/// blocks while `limit` producers are still running, and wakes whenever one
/// of them exits (or every `admission_poll` at the latest). A worker whose
/// thread finished but whose buffer still holds items no longer counts
/// against the limit, but it is still *alive* for [`WorkerPool::active_count`]
/// until it has been drained.
///
/// Dropping the pool stops every member.
pub struct WorkerPool<T> {
    workers: Vec<BoundedWorker<T>>,
    limit: usize,
    admission_poll: Duration,
    exits_tx: Sender<WorkerId>,
    exits_rx: Receiver<WorkerId>,
}

impl<T> WorkerPool<T> {
    /// Creates an empty pool admitting at most `limit` running workers.
    pub fn new(limit: usize, admission_poll: Duration) -> Self {
        let (exits_tx, exits_rx) = unbounded();
        Self {
            workers: Vec::new(),
            limit: limit.max(1),
            admission_poll,
            exits_tx,
            exits_rx,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.pool_limit, config.admission_poll)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of members still tracked, including ones not yet pruned.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Number of members whose producer thread is still running.
    pub fn running_count(&self) -> usize {
        self.workers.iter().filter(|w| w.is_running()).count()
    }

    /// Whether [`WorkerPool::add`] would admit a worker without waiting.
    ///
    /// Consumes pending exit notices.
    pub fn has_room(&mut self) -> bool {
        while self.exits_rx.try_recv().is_ok() {}
        self.running_count() < self.limit
    }

    /// Total items buffered across all members.
    pub fn buffered(&self) -> usize {
        self.workers.iter().map(BoundedWorker::buffered).sum()
    }

    /// Number of members that can still deliver items.
    ///
    /// Members that are drained, stopped or failed are pruned as a side
    /// effect.
    pub fn active_count(&mut self) -> usize {
        self.workers.retain(BoundedWorker::is_alive);
        self.workers.len()
    }

    /// Polls the member at `slot` for its next item.
    ///
    /// Returns `None` if `slot` is out of range.
    pub fn poll(&mut self, slot: usize, timeout: Duration) -> Option<(WorkerId, Poll<T>)> {
        self.workers
            .get_mut(slot)
            .map(|worker| (worker.id(), worker.next(timeout)))
    }

    /// Stops every member and removes it from the pool.
    pub fn stop_all(&mut self) -> Vec<StopReport> {
        #[cfg(feature = "tracing")]
        tracing::debug!(workers = self.workers.len(), "stopping all workers");

        self.workers
            .drain(..)
            .map(|mut worker| {
                let discarded = worker.stop();

                #[cfg(feature = "tracing")]
                tracing::debug!(worker = %worker.id(), discarded, "worker stopped");

                StopReport {
                    worker: worker.id(),
                    discarded,
                }
            })
            .collect()
    }
}

impl<T> WorkerPool<T>
where
    T: Send + 'static,
{
    /// Admits `worker` and starts it.
    ///
    /// Blocks, without failing, while `limit` members are running.
    ///
    /// # Errors
    ///
    /// Propagates [`BoundedWorker::start`] failures. The worker is dropped
    /// (and thereby stopped) in that case.
    pub fn add(&mut self, mut worker: BoundedWorker<T>) -> Result<()> {
        while self.running_count() >= self.limit {
            #[cfg(feature = "tracing")]
            tracing::debug!(limit = self.limit, worker = %worker.id(), "pool full, waiting for a worker to exit");

            // We hold a sender ourselves, so this only ever times out.
            let _ = self.exits_rx.recv_timeout(self.admission_poll);
            while self.exits_rx.try_recv().is_ok() {}
        }

        worker.start_notifying(self.exits_tx.clone())?;
        self.workers.push(worker);
        Ok(())
    }
}

impl<T> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.stop_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    const TICK: Duration = Duration::from_millis(10);

    fn config(limit: usize) -> Config {
        Config::default()
            .with_pool_limit(limit)
            .with_admission_poll(Duration::from_millis(20))
            .with_push_backoff(TICK)
            .with_buffer_capacity(16)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(TICK);
        }
        condition()
    }

    fn drain(pool: &mut WorkerPool<u32>, slot: usize) -> Vec<u32> {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut items = Vec::new();
        while Instant::now() < deadline {
            match pool.poll(slot, TICK) {
                Some((_, Poll::Ready(item))) => items.push(item),
                Some((_, Poll::Empty)) => {}
                _ => break,
            }
        }
        items
    }

    #[test]
    fn add_starts_workers() {
        let config = config(4);
        let mut pool = WorkerPool::from_config(&config);
        pool.add(BoundedWorker::new(WorkerId::new(0), vec![1_u32, 2, 3], &config))
            .unwrap();

        assert_eq!(pool.len(), 1);
        assert_eq!(drain(&mut pool, 0), vec![1, 2, 3]);
        assert_eq!(pool.active_count(), 0, "drained workers are pruned");
        assert!(pool.is_empty());
    }

    #[test]
    fn add_waits_for_room_instead_of_failing() {
        let config = config(1);
        let mut pool = WorkerPool::from_config(&config);

        // Holds its thread for a while, then ends without producing.
        let slow = std::iter::once(()).filter_map(|()| {
            std::thread::sleep(Duration::from_millis(150));
            None::<u32>
        });
        pool.add(BoundedWorker::new(WorkerId::new(0), slow, &config))
            .unwrap();
        assert_eq!(pool.running_count(), 1);

        let started = Instant::now();
        pool.add(BoundedWorker::new(WorkerId::new(1), vec![7_u32], &config))
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn exited_but_undrained_workers_do_not_block_admission() {
        let config = config(1);
        let mut pool = WorkerPool::from_config(&config);
        pool.add(BoundedWorker::new(WorkerId::new(0), vec![1_u32, 2], &config))
            .unwrap();

        assert!(wait_until(|| pool.running_count() == 0));
        pool.add(BoundedWorker::new(WorkerId::new(1), vec![3_u32], &config))
            .unwrap();

        // Both still hold undelivered items.
        assert!(wait_until(|| pool.running_count() == 0));
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn stop_all_reports_undelivered_items() {
        let config = config(4);
        let mut pool = WorkerPool::from_config(&config);
        pool.add(BoundedWorker::new(WorkerId::new(0), 0..8_u32, &config))
            .unwrap();
        pool.add(BoundedWorker::new(WorkerId::new(1), 0_u32.., &config))
            .unwrap();

        assert!(wait_until(|| pool.running_count() == 1 && pool.buffered() == 24));
        let mut reports = pool.stop_all();
        reports.sort_by_key(|r| r.worker);

        assert_eq!(
            reports,
            vec![
                StopReport {
                    worker: WorkerId::new(0),
                    discarded: 8
                },
                StopReport {
                    worker: WorkerId::new(1),
                    discarded: 16
                },
            ]
        );

        // The endless producer was blocked on its full buffer and exits
        // within a backoff interval.
        assert!(wait_until(|| pool.exits_rx.try_iter().any(|id| id == WorkerId::new(1))));
        assert_eq!(pool.active_count(), 0);
        assert!(pool.poll(0, TICK).is_none());
    }
}
