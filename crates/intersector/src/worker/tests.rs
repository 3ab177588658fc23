use crate::{BoundedWorker, Config, Error, FailureKind, Poll, WorkerId};
use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

const WAIT: Duration = Duration::from_secs(2);
const TICK: Duration = Duration::from_millis(10);

fn small_config(capacity: usize) -> Config {
    Config::default()
        .with_buffer_capacity(capacity)
        .with_push_backoff(TICK)
}

/// Polls until something other than `Empty` shows up.
fn next_non_empty<T>(worker: &mut BoundedWorker<T>) -> Poll<T> {
    let deadline = Instant::now() + WAIT;
    loop {
        let poll = worker.next(TICK);
        if !poll.is_empty() || Instant::now() > deadline {
            return poll;
        }
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(TICK);
    }
    condition()
}

/// Iterator that flags when it is dropped, i.e. when its producer thread has
/// let go of it.
struct Tracked<I> {
    inner: I,
    dropped: Arc<AtomicBool>,
}

impl<I: Iterator> Iterator for Tracked<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        self.inner.next()
    }
}

impl<I> Drop for Tracked<I> {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::Release);
    }
}

#[test]
fn delivers_items_in_order_then_exhausts() {
    let mut worker = BoundedWorker::new(WorkerId::new(0), vec!["a", "b", "c"], &small_config(8));
    worker.start().unwrap();

    assert_eq!(next_non_empty(&mut worker), Poll::Ready("a"));
    assert_eq!(next_non_empty(&mut worker), Poll::Ready("b"));
    assert_eq!(next_non_empty(&mut worker), Poll::Ready("c"));
    assert_eq!(next_non_empty(&mut worker), Poll::Exhausted);

    // Single pass: exhaustion is sticky.
    for _ in 0..3 {
        assert_eq!(worker.next(TICK), Poll::Exhausted);
    }
    assert!(!worker.is_alive());
}

#[test]
fn full_buffer_blocks_instead_of_dropping() {
    let mut worker = BoundedWorker::new(WorkerId::new(0), 0..100_u32, &small_config(2));
    worker.start().unwrap();

    assert!(wait_until(|| worker.buffered() == 2));
    // Give the producer a few backoff rounds against the full buffer.
    std::thread::sleep(TICK * 5);
    assert_eq!(worker.buffered(), 2);
    assert!(worker.is_running());

    let mut seen = Vec::new();
    loop {
        match next_non_empty(&mut worker) {
            Poll::Ready(item) => seen.push(item),
            Poll::Exhausted => break,
            other => panic!("unexpected poll: {other:?}"),
        }
    }
    assert_eq!(seen, (0..100).collect::<Vec<_>>());
}

#[test]
fn unstarted_worker_reports_empty() {
    let mut worker = BoundedWorker::new(WorkerId::new(0), vec![1], &small_config(4));
    assert_eq!(worker.next(TICK), Poll::Empty);
    assert!(!worker.is_started());
    assert!(!worker.is_alive());
    assert!(!worker.is_running());
}

#[test]
fn starting_twice_is_rejected() {
    let mut worker = BoundedWorker::new(WorkerId::new(4), vec![1], &small_config(4));
    worker.start().unwrap();

    let err = worker.start().unwrap_err();
    assert!(matches!(err, Error::AlreadyStarted { worker } if worker == WorkerId::new(4)));
}

#[test]
fn stopping_an_idle_worker_prevents_start() {
    let mut worker = BoundedWorker::new(WorkerId::new(1), vec![1], &small_config(4));
    assert_eq!(worker.stop(), 0);
    assert!(worker.is_stopped());
    assert!(matches!(worker.start(), Err(Error::AlreadyStarted { .. })));
    assert_eq!(worker.next(TICK), Poll::Exhausted);
    assert!(!worker.is_running());
}

#[test]
fn known_empty_uses_size_hint() {
    let empty = BoundedWorker::new(WorkerId::new(0), Vec::<u8>::new(), &small_config(4));
    assert!(empty.is_known_empty());

    let unknown = BoundedWorker::new(
        WorkerId::new(1),
        std::iter::from_fn(|| None::<u8>),
        &small_config(4),
    );
    assert!(!unknown.is_known_empty());

    let non_empty = BoundedWorker::new(WorkerId::new(2), vec![1_u8], &small_config(4));
    assert!(!non_empty.is_known_empty());
}

#[test]
fn stop_discards_buffer_and_ends_thread() {
    let dropped = Arc::new(AtomicBool::new(false));
    let source = Tracked {
        inner: 0_u64..,
        dropped: Arc::clone(&dropped),
    };

    let mut worker = BoundedWorker::new(WorkerId::new(0), source, &small_config(4));
    worker.start().unwrap();
    assert!(wait_until(|| worker.buffered() == 4));

    assert_eq!(worker.stop(), 4);
    assert_eq!(worker.stop(), 0, "stop is idempotent");
    assert!(worker.is_stopped());
    assert_eq!(worker.next(TICK), Poll::Exhausted);
    assert!(!worker.is_alive());

    assert!(wait_until(|| worker.has_exited()));
    assert!(wait_until(|| dropped.load(Ordering::Acquire)));
    assert_eq!(worker.next(TICK), Poll::Exhausted);
}

#[test]
fn dropping_a_worker_stops_its_thread() {
    let dropped = Arc::new(AtomicBool::new(false));
    let source = Tracked {
        inner: std::iter::repeat(7_u8),
        dropped: Arc::clone(&dropped),
    };

    let mut worker = BoundedWorker::new(WorkerId::new(0), source, &small_config(2));
    worker.start().unwrap();
    assert!(wait_until(|| worker.buffered() == 2));

    drop(worker);
    assert!(wait_until(|| dropped.load(Ordering::Acquire)));
}

#[test]
fn source_errors_are_reported_once() {
    let source: Vec<Result<u8, &'static str>> = vec![Ok(1), Err("bad record"), Ok(2)];
    let mut worker = BoundedWorker::try_new(WorkerId::new(9), source, &small_config(4));
    worker.start().unwrap();

    assert_eq!(next_non_empty(&mut worker), Poll::Ready(1));

    let failure = next_non_empty(&mut worker).unwrap_failed();
    assert_eq!(failure.worker, WorkerId::new(9));
    assert_eq!(failure.kind, FailureKind::Error);
    assert_eq!(failure.message, "bad record");

    // Nothing after the error is delivered.
    assert_eq!(worker.next(TICK), Poll::Exhausted);
    assert!(!worker.is_alive());
}

#[test]
fn producer_panics_are_reported() {
    let mut calls = 0;
    let source = std::iter::from_fn(move || {
        calls += 1;
        if calls > 2 {
            panic!("upstream went away");
        }
        Some(calls)
    });

    let mut worker = BoundedWorker::new(WorkerId::new(2), source, &small_config(4));
    worker.start().unwrap();

    assert_eq!(next_non_empty(&mut worker), Poll::Ready(1));
    assert_eq!(next_non_empty(&mut worker), Poll::Ready(2));

    let failure = next_non_empty(&mut worker).unwrap_failed();
    assert_eq!(failure.kind, FailureKind::Panicked);
    assert_eq!(failure.message, "upstream went away");
    assert_eq!(worker.next(TICK), Poll::Exhausted);
}

#[test]
fn exited_worker_stays_alive_until_drained() {
    let mut worker = BoundedWorker::new(WorkerId::new(0), vec![1, 2, 3], &small_config(8));
    worker.start().unwrap();

    assert!(wait_until(|| worker.has_exited()));
    assert!(worker.is_alive(), "buffered items are still deliverable");
    assert!(!worker.is_running());

    for expected in 1..=3 {
        assert_eq!(next_non_empty(&mut worker), Poll::Ready(expected));
    }
    assert!(!worker.is_alive());
}
