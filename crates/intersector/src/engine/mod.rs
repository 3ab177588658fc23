mod cache;
mod intersection;

pub use intersection::*;

use crate::{
    config::Config,
    error::{Error, Result, SourceError},
    pool::WorkerPool,
    status::EngineState,
    worker::{BoundedWorker, WorkerId},
};
use core::hash::Hash;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;

/// Builds [`Intersection`]s from a [`Config`] and an optional
/// [`CancellationToken`].
#[derive(Clone, Debug, Default)]
pub struct Intersector {
    config: Config,
    cancel: CancellationToken,
}

impl Intersector {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `cancel` to interrupt every run started by this intersector.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Starts a lazy intersection of infallible input sequences.
    ///
    /// Each input runs on its own worker thread. The returned iterator yields
    /// every item produced by all inputs. At most `pool_limit` producers run
    /// at once; further inputs start as running ones finish.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] if the config does not validate.
    /// - [`Error::NoInputs`] if `inputs` is empty.
    /// - [`Error::Spawn`] if a worker thread cannot be created.
    pub fn intersect<I, S, T>(&self, inputs: I) -> Result<Intersection<T>>
    where
        I: IntoIterator<Item = S>,
        S: IntoIterator<Item = T>,
        S::IntoIter: Send + 'static,
        T: Eq + Hash + Clone + Send + 'static,
    {
        let workers = inputs
            .into_iter()
            .enumerate()
            .map(|(id, source)| BoundedWorker::new(WorkerId::new(id), source, &self.config))
            .collect();
        self.spin_up(workers)
    }

    /// Starts a lazy intersection of input sequences whose items may fail.
    ///
    /// A failing input ends at its first `Err`. What happens next depends on
    /// [`crate::FailurePolicy`]; every failure is available through
    /// [`Intersection::failures`].
    ///
    /// # Errors
    ///
    /// Same as [`Intersector::intersect`].
    pub fn try_intersect<I, S, T, E>(&self, inputs: I) -> Result<Intersection<T>>
    where
        I: IntoIterator<Item = S>,
        S: IntoIterator<Item = Result<T, E>>,
        S::IntoIter: Send + 'static,
        T: Eq + Hash + Clone + Send + 'static,
        E: Into<SourceError>,
    {
        let workers = inputs
            .into_iter()
            .enumerate()
            .map(|(id, source)| BoundedWorker::try_new(WorkerId::new(id), source, &self.config))
            .collect();
        self.spin_up(workers)
    }

    fn spin_up<T>(&self, workers: Vec<BoundedWorker<T>>) -> Result<Intersection<T>>
    where
        T: Eq + Hash + Clone + Send + 'static,
    {
        self.config.validate()?;

        let inputs = workers.len();
        if inputs == 0 {
            return Err(Error::NoInputs);
        }

        let mut pool = WorkerPool::from_config(&self.config);

        if workers.iter().any(BoundedWorker::is_known_empty) {
            #[cfg(feature = "tracing")]
            tracing::debug!(inputs, "an input is known to be empty, skipping spin-up");

            return Ok(Intersection::new(
                inputs,
                pool,
                VecDeque::new(),
                &self.config,
                &self.cancel,
                EngineState::EarlyStopped,
            ));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(inputs, limit = pool.limit(), "spinning up workers");

        let mut queued: VecDeque<_> = workers.into();
        while pool.has_room() {
            let Some(worker) = queued.pop_front() else {
                break;
            };
            pool.add(worker)?;
        }

        // Inputs beyond the pool limit are admitted while the run polls.
        let state = if queued.is_empty() {
            EngineState::Polling
        } else {
            EngineState::SpinningUp
        };

        Ok(Intersection::new(
            inputs,
            pool,
            queued,
            &self.config,
            &self.cancel,
            state,
        ))
    }
}

/// Lazily intersects `inputs` with the default [`Config`].
///
/// See [`Intersector::intersect`].
///
/// # Errors
///
/// Same as [`Intersector::intersect`].
pub fn intersect<I, S, T>(inputs: I) -> Result<Intersection<T>>
where
    I: IntoIterator<Item = S>,
    S: IntoIterator<Item = T>,
    S::IntoIter: Send + 'static,
    T: Eq + Hash + Clone + Send + 'static,
{
    Intersector::default().intersect(inputs)
}
