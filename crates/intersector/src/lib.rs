//! Bounded, parallel intersection of lazy sequences.
//!
//! Each input sequence is drained on its own thread into a bounded buffer
//! ([`BoundedWorker`]). Workers are admitted through a concurrency-limited
//! [`WorkerPool`], and an orchestrator ([`Intersection`]) polls them
//! round-robin, yielding every item once all inputs have produced it.
//!
//! ```
//! use intersector::intersect;
//! use std::collections::HashSet;
//!
//! let inputs = vec![
//!     vec!["A", "B", "C"],
//!     vec!["B", "C", "D"],
//!     vec!["C", "B"],
//! ];
//!
//! let found: HashSet<_> = intersect(inputs).unwrap().collect();
//! assert_eq!(found, HashSet::from(["B", "C"]));
//! ```
//!
//! Output order follows the order in which the *last* confirming worker
//! reports each item and is not deterministic across runs.
mod config;
mod engine;
mod error;
mod pool;
mod status;
mod worker;

pub use crate::config::*;
pub use crate::engine::*;
pub use crate::error::*;
pub use crate::pool::*;
pub use crate::status::*;
pub use crate::worker::*;
pub use tokio_util::sync::CancellationToken;
