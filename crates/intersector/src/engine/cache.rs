use crate::worker::WorkerId;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Orchestrator-owned map from item to the workers that have reported it.
///
/// An entry is removed the moment every worker has reported its item. A
/// histogram of entry sizes keeps the largest membership available without
/// scanning the map.
pub(crate) struct MembershipCache<T> {
    entries: HashMap<T, HashSet<WorkerId>>,
    /// `sizes[k]` is the number of entries with exactly `k` members.
    sizes: Vec<usize>,
    required: usize,
}

impl<T> MembershipCache<T>
where
    T: Eq + Hash,
{
    /// Creates a cache that completes an item after `required` distinct
    /// workers reported it.
    pub(crate) fn new(required: usize) -> Self {
        Self {
            entries: HashMap::new(),
            sizes: vec![0; required + 1],
            required,
        }
    }

    /// Records that `worker` produced `item`.
    ///
    /// Returns the item once its membership is complete, removing the entry.
    /// Repeated reports from the same worker count once.
    pub(crate) fn record(&mut self, item: T, worker: WorkerId) -> Option<T> {
        if self.required <= 1 {
            return Some(item);
        }

        match self.entries.get_mut(&item) {
            Some(members) => {
                let before = members.len();
                if !members.insert(worker) {
                    return None;
                }

                self.sizes[before] -= 1;
                if before + 1 == self.required {
                    self.entries.remove_entry(&item).map(|(stored, _)| stored)
                } else {
                    self.sizes[before + 1] += 1;
                    None
                }
            }
            None => {
                self.entries.insert(item, HashSet::from([worker]));
                self.sizes[1] += 1;
                None
            }
        }
    }
}

impl<T> MembershipCache<T> {
    /// Size of the largest pending entry, or `None` when nothing is pending.
    pub(crate) fn max_membership(&self) -> Option<usize> {
        self.sizes.iter().rposition(|&count| count > 0)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.sizes.fill(0);
    }
}
