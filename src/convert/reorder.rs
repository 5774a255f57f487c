//! Restores ascending index order over out-of-order completions.

use std::collections::BTreeMap;

/// Holds items that arrived early until every lower index has been released.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next: usize,
    pending: BTreeMap<usize, T>,
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self {
            next: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Accept the item for `index` and return everything now releasable,
    /// in ascending order.
    ///
    /// Indices already released or already pending are ignored.
    pub fn push(&mut self, index: usize, item: T) -> Vec<(usize, T)> {
        if index < self.next || self.pending.contains_key(&index) {
            tracing::debug!(index, next = self.next, "Ignoring duplicate completion");
            return Vec::new();
        }
        self.pending.insert(index, item);

        let mut ready = Vec::new();
        while let Some(item) = self.pending.remove(&self.next) {
            ready.push((self.next, item));
            self.next += 1;
        }
        ready
    }

    /// Lowest index not yet released.
    pub fn next_index(&self) -> usize {
        self.next
    }

    /// Items waiting on a gap.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
