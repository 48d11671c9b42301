use std::collections::VecDeque;
use std::sync::Arc;

/// Set of clients currently eligible for dispatch.
///
/// Entries are compared by identity (`Arc::ptr_eq`), so registering the same
/// client twice is a no-op. [`next_ready`](Self::next_ready) hands out the
/// longest-idle entry first and removes it: a client stays out of the
/// registry while it is working and is re-added when it becomes ready again,
/// which makes dispatch a round-robin over idle connections.
///
/// The registry itself is not synchronized; the pool guards it with a mutex.
#[derive(Debug)]
pub struct ReadyRegistry<T> {
    entries: VecDeque<Arc<T>>,
}

impl<T> ReadyRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Removes and returns the longest-idle entry.
    pub fn next_ready(&mut self) -> Option<Arc<T>> {
        self.entries.pop_front()
    }

    /// Adds an entry at the back. Returns `false` if it was already present.
    pub fn add(&mut self, entry: Arc<T>) -> bool {
        if self.contains(&entry) {
            return false;
        }
        self.entries.push_back(entry);
        true
    }

    /// Removes an entry. Returns `false` if it was not present.
    pub fn remove(&mut self, entry: &Arc<T>) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| !Arc::ptr_eq(e, entry));
        self.entries.len() != before
    }

    pub fn contains(&self, entry: &Arc<T>) -> bool {
        self.entries.iter().any(|e| Arc::ptr_eq(e, entry))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for ReadyRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
