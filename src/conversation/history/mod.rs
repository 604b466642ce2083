#[cfg(test)]
mod tests;

use std::collections::VecDeque;

/// Fixed-capacity ring buffer that evicts its oldest entry when full.
///
/// Entries are kept oldest first. Eviction is silent: [`RollingHistory::push`]
/// hands the evicted entry back so a caller can undo the push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingHistory<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingHistory<T> {
    /// Create an empty history holding at most `capacity` entries (minimum 1)
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, returning the oldest entry if it had to be evicted
    #[inline]
    pub fn push(&mut self, entry: T) -> Option<T> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    /// Remove and return the newest entry
    #[inline]
    pub fn pop_newest(&mut self) -> Option<T> {
        self.entries.pop_back()
    }

    /// Put a previously evicted entry back at the oldest position.
    ///
    /// Ignored when the history is already full.
    #[inline]
    pub fn restore_oldest(&mut self, entry: T) {
        if self.entries.len() < self.capacity {
            self.entries.push_front(entry);
        }
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    #[inline]
    pub fn oldest(&self) -> Option<&T> {
        self.entries.front()
    }

    #[inline]
    pub fn newest(&self) -> Option<&T> {
        self.entries.back()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
