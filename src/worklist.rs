use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// FIFO queue in which every element is pending at most once.
#[derive(Debug, Clone)]
pub struct Worklist<T> {
    queue: VecDeque<T>,
    pending: HashSet<T>,
}

impl<T> Default for Worklist<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            pending: HashSet::new(),
        }
    }
}

impl<T> Worklist<T>
where
    T: Copy + Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `item` unless it is already pending. Returns `true` if it was added.
    pub fn push(&mut self, item: T) -> bool {
        if self.pending.insert(item) {
            self.queue.push_back(item);
            true
        } else {
            false
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        let item = self.queue.pop_front()?;
        self.pending.remove(&item);
        Some(item)
    }

    pub fn contains(&self, item: &T) -> bool {
        self.pending.contains(item)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T> Extend<T> for Worklist<T>
where
    T: Copy + Eq + Hash,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_without_duplicates() {
        let mut wl = Worklist::new();
        assert!(wl.push(3));
        assert!(wl.push(1));
        assert!(!wl.push(3));
        wl.extend([2, 1]);
        assert_eq!(wl.len(), 3);

        assert_eq!(wl.pop(), Some(3));
        assert!(!wl.contains(&3));
        assert!(wl.push(3));
        assert_eq!(wl.pop(), Some(1));
        assert_eq!(wl.pop(), Some(2));
        assert_eq!(wl.pop(), Some(3));
        assert_eq!(wl.pop(), None);
        assert!(wl.is_empty());
    }
}
