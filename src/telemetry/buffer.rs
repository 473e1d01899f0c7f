//! Fixed-capacity FIFO ring used for every retained telemetry collection.

use std::collections::VecDeque;

/// A ring buffer that evicts its oldest entry when full.
///
/// Eviction is the only way entries leave the buffer.
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedBuffer<T> {
    /// Create an empty buffer. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `item`, returning the evicted oldest entry if the buffer was full.
    #[inline]
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Most recent entry matching `pred`, scanning newest first.
    pub fn find_latest_mut<P>(&mut self, mut pred: P) -> Option<&mut T>
    where
        P: FnMut(&T) -> bool,
    {
        self.items.iter_mut().rev().find(|item| pred(item))
    }

    /// Oldest-first iterator.
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_first() {
        let mut buf = BoundedBuffer::new(3);
        assert_eq!(buf.push(1), None);
        assert_eq!(buf.push(2), None);
        assert_eq!(buf.push(3), None);
        assert_eq!(buf.push(4), Some(1));
        assert_eq!(buf.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn find_latest_prefers_newest() {
        let mut buf = BoundedBuffer::new(4);
        for item in [(1, 'a'), (2, 'b'), (1, 'c')] {
            buf.push(item);
        }
        let found = buf.find_latest_mut(|(k, _)| *k == 1).unwrap();
        assert_eq!(found.1, 'c');
        found.1 = 'z';
        assert_eq!(buf.iter().last(), Some(&(1, 'z')));
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut buf = BoundedBuffer::new(0);
        buf.push("a");
        assert_eq!(buf.push("b"), Some("a"));
        assert_eq!(buf.len(), 1);
    }
}
