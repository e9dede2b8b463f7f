//! Fixed-capacity rolling window.

use std::collections::VecDeque;

/// A FIFO that never holds more than `capacity` items.
///
/// Appending to a full window silently evicts the oldest item.
#[derive(Debug, Clone)]
pub struct BoundedWindow<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedWindow<T> {
    /// Create an empty window. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::new(),
            capacity,
        }
    }

    /// Append an item, returning the evicted oldest item if the window was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Maximum number of retained items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of retained items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every item.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Items oldest first, in append order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// Items newest first.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &T> {
        self.items.iter().rev()
    }

    /// The most recently appended item.
    pub fn newest(&self) -> Option<&T> {
        self.items.back()
    }
}

impl BoundedWindow<f64> {
    /// Arithmetic mean, or zero for an empty window.
    pub fn mean(&self) -> f64 {
        if self.items.is_empty() {
            0.0
        } else {
            self.items.iter().sum::<f64>() / self.items.len() as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sixty_samples_keep_last_fifty_in_order() {
        let mut window = BoundedWindow::new(50);
        for i in 0..60 {
            window.push(i as f64);
        }
        assert_eq!(window.len(), 50);
        let kept: Vec<f64> = window.iter().copied().collect();
        let expected: Vec<f64> = (10..60).map(|i| i as f64).collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn test_push_reports_eviction() {
        let mut window = BoundedWindow::new(2);
        assert_eq!(window.push('a'), None);
        assert_eq!(window.push('b'), None);
        assert_eq!(window.push('c'), Some('a'));
        assert_eq!(window.newest(), Some(&'c'));
        let newest_first: Vec<char> = window.iter_newest_first().copied().collect();
        assert_eq!(newest_first, vec!['c', 'b']);
    }

    #[test]
    fn test_mean_and_clear() {
        let mut window = BoundedWindow::new(4);
        assert_eq!(window.mean(), 0.0);
        window.push(50.0);
        window.push(100.0);
        assert_eq!(window.mean(), 75.0);
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.mean(), 0.0);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut window = BoundedWindow::new(0);
        window.push(1);
        window.push(2);
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.iter().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_huge_capacity_allocates_lazily() {
        let mut window = BoundedWindow::new(usize::MAX);
        assert_eq!(window.capacity(), usize::MAX);
        window.push(7u8);
        assert_eq!(window.len(), 1);
        assert_eq!(window.newest(), Some(&7));
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_capacity(capacity in 1usize..64, pushes in 0usize..200) {
            let mut window = BoundedWindow::new(capacity);
            for i in 0..pushes {
                window.push(i);
                prop_assert!(window.len() <= capacity);
            }
            prop_assert_eq!(window.len(), pushes.min(capacity));
            if pushes > 0 {
                prop_assert_eq!(window.newest(), Some(&(pushes - 1)));
            }
        }
    }
}
