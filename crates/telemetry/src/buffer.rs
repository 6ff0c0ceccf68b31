//! Bounded, insertion-ordered stream buffer.
//!
//! Holds the most recent entries of a push stream (engine output lines,
//! structured security events). Capacity is fixed at construction; every
//! append past capacity evicts exactly the overflow from the front, so the
//! newest entry is always retained and survivors keep their arrival order.
//!
//! Storage is an [`im::Vector`], so a snapshot is an O(1) structural clone
//! and readers never observe a half-applied append.

use im::Vector;

/// Capacity used for subprocess output lines.
pub const OUTPUT_CAPACITY: usize = 1000;

/// Capacity used for structured security events.
pub const EVENT_CAPACITY: usize = 300;

/// Fixed-capacity, drop-oldest buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedBuffer<T: Clone> {
    entries: Vector<T>,
    capacity: usize,
}

impl<T: Clone> BoundedBuffer<T> {
    /// Create an empty buffer.
    ///
    /// A capacity of zero is raised to one so that the newest entry is
    /// always retained.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vector::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append an entry, evicting the oldest entries on overflow.
    pub fn push(&mut self, entry: T) {
        self.entries.push_back(entry);
        let overflow = self.entries.len().saturating_sub(self.capacity);
        if overflow > 0 {
            self.entries = self.entries.skip(overflow);
        }
    }

    /// Return a new buffer with `entry` appended, leaving `self` untouched.
    #[must_use]
    pub fn append(&self, entry: T) -> Self {
        let mut next = self.clone();
        next.push(entry);
        next
    }

    /// Append every entry of `entries` in order.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, entries: I) {
        for entry in entries {
            self.push(entry);
        }
    }

    /// Ordered snapshot of the retained entries, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vector<T> {
        self.entries.clone()
    }

    /// Iterate retained entries, oldest first.
    pub fn iter(&self) -> im::vector::Iter<'_, T> {
        self.entries.iter()
    }

    /// Newest retained entry.
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.entries.back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry. Capacity is unchanged.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<'a, T: Clone> IntoIterator for &'a BoundedBuffer<T> {
    type Item = &'a T;
    type IntoIter = im::vector::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn contents(buffer: &BoundedBuffer<u32>) -> Vec<u32> {
        buffer.iter().copied().collect()
    }

    #[test]
    fn test_buffer_creation() {
        let buffer: BoundedBuffer<u32> = BoundedBuffer::with_capacity(OUTPUT_CAPACITY);
        assert_eq!(buffer.capacity(), 1000);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_push_under_capacity_keeps_everything() {
        let mut buffer = BoundedBuffer::with_capacity(4);
        buffer.extend([1, 2, 3]);
        assert_eq!(contents(&buffer), vec![1, 2, 3]);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut buffer = BoundedBuffer::with_capacity(3);
        buffer.extend([1, 2, 3, 4, 5]);

        assert_eq!(buffer.len(), 3);
        assert_eq!(contents(&buffer), vec![3, 4, 5]);
        assert_eq!(buffer.last(), Some(&5));
    }

    #[test]
    fn test_zero_capacity_still_keeps_newest() {
        let mut buffer = BoundedBuffer::with_capacity(0);
        buffer.extend([7, 8]);
        assert_eq!(contents(&buffer), vec![8]);
    }

    #[test]
    fn test_append_leaves_original_untouched() {
        let base = BoundedBuffer::with_capacity(2).append(1).append(2);
        let next = base.append(3);

        assert_eq!(contents(&base), vec![1, 2]);
        assert_eq!(contents(&next), vec![2, 3]);
    }

    #[test]
    fn test_snapshot_is_stable_across_later_pushes() {
        let mut buffer = BoundedBuffer::with_capacity(2);
        buffer.extend([1, 2]);
        let snapshot = buffer.snapshot();
        buffer.push(3);

        assert_eq!(snapshot.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(contents(&buffer), vec![2, 3]);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut buffer = BoundedBuffer::with_capacity(EVENT_CAPACITY);
        buffer.push(1);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 300);
    }
}
