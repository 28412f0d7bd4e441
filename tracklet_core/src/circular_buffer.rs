//! Fixed-capacity FIFO between the pair scanner and the triplet engine units.
//!
//! Storage is a pre-sized slot array with explicit read/write cursors, the
//! way the firmware addresses it. When full, `push` overwrites the oldest
//! unread entry and the overflow is counted. The processor's scanner stalls
//! on `is_full` instead of pushing, and reports `overflows` as its dropped
//! pairs.

use crate::error::TrackletError;

#[derive(Debug, Clone)]
pub struct CircularBuffer<T> {
    slots: Box<[Option<T>]>,
    read: usize,
    write: usize,
    len: usize,
    overflows: u64,
}

impl<T> CircularBuffer<T> {
    pub fn new(capacity: usize) -> Result<Self, TrackletError> {
        if capacity == 0 {
            return Err(TrackletError::config("circular buffer capacity must be non-zero"));
        }
        Ok(Self {
            slots: (0..capacity).map(|_| None).collect(),
            read: 0,
            write: 0,
            len: 0,
            overflows: 0,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Entries lost to overwrite since construction or the last `clear`.
    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    /// Appends an entry. Returns `false` if the oldest entry was overwritten.
    pub fn push(&mut self, item: T) -> bool {
        let overwrote = self.is_full();
        self.slots[self.write] = Some(item);
        self.write = self.advance(self.write);
        if overwrote {
            self.read = self.advance(self.read);
            self.overflows += 1;
        } else {
            self.len += 1;
        }
        !overwrote
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let item = self.slots[self.read].take();
        self.read = self.advance(self.read);
        self.len -= 1;
        item
    }

    pub fn peek(&self) -> Option<&T> {
        if self.is_empty() {
            None
        } else {
            self.slots[self.read].as_ref()
        }
    }

    /// Drops all entries and resets cursors and the overflow counter.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.read = 0;
        self.write = 0;
        self.len = 0;
        self.overflows = 0;
    }

    #[inline]
    fn advance(&self, cursor: usize) -> usize {
        (cursor + 1) % self.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            CircularBuffer::<u32>::new(0),
            Err(TrackletError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_fill_and_drain() {
        let mut buffer = CircularBuffer::new(4).unwrap();
        for i in 0..4 {
            assert!(buffer.push(i));
        }
        assert!(buffer.is_full());
        assert_eq!(buffer.peek(), Some(&0));
        let drained: Vec<_> = std::iter::from_fn(|| buffer.pop()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.overflows(), 0);
    }

    #[test]
    fn test_one_past_capacity_overflows_once() {
        let mut buffer = CircularBuffer::new(3).unwrap();
        for i in 0..3 {
            assert!(buffer.push(i));
        }
        assert!(!buffer.push(3));
        assert_eq!(buffer.overflows(), 1);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.pop(), Some(1));
    }

    #[test]
    fn test_wraparound_keeps_order() {
        let mut buffer = CircularBuffer::new(3).unwrap();
        buffer.push(1);
        buffer.push(2);
        assert_eq!(buffer.pop(), Some(1));
        buffer.push(3);
        buffer.push(4);
        assert!(buffer.is_full());
        assert_eq!(buffer.pop(), Some(2));
        assert_eq!(buffer.pop(), Some(3));
        assert_eq!(buffer.pop(), Some(4));
        assert_eq!(buffer.pop(), None);
    }

    #[test]
    fn test_clear_resets() {
        let mut buffer = CircularBuffer::new(2).unwrap();
        buffer.push('a');
        buffer.push('b');
        buffer.push('c');
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.overflows(), 0);
        assert!(buffer.push('d'));
        assert_eq!(buffer.pop(), Some('d'));
    }

    proptest! {
        #[test]
        fn prop_overflow_keeps_last_capacity_items(capacity in 1usize..32, n in 0usize..100) {
            let mut buffer = CircularBuffer::new(capacity).unwrap();
            for i in 0..n {
                buffer.push(i);
            }
            prop_assert_eq!(buffer.overflows() as usize, n.saturating_sub(capacity));
            let survivors: Vec<_> = std::iter::from_fn(|| buffer.pop()).collect();
            let expected: Vec<_> = (n.saturating_sub(capacity)..n).collect();
            prop_assert_eq!(survivors, expected);
        }

        #[test]
        fn prop_interleaved_fifo(ops in proptest::collection::vec(any::<bool>(), 0..200)) {
            let mut buffer = CircularBuffer::new(8).unwrap();
            let mut model = std::collections::VecDeque::new();
            for (i, push) in ops.into_iter().enumerate() {
                if push && model.len() < 8 {
                    buffer.push(i);
                    model.push_back(i);
                } else {
                    prop_assert_eq!(buffer.pop(), model.pop_front());
                }
                prop_assert_eq!(buffer.len(), model.len());
            }
        }
    }
}
