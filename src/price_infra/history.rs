//! Fixed-capacity price history.
//!
//! Slots are allocated once. When the buffer is full the next append
//! overwrites the oldest point; that overwrite is the only eviction path.

use serde::{Deserialize, Serialize};
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;
use crate::HISTORY_CAPACITY;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: Price,
    pub timestamp: Timestamp,
}

impl PricePoint {
    pub fn new(price: Price, timestamp: Timestamp) -> Self {
        PricePoint { price, timestamp }
    }
}

#[derive(Clone, Debug)]
pub struct PriceHistory {
    slots: Vec<PricePoint>,
    head: usize,
    len: usize,
}

impl PriceHistory {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        PriceHistory {
            slots: vec![PricePoint::default(); capacity],
            head: 0,
            len: 0,
        }
    }

    /// Writes at `(head + 1) % capacity` and advances head.
    pub fn append(&mut self, point: PricePoint) {
        let capacity = self.capacity();
        self.head = (self.head + 1) % capacity;
        self.slots[self.head] = point;
        if self.len < capacity {
            self.len += 1;
        }
    }

    pub fn latest(&self) -> Option<PricePoint> {
        if self.len == 0 {
            None
        } else {
            Some(self.slots[self.head])
        }
    }

    /// Newest to oldest.
    pub fn iter_backward(&self) -> BackwardIter<'_> {
        BackwardIter {
            history: self,
            offset: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

impl Default for PriceHistory {
    fn default() -> Self {
        Self::new()
    }
}

pub struct BackwardIter<'a> {
    history: &'a PriceHistory,
    offset: usize,
}

impl<'a> Iterator for BackwardIter<'a> {
    type Item = PricePoint;

    fn next(&mut self) -> Option<PricePoint> {
        if self.offset >= self.history.len {
            return None;
        }
        let capacity = self.history.capacity();
        let index = (self.history.head + capacity - self.offset) % capacity;
        self.offset += 1;
        Some(self.history.slots[index])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.history.len - self.offset;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BackwardIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(units: u64, secs: u64) -> PricePoint {
        PricePoint::new(Price::from_units(units), Timestamp::from_secs(secs))
    }

    #[test]
    fn test_empty_history() {
        let history = PriceHistory::with_capacity(4);
        assert!(history.is_empty());
        assert_eq!(history.latest(), None);
        assert_eq!(history.iter_backward().count(), 0);
    }

    #[test]
    fn test_backward_iteration_order() {
        let mut history = PriceHistory::with_capacity(4);
        history.append(point(1, 10));
        history.append(point(2, 20));
        history.append(point(3, 30));

        let prices: Vec<_> = history.iter_backward().map(|p| p.timestamp.as_secs()).collect();
        assert_eq!(prices, vec![30, 20, 10]);
        assert_eq!(history.latest(), Some(point(3, 30)));
    }

    #[test]
    fn test_wrap_overwrites_oldest() {
        let mut history = PriceHistory::with_capacity(3);
        for i in 1..=5 {
            history.append(point(i, i * 10));
        }

        assert_eq!(history.len(), 3);
        assert_eq!(history.capacity(), 3);
        let seen: Vec<_> = history.iter_backward().map(|p| p.timestamp.as_secs()).collect();
        assert_eq!(seen, vec![50, 40, 30]);
    }

    #[test]
    fn test_default_capacity() {
        let history = PriceHistory::new();
        assert_eq!(history.capacity(), HISTORY_CAPACITY);
        assert_eq!(history.iter_backward().len(), 0);
    }
}
