use crate::telemetry::Reading;
use std::collections::VecDeque;
use std::sync::Arc;

/// Fixed-capacity, append-ordered store; the oldest reading is evicted first.
/// Ordering is whatever the caller appends; nothing here re-sorts.
#[derive(Debug)]
pub struct ReadingBuffer {
    capacity: usize,
    readings: VecDeque<Reading>,
}

impl ReadingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            readings: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Returns how many readings were evicted to stay within capacity.
    pub fn append(&mut self, reading: Reading) -> usize {
        self.readings.push_back(reading);
        let mut evicted = 0;
        while self.readings.len() > self.capacity {
            self.readings.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.readings.back()
    }

    /// True when an identical reading is already buffered. Only the tail run whose
    /// timestamp is not older than `reading` is scanned.
    pub fn holds(&self, reading: &Reading) -> bool {
        self.readings
            .iter()
            .rev()
            .take_while(|held| held.timestamp() >= reading.timestamp())
            .any(|held| held == reading)
    }

    pub fn history(&self) -> History {
        History(self.readings.iter().cloned().collect())
    }
}

/// Oldest-to-newest listing taken at one point in time. Later appends never show up in it.
#[derive(Debug, Clone, PartialEq)]
pub struct History(Arc<[Reading]>);

impl History {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Reading> {
        self.0.iter()
    }
}

impl Default for History {
    fn default() -> Self {
        History(Arc::from(Vec::new()))
    }
}
