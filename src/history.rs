use std::collections::VecDeque;

use crate::types::Sample;

/// Number of samples retained for display
pub const DEFAULT_HISTORY_CAPACITY: usize = 5;

/// Fixed-capacity FIFO of the most recent samples, oldest first.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Create a buffer retaining at most `capacity` samples
    ///
    /// A capacity of zero is bumped to one so the latest sample is always
    /// visible.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `sample`, evicting the oldest one when full
    pub fn push(&mut self, sample: Sample) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Retained samples, oldest to newest
    pub fn snapshot(&self) -> impl ExactSizeIterator<Item = &Sample> + '_ {
        self.samples.iter()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConnectionSample, DisplayKey};
    use chrono::Local;

    fn sample(bytes: u64) -> Sample {
        Sample::new(
            Local::now(),
            vec![ConnectionSample {
                key: DisplayKey {
                    application: "curl".to_string(),
                    remote: "example.com:443".to_string(),
                    local: "10.0.0.2:50000".to_string(),
                    protocol: "TCP".to_string(),
                },
                bytes,
            }],
        )
    }

    #[test]
    fn keeps_only_the_last_five() {
        let mut history = HistoryBuffer::default();
        for bytes in 1..=6 {
            history.push(sample(bytes));
        }

        assert_eq!(history.len(), 5);
        let kept: Vec<u64> = history.snapshot().map(Sample::total_bytes).collect();
        assert_eq!(kept, vec![2, 3, 4, 5, 6]);
        assert_eq!(history.latest().map(Sample::total_bytes), Some(6));
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut history = HistoryBuffer::new(3);
        for bytes in 0..50 {
            history.push(sample(bytes));
            assert!(history.len() <= 3);
        }
        assert_eq!(history.latest().map(Sample::total_bytes), Some(49));
    }

    #[test]
    fn zero_capacity_still_holds_latest() {
        let mut history = HistoryBuffer::new(0);
        history.push(sample(1));
        history.push(sample(2));
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.latest().map(Sample::total_bytes), Some(2));
    }
}
