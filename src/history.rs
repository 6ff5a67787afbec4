//! Bounded rolling history.
//!
//! Fixed-window buffer of the most recent samples. Once the window is full
//! each push evicts the oldest sample. Used for per-pair relative-motion
//! samples and per-body contact force/torque samples.

use std::collections::VecDeque;

/// Rolling window of the last `capacity` samples.
#[derive(Clone, Debug, Default)]
pub struct History<T> {
    samples: VecDeque<T>,
    capacity: usize,
}

impl<T: Copy> History<T> {
    /// Create an empty history holding at most `capacity` samples
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full
    #[inline]
    pub fn push(&mut self, value: T) {
        if self.capacity == 0 {
            return;
        }
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Change the window length, dropping the oldest samples if it shrank
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.samples.len() > capacity {
            self.samples.pop_front();
        }
    }

    /// Window length
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stored samples
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no samples are stored
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True once the window holds `capacity` samples
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.samples.len() >= self.capacity
    }

    /// Most recent sample
    #[inline]
    #[must_use]
    pub fn latest(&self) -> Option<T> {
        self.samples.back().copied()
    }

    /// Iterate oldest → newest
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.samples.iter()
    }

    /// Drop all samples
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl History<f64> {
    /// True when the window is full and every sample is below `threshold`
    #[must_use]
    pub fn full_and_below(&self, threshold: f64) -> bool {
        self.is_full() && self.samples.iter().all(|&s| s < threshold)
    }
}
