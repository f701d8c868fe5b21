//! [`LatencyWindow`] – rolling window of recent round-trip latencies.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use brainstem_runtime::latency::LatencyWindow;
//!
//! let mut window = LatencyWindow::new(2);
//! window.record(Duration::from_millis(10));
//! window.record(Duration::from_millis(20));
//! window.record(Duration::from_millis(30)); // evicts the 10 ms sample
//! assert_eq!(window.average(), Some(Duration::from_millis(25)));
//! ```

use std::collections::VecDeque;
use std::time::Duration;

/// Default number of samples kept.
pub const DEFAULT_CAPACITY: usize = 100;

/// Bounded FIFO of latency samples; the oldest sample is dropped first.
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    capacity: usize,
    samples: VecDeque<Duration>,
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LatencyWindow {
    /// A window holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, latency: Duration) {
        self.samples.push_back(latency);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Mean of the retained samples, `None` when empty.
    pub fn average(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / self.samples.len() as u32)
    }

    pub fn max(&self) -> Option<Duration> {
        self.samples.iter().max().copied()
    }

    pub fn latest(&self) -> Option<Duration> {
        self.samples.back().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
