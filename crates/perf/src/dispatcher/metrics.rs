//! Latency and failure accounting for the request dispatcher.

use std::collections::VecDeque;
use std::time::Duration;

/// Bounded window of request latencies, oldest sample evicted first.
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, sample: Duration) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Mean of the current samples, zero when empty.
    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.samples.iter().sum();
        total / self.samples.len() as u32
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = &Duration> {
        self.samples.iter()
    }
}

/// Point-in-time view of the dispatcher counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Requests that eventually succeeded.
    pub succeeded: u64,
    /// Requests that failed after exhausting their attempts.
    pub failed: u64,
    /// Number of latency samples currently held.
    pub samples: usize,
    /// Mean latency over the held samples.
    pub average_latency: Duration,
    /// Current pacing interval.
    pub pacing_interval: Duration,
}

impl DispatcherStats {
    /// Percentage of completed requests that succeeded, `None` before any completed.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.succeeded + self.failed;
        if total == 0 {
            None
        } else {
            Some(self.succeeded as f64 * 100.0 / total as f64)
        }
    }
}
