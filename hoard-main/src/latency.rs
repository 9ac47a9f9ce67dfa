use std::collections::VecDeque;
use std::time::Duration;

/// Sliding window over the most recent load latencies.
#[derive(Debug)]
pub struct LatencyStats {
    samples: VecDeque<f32>,
    total: usize,
}

impl LatencyStats {
    pub fn new(capacity: usize) -> LatencyStats {
        LatencyStats {
            samples: VecDeque::with_capacity(capacity),
            total: 0,
        }
    }

    pub fn add_sample(&mut self, time: Duration) {
        let time = time.as_secs_f32();

        if self.samples.len() == self.samples.capacity() {
            self.samples.pop_front();
        }

        self.samples.push_back(time);
        self.total += 1;
    }

    /// Number of samples ever added, including ones out of the window.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn mean(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }

        self.samples.iter().sum::<f32>() / (self.samples.len() as f32)
    }

    pub fn max(&self) -> f32 {
        self.samples.iter().copied().fold(0.0, f32::max)
    }
}
