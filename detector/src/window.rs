use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One comparison result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffSample {
    pub at: Instant,
    pub score: f64,
}

/// Aggregates over the live samples of a [`DiffWindow`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowStats {
    pub count: usize,
    pub avg: f64,
    pub max: f64,
}

/// Trailing, time-bounded sequence of diff samples in insertion (= time) order.
#[derive(Debug)]
pub struct DiffWindow {
    span: Duration,
    samples: VecDeque<DiffSample>,
}

impl DiffWindow {
    pub fn new(span: Duration) -> Self {
        Self {
            span,
            samples: VecDeque::new(),
        }
    }

    pub fn push(&mut self, at: Instant, score: f64) {
        self.samples.push_back(DiffSample { at, score });
    }

    /// Drop every sample older than the window span relative to `now`.
    /// A sample exactly `span` old is still live.
    pub fn evict(&mut self, now: Instant) {
        while let Some(front) = self.samples.front() {
            if now.saturating_duration_since(front.at) > self.span {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn stats(&self) -> WindowStats {
        if self.samples.is_empty() {
            return WindowStats::default();
        }
        let count = self.samples.len();
        let sum: f64 = self.samples.iter().map(|s| s.score).sum();
        let max = self
            .samples
            .iter()
            .map(|s| s.score)
            .fold(f64::MIN, f64::max);
        WindowStats {
            count,
            avg: sum / count as f64,
            max,
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn span(&self) -> Duration {
        self.span
    }
}
