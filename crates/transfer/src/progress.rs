use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

/// Bytes moved so far out of the declared total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub transferred: u64,
    pub total: u64,
}

impl Progress {
    /// Completion percentage; an empty file counts as done.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.transferred as f64 * 100.0 / self.total as f64
    }
}

/// Reports progress without blocking the transfer.
pub(crate) fn report(tx: &mpsc::Sender<Progress>, transferred: u64, total: u64) {
    let _ = tx.try_send(Progress { transferred, total });
}

struct SpeedSample {
    transferred: u64,
    timestamp: Instant,
}

/// Calculates transfer speed over a sliding window of progress samples.
pub struct SpeedCalculator {
    samples: VecDeque<SpeedSample>,
    window: Duration,
}

impl SpeedCalculator {
    /// Creates a calculator; `window` defaults to 5 s.
    pub fn new(window: Option<Duration>) -> Self {
        Self {
            samples: VecDeque::new(),
            window: window.unwrap_or(Duration::from_secs(5)),
        }
    }

    /// Records the cumulative byte count at the current instant.
    pub fn add_sample(&mut self, transferred: u64) {
        self.add_sample_at(transferred, Instant::now());
    }

    fn add_sample_at(&mut self, transferred: u64, timestamp: Instant) {
        self.samples.push_back(SpeedSample {
            transferred,
            timestamp,
        });

        // Prune samples outside the window, keeping at least two.
        while self.samples.len() > 2 {
            match self.samples.front() {
                Some(first) if timestamp.duration_since(first.timestamp) > self.window => {
                    self.samples.pop_front();
                }
                _ => break,
            }
        }
    }

    /// Average speed in bytes/second within the window (0.0 with fewer than 2 samples).
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }
        last.transferred.saturating_sub(first.transferred) as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to move `remaining` bytes, if the speed is known.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / speed))
    }
}
