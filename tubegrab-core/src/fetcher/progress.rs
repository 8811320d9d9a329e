//! Transfer progress: the sampled state of one transfer and the reporter seam that displays it.

use std::time::{Duration, Instant};

/// One progress update, ready for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    /// Bytes transferred so far, never decreasing across samples.
    pub transferred: u64,
    /// The expected total, if known.
    pub total: Option<u64>,
    /// Bytes still expected, if the total is known.
    pub remaining: Option<u64>,
    /// Throughput since the previous sample, in bytes per second.
    pub rate: Option<f64>,
    /// Estimated time to completion.
    pub eta: Option<Duration>,
}

/// The progress state owned by one transfer.
#[derive(Debug, Clone)]
pub struct TransferState {
    total: Option<u64>,
    transferred: u64,
    last_sample_at: Instant,
    last_sample_bytes: u64,
}

impl TransferState {
    /// Starts tracking a transfer at `started_at`.
    pub fn new(total: Option<u64>, started_at: Instant) -> Self {
        Self {
            total,
            transferred: 0,
            last_sample_at: started_at,
            last_sample_bytes: 0,
        }
    }

    /// The highest byte count seen so far.
    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    /// The expected total, if known.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Records the cumulative byte count observed at `now`.
    ///
    /// A count lower than a previous one is clamped, and no rate is computed when no time has elapsed.
    pub fn sample(&mut self, now: Instant, transferred: u64) -> ProgressSample {
        self.transferred = self.transferred.max(transferred);

        let elapsed = now.saturating_duration_since(self.last_sample_at);
        let rate = if elapsed.is_zero() {
            None
        } else {
            let delta = self.transferred.saturating_sub(self.last_sample_bytes);
            self.last_sample_at = now;
            self.last_sample_bytes = self.transferred;
            Some(delta as f64 / elapsed.as_secs_f64())
        };

        let remaining = self
            .total
            .map(|total| total.saturating_sub(self.transferred));
        let eta = match (remaining, rate) {
            // A crawling rate against a huge total does not fit in a Duration
            (Some(remaining), Some(rate)) if rate > 0.0 => {
                Duration::try_from_secs_f64(remaining as f64 / rate).ok()
            }
            _ => None,
        };

        ProgressSample {
            transferred: self.transferred,
            total: self.total,
            remaining,
            rate,
            eta,
        }
    }
}

/// Displays the progress of one transfer.
pub trait ProgressHandle: Send {
    /// Shows a new sample.
    fn update(&mut self, sample: &ProgressSample);

    /// Marks the transfer as complete.
    fn finish(&mut self);
}

/// Creates a display for each transfer.
pub trait ProgressReporter: Send + Sync {
    /// Starts displaying a transfer.
    ///
    /// # Arguments
    ///
    /// * `label` - A short name of what is transferred, usually the file name.
    /// * `total` - The expected size in bytes, if known.
    fn start(&self, label: &str, total: Option<u64>) -> Box<dyn ProgressHandle>;
}

/// A reporter that displays nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn start(&self, _label: &str, _total: Option<u64>) -> Box<dyn ProgressHandle> {
        Box::new(NoProgress)
    }
}

impl ProgressHandle for NoProgress {
    fn update(&mut self, _sample: &ProgressSample) {}

    fn finish(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_and_eta_from_elapsed_time() {
        let start = Instant::now();
        let mut state = TransferState::new(Some(1_000), start);

        let sample = state.sample(start + Duration::from_secs(2), 200);

        assert_eq!(sample.transferred, 200);
        assert_eq!(sample.remaining, Some(800));
        assert_eq!(sample.rate, Some(100.0));
        assert_eq!(sample.eta, Some(Duration::from_secs(8)));
    }

    #[test]
    fn zero_elapsed_yields_unknown_rate() {
        let start = Instant::now();
        let mut state = TransferState::new(Some(1_000), start);

        let sample = state.sample(start, 500);

        assert_eq!(sample.transferred, 500);
        assert_eq!(sample.rate, None);
        assert_eq!(sample.eta, None);
    }

    #[test]
    fn stalled_transfer_has_no_eta() {
        let start = Instant::now();
        let mut state = TransferState::new(Some(1_000), start);
        state.sample(start + Duration::from_secs(1), 100);

        let sample = state.sample(start + Duration::from_secs(2), 100);

        assert_eq!(sample.rate, Some(0.0));
        assert_eq!(sample.eta, None);
    }

    #[test]
    fn transferred_never_regresses() {
        let start = Instant::now();
        let mut state = TransferState::new(None, start);
        let counts = [10, 50, 40, 50, 0, 120];

        let mut previous = 0;
        for (i, count) in counts.into_iter().enumerate() {
            let sample = state.sample(start + Duration::from_millis(100 * (i as u64 + 1)), count);
            assert!(sample.transferred >= previous);
            assert!(sample.rate.is_none_or(|rate| rate >= 0.0));
            previous = sample.transferred;
        }

        assert_eq!(state.transferred(), 120);
    }

    #[test]
    fn unknown_total_has_no_remaining() {
        let start = Instant::now();
        let mut state = TransferState::new(None, start);

        let sample = state.sample(start + Duration::from_secs(1), 64);

        assert_eq!(sample.remaining, None);
        assert_eq!(sample.eta, None);
        assert_eq!(sample.rate, Some(64.0));
    }

    #[test]
    fn unrepresentable_eta_is_unknown() {
        let start = Instant::now();
        let mut state = TransferState::new(Some(u64::MAX), start);

        let sample = state.sample(start + Duration::from_secs(1_000), 1);

        assert_eq!(sample.rate, Some(0.001));
        assert_eq!(sample.eta, None);
    }

    #[test]
    fn overshoot_clamps_remaining_to_zero() {
        let start = Instant::now();
        let mut state = TransferState::new(Some(100), start);

        let sample = state.sample(start + Duration::from_secs(1), 150);

        assert_eq!(sample.remaining, Some(0));
        assert_eq!(sample.eta, Some(Duration::ZERO));
    }
}
