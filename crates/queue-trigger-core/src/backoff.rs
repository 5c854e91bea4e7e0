//! # Polling Backoff
//!
//! Computes the delay between polls of a queue.
//!
//! Finding work resets the delay to the minimum polling interval. Each empty
//! poll grows the delay exponentially until it reaches the configured maximum,
//! where it holds. Jitter only ever scales the growth step, so consecutive
//! empty polls never produce a shorter delay.

use rand::Rng;
use std::time::Duration;

/// Adaptive polling delay calculator
///
/// # Examples
///
/// ```rust
/// use queue_trigger_core::BackoffScheduler;
/// use std::time::Duration;
///
/// let mut backoff =
///     BackoffScheduler::new(Duration::from_millis(100), Duration::from_secs(1)).without_jitter();
///
/// assert_eq!(backoff.next_delay(false), Duration::from_millis(200));
/// assert_eq!(backoff.next_delay(false), Duration::from_millis(400));
/// assert_eq!(backoff.next_delay(true), Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct BackoffScheduler {
    /// Delay after work was found
    min_interval: Duration,

    /// Ceiling for the delay
    max_interval: Duration,

    /// Growth factor applied per empty poll (typically 2.0)
    multiplier: f64,

    /// Whether to randomise the growth step
    use_jitter: bool,

    /// Jitter range for the growth step as a fraction (0.2 = ±20%)
    jitter_percent: f64,

    /// Delay returned by the last call
    current: Duration,
}

impl BackoffScheduler {
    /// Create a scheduler bounded by `min_interval` and `max_interval`
    pub fn new(min_interval: Duration, max_interval: Duration) -> Self {
        Self {
            min_interval,
            max_interval: max_interval.max(min_interval),
            multiplier: 2.0,
            use_jitter: true,
            jitter_percent: 0.2,
            current: min_interval,
        }
    }

    /// Disable jitter for predictable delays
    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    /// Set the growth factor (values below 1.0 are treated as 1.0)
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Set the jitter range as a fraction (0.0 to 1.0)
    pub fn with_jitter_percent(mut self, percent: f64) -> Self {
        self.jitter_percent = percent.clamp(0.0, 1.0);
        self
    }

    /// Delay before the next poll, given whether the last poll found work
    pub fn next_delay(&mut self, work_found: bool) -> Duration {
        if work_found {
            self.current = self.min_interval;
            return self.current;
        }

        let mut step = self.current.as_nanos() as f64 * (self.multiplier - 1.0);
        if self.use_jitter && step > 0.0 {
            let jitter = self.jitter_percent;
            step *= rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        }

        let step = Duration::from_nanos(step.round() as u64);
        self.current = self
            .current
            .saturating_add(step)
            .min(self.max_interval)
            .max(self.current);
        self.current
    }

    /// Delay returned by the last call
    pub fn current_interval(&self) -> Duration {
        self.current
    }

    /// Minimum delay
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Maximum delay
    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
