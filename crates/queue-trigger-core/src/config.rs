//! Per-listener queue processing configuration.
//!
//! [`QueueConfiguration`] is handed to the listener by the host at
//! construction time. Nothing in this crate reads configuration from the
//! environment.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Largest batch a single fetch may request
pub const MAX_BATCH_SIZE: u32 = 32;

/// Delay used after the first empty poll following work, and the floor for
/// every polling delay
pub const MINIMUM_POLLING_INTERVAL: Duration = Duration::from_millis(100);

/// Default ceiling for empty-queue backoff
pub const DEFAULT_MAX_POLLING_INTERVAL: Duration = Duration::from_secs(60);

/// Lease granted on dequeue when no visibility timeout is configured
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(10 * 60);

/// Default lower bound on the time between two lease renewals
pub const DEFAULT_MINIMUM_VISIBILITY_RENEWAL_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Immutable queue processing policy for one listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfiguration {
    /// Maximum number of messages in flight at once
    pub batch_size: u32,

    /// In-flight count at or below which a new batch is fetched.
    /// Defaults to half the batch size.
    pub new_batch_threshold: Option<u32>,

    /// Deliveries allowed before a failing message is moved to the poison queue
    pub max_dequeue_count: u32,

    /// Lease granted on dequeue and delay before a failed message reappears.
    /// Zero releases failed messages at their natural lease expiry.
    #[serde(with = "duration_millis", rename = "visibility_timeout_ms")]
    pub visibility_timeout: Duration,

    /// Ceiling for the empty-queue polling delay
    #[serde(with = "duration_millis", rename = "max_polling_interval_ms")]
    pub max_polling_interval: Duration,

    /// Lease renewals never fire more often than this
    #[serde(
        with = "duration_millis",
        rename = "minimum_visibility_renewal_interval_ms"
    )]
    pub minimum_visibility_renewal_interval: Duration,
}

impl Default for QueueConfiguration {
    fn default() -> Self {
        Self {
            batch_size: 16,
            new_batch_threshold: None,
            max_dequeue_count: 5,
            visibility_timeout: Duration::ZERO,
            max_polling_interval: DEFAULT_MAX_POLLING_INTERVAL,
            minimum_visibility_renewal_interval: DEFAULT_MINIMUM_VISIBILITY_RENEWAL_INTERVAL,
        }
    }
}

impl QueueConfiguration {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the new batch threshold
    pub fn with_new_batch_threshold(mut self, threshold: u32) -> Self {
        self.new_batch_threshold = Some(threshold);
        self
    }

    /// Set the maximum dequeue count
    pub fn with_max_dequeue_count(mut self, max_dequeue_count: u32) -> Self {
        self.max_dequeue_count = max_dequeue_count;
        self
    }

    /// Set the visibility timeout
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Set the maximum polling interval
    pub fn with_max_polling_interval(mut self, interval: Duration) -> Self {
        self.max_polling_interval = interval;
        self
    }

    /// Set the minimum visibility renewal interval
    pub fn with_minimum_visibility_renewal_interval(mut self, interval: Duration) -> Self {
        self.minimum_visibility_renewal_interval = interval;
        self
    }

    /// Effective new batch threshold
    pub fn new_batch_threshold(&self) -> u32 {
        self.new_batch_threshold.unwrap_or(self.batch_size / 2)
    }

    /// Lease requested when dequeuing a batch
    pub fn lease_duration(&self) -> Duration {
        if self.visibility_timeout.is_zero() {
            DEFAULT_LEASE_DURATION
        } else {
            self.visibility_timeout
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "batch_size".to_string(),
                message: format!("must be between 1 and {}", MAX_BATCH_SIZE),
            });
        }

        if self.new_batch_threshold() > self.batch_size {
            return Err(ConfigError::InvalidValue {
                field: "new_batch_threshold".to_string(),
                message: "must not exceed batch_size".to_string(),
            });
        }

        if self.max_dequeue_count == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_dequeue_count".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.max_polling_interval < MINIMUM_POLLING_INTERVAL {
            return Err(ConfigError::InvalidValue {
                field: "max_polling_interval".to_string(),
                message: format!(
                    "must be at least {}ms",
                    MINIMUM_POLLING_INTERVAL.as_millis()
                ),
            });
        }

        if self.minimum_visibility_renewal_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "minimum_visibility_renewal_interval".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
