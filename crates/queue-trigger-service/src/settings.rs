//! Host service settings

use config::builder::DefaultState;
use config::ConfigBuilder;
use queue_trigger_core::{ConfigError, QueueConfiguration};
use queue_trigger_runtime::{QueueName, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming an additional configuration file
pub const CONFIG_FILE_ENV: &str = "QT_CONFIG_FILE";

/// Prefix for configuration environment variables
pub const ENV_PREFIX: &str = "QT";

/// Errors found while validating [`ServiceConfig`]
#[derive(Debug, Error)]
pub enum ServiceConfigError {
    #[error("No queues configured")]
    NoQueues,

    #[error("Queue '{name}' is configured more than once")]
    DuplicateQueue { name: String },

    #[error("Invalid queue name '{name}': {source}")]
    InvalidQueueName {
        name: String,
        #[source]
        source: ValidationError,
    },

    #[error("Invalid processing settings for queue '{name}': {source}")]
    InvalidProcessing {
        name: String,
        #[source]
        source: ConfigError,
    },
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Queues to listen on
    pub queues: Vec<QueueSettings>,

    /// Demo handler settings
    pub handler: HandlerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            queues: vec![QueueSettings::default()],
            handler: HandlerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the standard layered sources.
    ///
    /// Sources, later ones overriding earlier ones:
    ///  1. /etc/queue-trigger/service.yaml
    ///  2. ./config/service.yaml
    ///  3. The file named by `QT_CONFIG_FILE`
    ///  4. Environment variables prefixed `QT__`, e.g. `QT__LOGGING__JSON_FORMAT=true`
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(
                config::File::with_name("/etc/queue-trigger/service")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            )
            .add_source(
                config::File::with_name("config/service")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            );

        if let Ok(explicit_path) = std::env::var(CONFIG_FILE_ENV) {
            if !explicit_path.is_empty() {
                builder = builder.add_source(
                    config::File::with_name(&explicit_path)
                        .required(true)
                        .format(config::FileFormat::Yaml),
                );
            }
        }

        Self::from_builder(
            builder.add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__")),
        )
    }

    /// Build configuration from an arbitrary set of sources
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, config::ConfigError> {
        builder.build()?.try_deserialize()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ServiceConfigError> {
        if self.queues.is_empty() {
            return Err(ServiceConfigError::NoQueues);
        }

        let mut seen = HashSet::new();
        for queue in &self.queues {
            let name = queue.queue_name()?;
            if queue.poison_queue {
                name.poison()
                    .map_err(|source| ServiceConfigError::InvalidQueueName {
                        name: queue.name.clone(),
                        source,
                    })?;
            }

            if !seen.insert(name) {
                return Err(ServiceConfigError::DuplicateQueue {
                    name: queue.name.clone(),
                });
            }

            queue
                .processing
                .validate()
                .map_err(|source| ServiceConfigError::InvalidProcessing {
                    name: queue.name.clone(),
                    source,
                })?;
        }

        Ok(())
    }
}

/// Settings for one listened-to queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Queue name
    pub name: String,

    /// Escalate failing messages to `{name}-poison`
    pub poison_queue: bool,

    /// Message bodies enqueued at startup
    pub seed_messages: Vec<String>,

    /// Processing policy
    pub processing: QueueConfiguration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            name: "work-items".to_string(),
            poison_queue: true,
            seed_messages: Vec::new(),
            processing: QueueConfiguration::default(),
        }
    }
}

impl QueueSettings {
    pub fn queue_name(&self) -> Result<QueueName, ServiceConfigError> {
        QueueName::new(self.name.clone()).map_err(|source| ServiceConfigError::InvalidQueueName {
            name: self.name.clone(),
            source,
        })
    }
}

/// Demo handler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Simulated work per message in milliseconds
    pub work_duration_ms: u64,

    /// Bodies starting with this prefix fail
    pub failure_prefix: String,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            work_duration_ms: 250,
            failure_prefix: "fail".to_string(),
        }
    }
}

impl HandlerConfig {
    pub fn work_duration(&self) -> Duration {
        Duration::from_millis(self.work_duration_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level for the service crates, overridden by `RUST_LOG`
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Filter directives used when `RUST_LOG` is not set
    pub fn default_directives(&self) -> String {
        format!(
            "queue_trigger_service={level},queue_trigger_core={level},queue_trigger_runtime=warn",
            level = self.level
        )
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
