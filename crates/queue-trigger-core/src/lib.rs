//! # Queue-Trigger Core
//!
//! At-least-once processing engine for visibility-timeout based queues.
//!
//! A [`QueueListener`] polls a queue in adaptive batches, hands each message to
//! a [`TriggerExecutor`], keeps the message leased with a [`LeaseRenewer`]
//! while the handler runs, and lets a [`MessageProcessor`] decide whether the
//! message is deleted, released for retry, or moved to the poison queue.
//!
//! ## Architecture
//!
//! - Business logic depends only on the [`QueueClient`] and [`TriggerExecutor`]
//!   traits; providers and handlers are injected by the host
//! - All tunables arrive through [`QueueConfiguration`] at construction time
//! - Cancellation flows through [`CancellationToken`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use queue_trigger_core::{FnTriggerExecutor, QueueConfiguration, QueueListener};
//! use queue_trigger_runtime::{InMemoryProvider, QueueClient, QueueName};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = InMemoryProvider::default();
//! let name = QueueName::new("orders".to_string())?;
//! let queue = Arc::new(provider.queue(name.clone()));
//! let poison = Arc::new(provider.queue(name.poison()?));
//! queue.create_if_not_exists().await?;
//!
//! let executor = FnTriggerExecutor::new(|message, _cancel| async move {
//!     println!("received {:?}", message.body_as_str());
//!     anyhow::Ok(())
//! });
//!
//! let mut listener = QueueListener::builder(queue, Arc::new(executor))
//!     .poison_queue(poison)
//!     .config(QueueConfiguration::default())
//!     .build()?;
//!
//! listener.run(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod error;
pub mod executor;
pub mod listener;
pub mod processor;
pub mod renewal;
pub mod watcher;

pub use backoff::BackoffScheduler;
pub use config::{ConfigError, QueueConfiguration};
pub use error::ListenerError;
pub use executor::{FnTriggerExecutor, FunctionResult, TriggerExecutor};
pub use listener::{PollResult, ProcessedMessage, QueueListener, QueueListenerBuilder};
pub use processor::{MessageDisposition, MessageProcessor, PoisonMessageEvent, QueueProcessor};
pub use renewal::{LeaseRenewer, RenewedLease};
pub use watcher::SharedQueueWatcher;

pub use queue_trigger_runtime::{QueueClient, QueueError, QueueMessage, QueueName};
pub use tokio_util::sync::CancellationToken;
