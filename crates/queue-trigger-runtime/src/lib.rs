//! # Queue-Trigger Runtime
//!
//! Queue client surface consumed by the queue-trigger processing engine.
//!
//! This library provides:
//! - Visibility-timeout based queue operations (fetch, update visibility, delete)
//! - Pop receipts that identify a single delivery of a message
//! - Error classification for transient, stale-receipt and fatal failures
//! - An in-memory provider for tests and local development
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Queue names, message identifiers and dequeued messages
//! - [`client`] - The [`QueueClient`] trait
//! - [`providers`] - Concrete queue providers

pub mod client;
pub mod error;
pub mod message;
pub mod providers;

pub use client::QueueClient;
pub use error::{QueueError, ValidationError};
pub use message::{MessageId, PopReceipt, QueueMessage, QueueName, Timestamp, VisibilityUpdate};
pub use providers::{
    InMemoryConfig, InMemoryProvider, InMemoryQueueClient, MessageSnapshot, QueueOperation,
};
