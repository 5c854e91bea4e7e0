//! Queue provider implementations.
//!
//! This module contains concrete implementations of the [`QueueClient`](crate::QueueClient)
//! trait for different queue backends.

pub mod memory;

pub use memory::{
    InMemoryConfig, InMemoryProvider, InMemoryQueueClient, MessageSnapshot, QueueOperation,
};
