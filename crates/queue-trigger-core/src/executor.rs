//! User function invocation.
//!
//! The listener never interprets message bodies. It hands each message to a
//! [`TriggerExecutor`] and only looks at the [`FunctionResult`].

use async_trait::async_trait;
use queue_trigger_runtime::QueueMessage;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Outcome of one handler invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionResult {
    pub succeeded: bool,
    pub error: Option<String>,
}

impl FunctionResult {
    /// Successful invocation
    pub fn success() -> Self {
        Self {
            succeeded: true,
            error: None,
        }
    }

    /// Failed invocation with a description of the failure
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            error: Some(error.into()),
        }
    }
}

/// Runs the user function for one message.
///
/// Implementations should observe `cancellation` and return promptly once it
/// fires. Whatever they return is treated as the final outcome of this
/// delivery.
#[async_trait]
pub trait TriggerExecutor: Send + Sync {
    async fn execute(&self, message: &QueueMessage, cancellation: CancellationToken)
        -> FunctionResult;
}

/// Adapts an async closure returning `anyhow::Result<()>` into a [`TriggerExecutor`]
pub struct FnTriggerExecutor<F> {
    handler: F,
}

impl<F, Fut> FnTriggerExecutor<F>
where
    F: Fn(QueueMessage, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F, Fut> TriggerExecutor for FnTriggerExecutor<F>
where
    F: Fn(QueueMessage, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn execute(
        &self,
        message: &QueueMessage,
        cancellation: CancellationToken,
    ) -> FunctionResult {
        match (self.handler)(message.clone(), cancellation).await {
            Ok(()) => FunctionResult::success(),
            Err(e) => FunctionResult::failure(format!("{:#}", e)),
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
