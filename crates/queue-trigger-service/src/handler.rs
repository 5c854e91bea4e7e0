//! Demo message handler used by the host service.

use crate::settings::HandlerConfig;
use async_trait::async_trait;
use queue_trigger_core::{CancellationToken, FunctionResult, QueueMessage, TriggerExecutor};
use tracing::info;

/// Logs each message, simulates some work and fails bodies with the
/// configured prefix
pub struct DemoHandler {
    config: HandlerConfig,
}

impl DemoHandler {
    pub fn new(config: HandlerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TriggerExecutor for DemoHandler {
    async fn execute(
        &self,
        message: &QueueMessage,
        cancellation: CancellationToken,
    ) -> FunctionResult {
        let Some(body) = message.body_as_str() else {
            return FunctionResult::failure("message body is not valid UTF-8");
        };

        info!(
            message_id = %message.id,
            dequeue_count = message.dequeue_count,
            body,
            "Handling message"
        );

        tokio::select! {
            _ = cancellation.cancelled() => {
                return FunctionResult::failure("cancelled before completion");
            }
            _ = tokio::time::sleep(self.config.work_duration()) => {}
        }

        if body.starts_with(&self.config.failure_prefix) {
            FunctionResult::failure(format!("body starts with '{}'", self.config.failure_prefix))
        } else {
            FunctionResult::success()
        }
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
