//! # Queue-Trigger Service
//!
//! Binary entry point for the Queue-Trigger host.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes structured logging
//! - Creates the in-memory queues, seeding any configured startup messages
//! - Runs one queue listener per configured queue until Ctrl-C

mod handler;
mod settings;

use anyhow::Context;
use bytes::Bytes;
use handler::DemoHandler;
use queue_trigger_core::{
    CancellationToken, ListenerError, PoisonMessageEvent, QueueListener, SharedQueueWatcher,
    TriggerExecutor,
};
use queue_trigger_runtime::{InMemoryProvider, QueueClient};
use settings::{LoggingConfig, QueueSettings, ServiceConfig};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -------------------------------------------------------------------------
    // Load configuration
    //
    // Every field carries a serde default, so an unconfigured environment runs
    // a single default queue. A malformed file or an environment variable of
    // the wrong type is a hard error.
    // -------------------------------------------------------------------------
    let service_config = match ServiceConfig::load() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&LoggingConfig::default());
            error!(error = %e, "Failed to load configuration; aborting");
            std::process::exit(3);
        }
    };

    init_tracing(&service_config.logging);
    info!("Starting Queue-Trigger Service");

    if let Err(e) = service_config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(3);
    }

    let provider = InMemoryProvider::default();
    let watcher = Arc::new(SharedQueueWatcher::new());
    let executor: Arc<dyn TriggerExecutor> =
        Arc::new(DemoHandler::new(service_config.handler.clone()));
    let cancellation = CancellationToken::new();

    let mut listeners = JoinSet::new();
    for settings in &service_config.queues {
        let mut listener = build_listener(&provider, &watcher, &executor, settings).await?;

        if let Some(events) = listener.subscribe_poison_events() {
            tokio::spawn(log_poison_events(events));
        }

        let token = cancellation.clone();
        listeners.spawn(async move { listener.run(token).await });
    }

    info!(queues = service_config.queues.len(), "Queue listeners running");

    let mut failed = false;
    tokio::select! {
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        },
        Some(joined) = listeners.join_next() => {
            failed |= !listener_exited_cleanly(joined);
        }
    }

    info!("Stopping queue listeners");
    cancellation.cancel();
    while let Some(joined) = listeners.join_next().await {
        failed |= !listener_exited_cleanly(joined);
    }

    if failed {
        anyhow::bail!("one or more queue listeners failed");
    }

    info!("Queue-Trigger Service stopped");
    Ok(())
}

// ============================================================================
// Private helpers
// ============================================================================

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.default_directives().into());

    let json = logging.json_format;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

/// Create the queue, seed it and build its listener.
async fn build_listener(
    provider: &InMemoryProvider,
    watcher: &Arc<SharedQueueWatcher>,
    executor: &Arc<dyn TriggerExecutor>,
    settings: &QueueSettings,
) -> anyhow::Result<QueueListener> {
    let name = settings.queue_name()?;
    let queue = provider.queue(name.clone());
    queue
        .create_if_not_exists()
        .await
        .with_context(|| format!("failed to create queue '{}'", name))?;

    for body in &settings.seed_messages {
        queue
            .enqueue(Bytes::from(body.clone()))
            .await
            .with_context(|| format!("failed to seed queue '{}'", name))?;
    }
    if !settings.seed_messages.is_empty() {
        info!(queue = %name, count = settings.seed_messages.len(), "Seeded queue");
    }

    let mut builder = QueueListener::builder(Arc::new(queue), Arc::clone(executor))
        .config(settings.processing.clone())
        .watcher(Arc::clone(watcher));

    if settings.poison_queue {
        let poison_name = name.poison()?;
        builder = builder.poison_queue(Arc::new(provider.queue(poison_name)));
    }

    let listener = builder.build()?;
    info!(
        queue = %name,
        poison_queue = settings.poison_queue,
        batch_size = listener.config().batch_size,
        "Configured queue listener"
    );
    Ok(listener)
}

async fn log_poison_events(mut events: broadcast::Receiver<PoisonMessageEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => warn!(
                poison_queue = %event.poison_queue,
                message_id = %event.message.id,
                dequeue_count = event.message.dequeue_count,
                "Message added to poison queue"
            ),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Poison notifications dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn listener_exited_cleanly(joined: Result<Result<(), ListenerError>, JoinError>) -> bool {
    match joined {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!(error = %e, "Queue listener stopped with an error");
            false
        }
        Err(e) => {
            error!(error = %e, "Queue listener task failed");
            false
        }
    }
}
