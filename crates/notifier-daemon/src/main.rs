//! Entry point for the game-world notifier.
//!
//! Reads webhook payloads as JSON lines from stdin, runs them through the
//! dedup / roster / rule pipeline, and logs every resulting notification.
//!
//! # Architecture
//!
//! ```text
//! stdin --> producer --> ingest queue --> Dispatcher --> delivery queue --> worker --> LogSink
//! ```
//!
//! The process exits when stdin ends (after the delivery queue drains) or
//! on Ctrl-C (in-flight state is discarded).

mod error;
mod producer;
mod settings;
mod sink;

use std::sync::Arc;

use notifier_core::config::NotifierConfig;
use notifier_core::delivery::{delivery_queue, spawn_delivery_worker};
use notifier_core::dispatcher::Dispatcher;
use notifier_core::ingest::ingest_channel;
use notifier_core::reference::ReferenceData;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::DaemonError;
use crate::settings::DaemonSettings;
use crate::sink::LogSink;

/// Initialize structured logging, honouring `RUST_LOG` (default `info`).
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Application entry point.
///
/// Loads settings from the environment, then runs the pipeline until input
/// ends or Ctrl-C.
///
/// # Errors
///
/// Returns an error if settings, configuration, or reference data cannot be
/// loaded, or if a background task fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = DaemonSettings::from_env()?;
    init_logging(settings.log_json);

    info!("notifier-daemon starting");
    run(&settings).await?;
    Ok(())
}

/// Load configuration and reference data, wire the pipeline, and run it.
async fn run(settings: &DaemonSettings) -> Result<(), DaemonError> {
    let config = NotifierConfig::from_file(&settings.config_path)?;
    info!(
        path = %settings.config_path.display(),
        rules = config.rules.len(),
        targets = config.targets.len(),
        "configuration loaded"
    );

    let reference = Arc::new(ReferenceData::from_dir(&settings.reference_dir)?);
    info!(
        dir = %settings.reference_dir.display(),
        species = reference.species_count(),
        levels = reference.level_count(),
        "reference data loaded"
    );

    let (queue, queue_rx) = delivery_queue(config.settings.delivery_queue_capacity);
    let worker = spawn_delivery_worker(queue_rx, Arc::new(config.targets.clone()), LogSink);

    let mut dispatcher = Dispatcher::new(config, reference, queue)?;
    let (ingest, ingest_rx) = ingest_channel();
    let producer = tokio::spawn(producer::forward_lines(
        BufReader::new(tokio::io::stdin()),
        ingest,
    ));

    let interrupted = tokio::select! {
        _ = dispatcher.run(ingest_rx) => false,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("shutdown signal received, discarding in-flight state");
            true
        }
    };

    if interrupted {
        producer.abort();
        worker.abort();
        return Ok(());
    }

    producer.await??;
    // Dropping the dispatcher closes the delivery queue so the worker drains and stops.
    drop(dispatcher);
    let delivered = worker.await?;
    info!(
        sent = delivered.sent,
        failed = delivered.failed,
        "notifier-daemon stopped"
    );
    Ok(())
}
