//! Error types for the notifier daemon.
//!
//! Startup failures only. Once the pipeline is running, per-event problems
//! are logged by the core and never surface here.

use notifier_core::config::ConfigError;
use notifier_core::reference::ReferenceError;

/// Errors that stop the daemon.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// An environment variable has an unusable value.
    #[error("settings error: {0}")]
    Settings(String),

    /// The rules file could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The reference tables could not be loaded.
    #[error("reference data error: {0}")]
    Reference(#[from] ReferenceError),

    /// Reading input or waiting for a signal failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A background task panicked or was cancelled.
    #[error("task error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
