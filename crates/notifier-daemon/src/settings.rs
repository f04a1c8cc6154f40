//! Daemon settings loaded from environment variables.

use std::path::PathBuf;

use crate::error::DaemonError;

/// Where to find configuration and how to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSettings {
    /// Rules file path.
    pub config_path: PathBuf,
    /// Directory holding `names.json`, `moves.json`, `stats.json` and `cpm.json`.
    pub reference_dir: PathBuf,
    /// Emit JSON log lines instead of human-readable ones.
    pub log_json: bool,
}

impl DaemonSettings {
    /// Load settings from environment variables.
    ///
    /// All variables are optional:
    /// - `NOTIFIER_CONFIG` -- rules file (default `notifier.yaml`)
    /// - `NOTIFIER_REFERENCE_DIR` -- reference tables (default `data`)
    /// - `NOTIFIER_LOG_JSON` -- `true` for JSON logs (default `false`)
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Settings`] if `NOTIFIER_LOG_JSON` is not a boolean.
    pub fn from_env() -> Result<Self, DaemonError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DaemonError> {
        let config_path = lookup("NOTIFIER_CONFIG").unwrap_or_else(|| "notifier.yaml".to_owned());
        let reference_dir = lookup("NOTIFIER_REFERENCE_DIR").unwrap_or_else(|| "data".to_owned());
        let log_json: bool = lookup("NOTIFIER_LOG_JSON")
            .unwrap_or_else(|| "false".to_owned())
            .parse()
            .map_err(|e| DaemonError::Settings(format!("invalid NOTIFIER_LOG_JSON: {e}")))?;

        Ok(Self {
            config_path: PathBuf::from(config_path),
            reference_dir: PathBuf::from(reference_dir),
            log_json,
        })
    }
}
