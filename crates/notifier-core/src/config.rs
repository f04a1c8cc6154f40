//! Configuration loading and typed config structures for the notifier.
//!
//! One YAML file holds everything the pipeline needs at startup:
//!
//! ```yaml
//! settings:
//!   sweep_interval_secs: 60
//!   delivery_queue_capacity: 1024
//! geofences:
//!   downtown: [[52.50, 13.30], [52.50, 13.50], [52.55, 13.50], [52.55, 13.30]]
//! rules:
//!   hundos: { min_iv: 100 }
//! routes:
//!   hundos: [discord-main]
//! targets:
//!   discord-main: { webhook: "https://example.invalid/hook", gym: true }
//! tracked_trainers: [ash]
//! ```
//!
//! Loading validates what would otherwise fail later: geofence shapes,
//! routes naming undefined rules or targets, and zero-valued settings. A
//! rule naming an undefined geofence only produces a warning; it simply
//! never matches.

use std::collections::BTreeMap;
use std::path::Path;

use notifier_types::{RuleId, TargetId};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::geofence::{Coordinate, Geofence, GeofenceError, GeofenceIndex};
use crate::rule::Rule;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A geofence polygon is unusable.
    #[error(transparent)]
    InvalidGeofence(#[from] GeofenceError),

    /// A route references a rule that is not defined.
    #[error("route references undefined rule {rule}")]
    UnknownRule {
        /// The missing rule.
        rule: RuleId,
    },

    /// A route references a target that is not defined.
    #[error("rule {rule} routes to undefined target {target}")]
    UnknownTarget {
        /// The routing rule.
        rule: RuleId,
        /// The missing target.
        target: TargetId,
    },

    /// A setting has an unusable value.
    #[error("invalid setting {field}: {reason}")]
    InvalidSetting {
        /// Setting name.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level notifier configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifierConfig {
    /// Runtime tuning.
    #[serde(default)]
    pub settings: Settings,

    /// Named polygons, as ordered `[lat, lon]` vertex rings.
    #[serde(default)]
    pub geofences: BTreeMap<String, Vec<Coordinate>>,

    /// Named include rules.
    #[serde(default)]
    pub rules: BTreeMap<RuleId, Rule>,

    /// Rule to target mapping. Rules without a route never deliver.
    #[serde(default)]
    pub routes: BTreeMap<RuleId, Vec<TargetId>>,

    /// Notification target definitions.
    #[serde(default)]
    pub targets: BTreeMap<TargetId, NotificationTarget>,

    /// Trainer names whose gym joins are reported.
    #[serde(default)]
    pub tracked_trainers: Vec<String>,
}

impl NotifierConfig {
    /// Load and validate configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or a
    /// validation error.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or a
    /// validation error.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-references and settings.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;
        self.geofence_index()?;

        for (rule, targets) in &self.routes {
            if !self.rules.contains_key(rule) {
                return Err(ConfigError::UnknownRule { rule: rule.clone() });
            }
            if let Some(target) = targets.iter().find(|t| !self.targets.contains_key(*t)) {
                return Err(ConfigError::UnknownTarget {
                    rule: rule.clone(),
                    target: target.clone(),
                });
            }
        }

        for (id, rule) in &self.rules {
            if let Some(name) = &rule.geofence
                && !self.geofences.contains_key(name)
            {
                warn!(rule = %id, geofence = %name, "rule references undefined geofence, it will never match");
            }
        }
        Ok(())
    }

    /// Build the geofence index.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidGeofence`] for the first unusable polygon.
    pub fn geofence_index(&self) -> Result<GeofenceIndex, ConfigError> {
        let fences = self
            .geofences
            .iter()
            .map(|(name, points)| Geofence::new(name, points.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(GeofenceIndex::new(fences))
    }

    /// Targets a rule routes to. Empty for unrouted rules.
    pub fn routes_for(&self, rule: &RuleId) -> &[TargetId] {
        self.routes.get(rule).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether a target exists and is enabled.
    pub fn is_enabled(&self, target: &TargetId) -> bool {
        self.targets.get(target).is_some_and(|t| t.enabled)
    }

    /// Enabled targets that receive gym join notifications.
    pub fn gym_targets(&self) -> impl Iterator<Item = &TargetId> {
        self.targets
            .iter()
            .filter(|(_, t)| t.enabled && t.gym)
            .map(|(id, _)| id)
    }
}

/// Runtime tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Seconds between dedup cache sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Pending notifications buffered before new ones are dropped.
    #[serde(default = "default_delivery_queue_capacity")]
    pub delivery_queue_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            delivery_queue_capacity: default_delivery_queue_capacity(),
        }
    }
}

impl Settings {
    const fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "sweep_interval_secs",
                reason: "must be at least 1",
            });
        }
        if self.delivery_queue_capacity == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "delivery_queue_capacity",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// Sweep cadence as a duration.
    pub const fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

const fn default_sweep_interval_secs() -> u64 {
    60
}

const fn default_delivery_queue_capacity() -> usize {
    1024
}

/// A named delivery destination.
///
/// Only `enabled` and `gym` are interpreted here; every other key is kept
/// verbatim for the sink that renders and sends notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationTarget {
    /// Disabled targets are removed from every delivery set.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Whether the target receives gym join notifications.
    #[serde(default)]
    pub gym: bool,

    /// Sink-specific settings.
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl Default for NotificationTarget {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            gym: false,
            settings: serde_json::Map::new(),
        }
    }
}

const fn default_enabled() -> bool {
    true
}
