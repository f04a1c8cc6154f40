//! Event-processing pipeline for the game-world notifier.
//!
//! Raw payloads enter through the [`ingest`] queue, are consumed by a single
//! [`Dispatcher`], and leave as [`Notification`]s through the [`delivery`]
//! seam.
//!
//! # Modules
//!
//! - [`reference`] -- Static species, move, and level-multiplier tables.
//! - [`stats`] -- IV percentage, combat power, and hit points.
//! - [`geofence`] -- Named polygons with bounding-box pre-checks.
//! - [`dedup`] -- Per-kind dedup cache with time-bounded expiry.
//! - [`roster`] -- Gym roster history and "joined" transitions.
//! - [`record`] -- Canonical spawn and raid records.
//! - [`rule`] -- Rule definitions as loaded from configuration.
//! - [`rule_engine`] -- Stateless evaluation of one record against one rule.
//! - [`config`] -- YAML configuration loading and validation.
//! - [`delivery`] -- Bounded delivery queue, sink trait, and worker task.
//! - [`ingest`] -- Unbounded many-producer ingest queue.
//! - [`dispatcher`] -- The consumer loop tying everything together.
//!
//! [`Dispatcher`]: dispatcher::Dispatcher
//! [`Notification`]: delivery::Notification

pub mod config;
pub mod dedup;
pub mod delivery;
pub mod dispatcher;
pub mod geofence;
pub mod ingest;
pub mod record;
pub mod reference;
pub mod roster;
pub mod rule;
pub mod rule_engine;
pub mod stats;
