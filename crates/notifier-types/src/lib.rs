//! Shared type definitions for the game-world notifier.
//!
//! This crate is the single source of truth for the event shapes that flow
//! from the ingress into the pipeline, and for the identifiers used by the
//! rule and target configuration.
//!
//! # Modules
//!
//! - [`ids`] -- String newtypes for encounter, gym, rule, and target ids
//! - [`enums`] -- Gym factions and coarse event kinds
//! - [`events`] -- The [`Event`] envelope and its payload structs
//! - [`error`] -- [`EventError`] for malformed or unsupported payloads

pub mod enums;
pub mod error;
pub mod events;
pub mod ids;

// Re-export all public types at crate root for convenience.
pub use enums::{EventKind, Team};
pub use error::EventError;
pub use events::{
    Event, GymMember, GymUpdateEvent, IndividualValues, MAX_INDIVIDUAL_VALUE, RaidEvent,
    SpawnEvent,
};
pub use ids::{EncounterId, GymId, RuleId, TargetId};
