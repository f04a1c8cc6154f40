//! Ingested event payloads.
//!
//! Scanners post events wrapped in a `{"type": ..., "message": {...}}`
//! envelope. Three types are understood:
//!
//! | `type`        | Variant                  |
//! |---------------|--------------------------|
//! | `pokemon`     | [`Event::Spawn`]         |
//! | `raid`        | [`Event::Raid`] (raid or egg) |
//! | `gym_details` | [`Event::GymUpdate`]     |
//!
//! Field names follow the scanner's wire format. [`Event::from_payload`] is
//! the single entry point: it rejects unknown types, decodes, and validates
//! so downstream code only ever sees well-formed events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{EventKind, Team};
use crate::error::EventError;
use crate::ids::{EncounterId, GymId};

/// Upper bound (inclusive) of a single individual value.
pub const MAX_INDIVIDUAL_VALUE: u8 = 15;

/// Envelope tags this pipeline understands.
const SUPPORTED_TYPES: &[&str] = &["pokemon", "raid", "gym_details"];

// ---------------------------------------------------------------------------
// Individual values
// ---------------------------------------------------------------------------

/// The three per-stat individual values of a single creature.
///
/// Each value lies in `0..=15`. Only constructed when all three are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndividualValues {
    /// Attack individual value.
    pub attack: u8,
    /// Defense individual value.
    pub defense: u8,
    /// Stamina individual value.
    pub stamina: u8,
}

fn check_iv(field: &'static str, value: u8) -> Result<(), EventError> {
    if value > MAX_INDIVIDUAL_VALUE {
        return Err(EventError::OutOfRange {
            field,
            value: i64::from(value),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// A wild creature spawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnEvent {
    /// Scanner-assigned unique encounter identifier (the dedup key).
    pub encounter_id: EncounterId,
    /// Species number.
    pub pokemon_id: u16,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Unix seconds at which the spawn despawns.
    pub disappear_time: i64,
    /// Observed combat power, if the scanner encountered it.
    pub cp: Option<u32>,
    /// Observed level, if known.
    pub pokemon_level: Option<u8>,
    /// Attack individual value.
    pub individual_attack: Option<u8>,
    /// Defense individual value.
    pub individual_defense: Option<u8>,
    /// Stamina individual value.
    pub individual_stamina: Option<u8>,
    /// Fast move id.
    pub move_1: Option<u16>,
    /// Charged move id.
    pub move_2: Option<u16>,
    /// Form number (1-based), if the species has forms.
    pub form: Option<u8>,
}

impl SpawnEvent {
    /// All three individual values, or `None` if any is missing.
    pub fn individual_values(&self) -> Option<IndividualValues> {
        match (
            self.individual_attack,
            self.individual_defense,
            self.individual_stamina,
        ) {
            (Some(attack), Some(defense), Some(stamina)) => Some(IndividualValues {
                attack,
                defense,
                stamina,
            }),
            _ => None,
        }
    }

    /// The despawn instant.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InvalidTimestamp`] if `disappear_time` is not
    /// representable.
    pub fn disappears_at(&self) -> Result<DateTime<Utc>, EventError> {
        timestamp("disappear_time", self.disappear_time)
    }

    fn validate(&self) -> Result<(), EventError> {
        if self.encounter_id.is_empty() {
            return Err(EventError::EmptyId("encounter_id"));
        }
        check_coordinates(self.latitude, self.longitude)?;
        self.disappears_at()?;
        for (field, value) in [
            ("individual_attack", self.individual_attack),
            ("individual_defense", self.individual_defense),
            ("individual_stamina", self.individual_stamina),
        ] {
            if let Some(v) = value {
                check_iv(field, v)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Raid
// ---------------------------------------------------------------------------

/// A raid announcement. Without a boss species it is an egg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaidEvent {
    /// Hosting gym.
    pub gym_id: GymId,
    /// Unix seconds at which the battle opens.
    pub start: i64,
    /// Unix seconds at which the raid ends.
    pub end: i64,
    /// Raid tier.
    pub level: u8,
    /// Boss species; `None` while the egg has not hatched.
    pub pokemon_id: Option<u16>,
    /// Boss combat power.
    pub cp: Option<u32>,
    /// Boss fast move id.
    pub move_1: Option<u16>,
    /// Boss charged move id.
    pub move_2: Option<u16>,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Unix seconds at which the egg appeared.
    pub spawn: Option<i64>,
}

impl RaidEvent {
    /// Whether the boss has not been revealed yet.
    pub const fn is_egg(&self) -> bool {
        self.pokemon_id.is_none()
    }

    /// [`EventKind::Egg`] or [`EventKind::Raid`].
    pub const fn kind(&self) -> EventKind {
        if self.is_egg() {
            EventKind::Egg
        } else {
            EventKind::Raid
        }
    }

    /// Battle start instant.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InvalidTimestamp`] if `start` is not representable.
    pub fn starts_at(&self) -> Result<DateTime<Utc>, EventError> {
        timestamp("start", self.start)
    }

    /// Raid end instant; also the dedup expiry.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InvalidTimestamp`] if `end` is not representable.
    pub fn ends_at(&self) -> Result<DateTime<Utc>, EventError> {
        timestamp("end", self.end)
    }

    /// Egg appearance instant, if reported and representable.
    pub fn spawned_at(&self) -> Option<DateTime<Utc>> {
        self.spawn.and_then(|s| DateTime::from_timestamp(s, 0))
    }

    fn validate(&self) -> Result<(), EventError> {
        if self.gym_id.is_empty() {
            return Err(EventError::EmptyId("gym_id"));
        }
        check_coordinates(self.latitude, self.longitude)?;
        self.starts_at()?;
        self.ends_at()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Gym update
// ---------------------------------------------------------------------------

/// One defender slot in a gym roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GymMember {
    /// Name of the trainer who placed the defender.
    pub trainer_name: String,
    /// Defender species.
    pub pokemon_id: u16,
    /// Defender combat power.
    pub cp: Option<u32>,
    /// Trainer level.
    pub trainer_level: Option<u8>,
}

/// A full roster snapshot of one gym.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GymUpdateEvent {
    /// Gym identifier.
    #[serde(rename = "id")]
    pub gym_id: GymId,
    /// Display name of the gym.
    pub name: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Controlling faction.
    pub team: Team,
    /// Defenders in slot order.
    #[serde(rename = "pokemon", default)]
    pub roster: Vec<GymMember>,
}

impl GymUpdateEvent {
    /// Trainer names in roster order.
    pub fn trainer_names(&self) -> impl Iterator<Item = &str> {
        self.roster.iter().map(|m| m.trainer_name.as_str())
    }

    fn validate(&self) -> Result<(), EventError> {
        if self.gym_id.is_empty() {
            return Err(EventError::EmptyId("id"));
        }
        check_coordinates(self.latitude, self.longitude)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A validated ingested event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum Event {
    /// A wild spawn.
    #[serde(rename = "pokemon")]
    Spawn(SpawnEvent),
    /// A raid or egg.
    #[serde(rename = "raid")]
    Raid(RaidEvent),
    /// A gym roster snapshot.
    #[serde(rename = "gym_details")]
    GymUpdate(GymUpdateEvent),
}

impl Event {
    /// Decode and validate a raw webhook payload.
    ///
    /// # Errors
    ///
    /// - [`EventError::Unsupported`] if the `type` tag is not one of the
    ///   handled kinds.
    /// - [`EventError::Malformed`] if the envelope or message cannot be
    ///   decoded.
    /// - Any validation error for out-of-range coordinates, timestamps,
    ///   individual values, or empty identifiers.
    pub fn from_payload(payload: serde_json::Value) -> Result<Self, EventError> {
        let tag = payload
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| EventError::Malformed("missing `type` tag".to_owned()))?;

        if !SUPPORTED_TYPES.contains(&tag) {
            return Err(EventError::Unsupported(tag.to_owned()));
        }

        let event: Self = serde_json::from_value(payload)?;
        event.validate()?;
        Ok(event)
    }

    /// The coarse kind of this event.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Spawn(_) => EventKind::Spawn,
            Self::Raid(raid) => raid.kind(),
            Self::GymUpdate(_) => EventKind::GymUpdate,
        }
    }

    /// Run field-level validation.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure found.
    pub fn validate(&self) -> Result<(), EventError> {
        match self {
            Self::Spawn(spawn) => spawn.validate(),
            Self::Raid(raid) => raid.validate(),
            Self::GymUpdate(gym) => gym.validate(),
        }
    }
}

fn timestamp(field: &'static str, secs: i64) -> Result<DateTime<Utc>, EventError> {
    DateTime::from_timestamp(secs, 0).ok_or(EventError::InvalidTimestamp { field, value: secs })
}

fn check_coordinates(latitude: f64, longitude: f64) -> Result<(), EventError> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(EventError::InvalidCoordinate {
            field: "latitude",
            value: latitude,
        });
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(EventError::InvalidCoordinate {
            field: "longitude",
            value: longitude,
        });
    }
    Ok(())
}
