//! Enumeration types shared across the notifier.

use serde::{Deserialize, Serialize};

use crate::error::EventError;

// ---------------------------------------------------------------------------
// Gym faction
// ---------------------------------------------------------------------------

/// The faction currently controlling a gym.
///
/// Scanners report the faction as a small integer; the wire format is kept
/// numeric in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Team {
    /// No faction holds the gym.
    Uncontested,
    /// Team Mystic (blue).
    Mystic,
    /// Team Valor (red).
    Valor,
    /// Team Instinct (yellow).
    Instinct,
}

impl Team {
    /// Human-readable label for logging.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uncontested => "uncontested",
            Self::Mystic => "mystic",
            Self::Valor => "valor",
            Self::Instinct => "instinct",
        }
    }
}

impl TryFrom<u8> for Team {
    type Error = EventError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Uncontested),
            1 => Ok(Self::Mystic),
            2 => Ok(Self::Valor),
            3 => Ok(Self::Instinct),
            other => Err(EventError::OutOfRange {
                field: "team",
                value: i64::from(other),
            }),
        }
    }
}

impl From<Team> for u8 {
    fn from(team: Team) -> Self {
        match team {
            Team::Uncontested => 0,
            Team::Mystic => 1,
            Team::Valor => 2,
            Team::Instinct => 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Event kind
// ---------------------------------------------------------------------------

/// Coarse classification of an ingested event.
///
/// Raids are split into [`EventKind::Egg`] and [`EventKind::Raid`] because
/// the two are deduplicated and matched independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A wild creature spawn.
    Spawn,
    /// A raid whose boss is known.
    Raid,
    /// A raid whose boss has not hatched yet.
    Egg,
    /// A gym roster snapshot.
    GymUpdate,
}

impl EventKind {
    /// Label used in log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spawn => "spawn",
            Self::Raid => "raid",
            Self::Egg => "egg",
            Self::GymUpdate => "gym_update",
        }
    }
}
