//! Canonical records handed to the rule engine and, on a match, to delivery.
//!
//! A record is the event enriched with reference lookups (species and move
//! names, IV percentage, gym name). Lookup misses are logged and leave the
//! affected field empty; they never abort the record. Combat power and hit
//! points at arbitrary levels are not computed here: rules that need them
//! compute them during matching and the dispatcher attaches the results as
//! [`DerivedStat`]s.

use chrono::{DateTime, Utc};
use notifier_types::{
    EncounterId, EventError, EventKind, GymId, IndividualValues, RaidEvent, SpawnEvent,
};
use serde::Serialize;
use tracing::warn;

use crate::reference::ReferenceData;
use crate::roster::GymRecord;
use crate::stats;

/// Which statistic a [`DerivedStat`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedKind {
    /// Combat power.
    Cp,
    /// Hit points.
    Hp,
}

/// A statistic computed at a specific level while matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DerivedStat {
    /// Which statistic.
    pub kind: DerivedKind,
    /// Level it was computed at.
    pub level: u8,
    /// The computed value.
    pub value: u32,
}

/// Numeric attributes that rules may bound with `min_*` / `max_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericAttribute {
    /// Latitude.
    Lat,
    /// Longitude.
    Lon,
    /// Species id.
    Id,
    /// Individual-value percentage.
    Iv,
    /// Attack individual value.
    Attack,
    /// Defense individual value.
    Defense,
    /// Stamina individual value.
    Stamina,
    /// Creature level (spawns) or raid tier (raids).
    Level,
}

/// A spawn, enriched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpawnRecord {
    /// Encounter identifier.
    pub encounter_id: EncounterId,
    /// Species id.
    pub species_id: u16,
    /// Species name, if known.
    pub name: Option<String>,
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
    /// Despawn instant.
    pub disappears_at: DateTime<Utc>,
    /// Observed combat power.
    pub cp: Option<u32>,
    /// Observed level.
    pub level: Option<u8>,
    /// Individual values, when all three are known.
    pub ivs: Option<IndividualValues>,
    /// IV percentage, when all three are known.
    pub iv_percent: Option<f64>,
    /// Fast move name.
    pub move_1: Option<String>,
    /// Charged move name.
    pub move_2: Option<String>,
    /// Form letter (`A` for form 1).
    pub form: Option<char>,
    /// Stats computed by matching rules.
    pub derived: Vec<DerivedStat>,
}

/// The revealed boss of a hatched raid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RaidBoss {
    /// Species id.
    pub species_id: u16,
    /// Species name, if known.
    pub name: Option<String>,
    /// Boss combat power.
    pub cp: Option<u32>,
    /// Fast move name.
    pub move_1: Option<String>,
    /// Charged move name.
    pub move_2: Option<String>,
}

/// A raid or egg, enriched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaidRecord {
    /// Hosting gym.
    pub gym_id: GymId,
    /// Last-known gym name from the roster tracker.
    pub gym_name: Option<String>,
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
    /// Raid tier.
    pub level: u8,
    /// Battle start.
    pub starts_at: DateTime<Utc>,
    /// Raid end.
    pub ends_at: DateTime<Utc>,
    /// Egg appearance.
    pub spawned_at: Option<DateTime<Utc>>,
    /// `None` for eggs.
    pub boss: Option<RaidBoss>,
}

impl RaidRecord {
    /// Whether the boss is still hidden.
    pub const fn is_egg(&self) -> bool {
        self.boss.is_none()
    }
}

/// A record the rule engine can evaluate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    /// A spawn.
    Spawn(SpawnRecord),
    /// A raid or egg.
    Raid(RaidRecord),
}

impl Record {
    /// Spawn, raid, or egg.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Spawn(_) => EventKind::Spawn,
            Self::Raid(r) if r.is_egg() => EventKind::Egg,
            Self::Raid(_) => EventKind::Raid,
        }
    }

    /// Whether this is an unhatched raid.
    pub const fn is_egg(&self) -> bool {
        matches!(self, Self::Raid(r) if r.is_egg())
    }

    /// Species id of the spawn or raid boss.
    pub fn species_id(&self) -> Option<u16> {
        match self {
            Self::Spawn(s) => Some(s.species_id),
            Self::Raid(r) => r.boss.as_ref().map(|b| b.species_id),
        }
    }

    /// Species name of the spawn or raid boss, if known.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Spawn(s) => s.name.as_deref(),
            Self::Raid(r) => r.boss.as_ref().and_then(|b| b.name.as_deref()),
        }
    }

    /// Label for logs: species name, `"Egg"`, or `"unknown"`.
    pub fn label(&self) -> &str {
        if self.is_egg() {
            return "Egg";
        }
        self.name().unwrap_or("unknown")
    }

    /// `(latitude, longitude)`.
    pub const fn coordinates(&self) -> (f64, f64) {
        match self {
            Self::Spawn(s) => (s.latitude, s.longitude),
            Self::Raid(r) => (r.latitude, r.longitude),
        }
    }

    /// Observed combat power (spawn encounter or raid boss).
    pub fn observed_cp(&self) -> Option<u32> {
        match self {
            Self::Spawn(s) => s.cp,
            Self::Raid(r) => r.boss.as_ref().and_then(|b| b.cp),
        }
    }

    /// Individual values; raids never carry them.
    pub const fn ivs(&self) -> Option<IndividualValues> {
        match self {
            Self::Spawn(s) => s.ivs,
            Self::Raid(_) => None,
        }
    }

    /// Fast and charged move names.
    pub fn moves(&self) -> (Option<&str>, Option<&str>) {
        match self {
            Self::Spawn(s) => (s.move_1.as_deref(), s.move_2.as_deref()),
            Self::Raid(r) => r.boss.as_ref().map_or((None, None), |b| {
                (b.move_1.as_deref(), b.move_2.as_deref())
            }),
        }
    }

    /// Value of a bounded attribute, if the record has it.
    pub fn attribute(&self, attribute: NumericAttribute) -> Option<f64> {
        let (lat, lon) = self.coordinates();
        match (attribute, self) {
            (NumericAttribute::Lat, _) => Some(lat),
            (NumericAttribute::Lon, _) => Some(lon),
            (NumericAttribute::Id, _) => self.species_id().map(f64::from),
            (NumericAttribute::Iv, Self::Spawn(s)) => s.iv_percent,
            (NumericAttribute::Attack, _) => self.ivs().map(|i| f64::from(i.attack)),
            (NumericAttribute::Defense, _) => self.ivs().map(|i| f64::from(i.defense)),
            (NumericAttribute::Stamina, _) => self.ivs().map(|i| f64::from(i.stamina)),
            (NumericAttribute::Level, Self::Spawn(s)) => s.level.map(f64::from),
            (NumericAttribute::Level, Self::Raid(r)) => Some(f64::from(r.level)),
            (NumericAttribute::Iv, Self::Raid(_)) => None,
        }
    }

    /// Attach stats computed during matching, skipping ones already present.
    pub fn add_derived(&mut self, stats: impl IntoIterator<Item = DerivedStat>) {
        let Self::Spawn(spawn) = self else {
            return;
        };
        for stat in stats {
            if !spawn.derived.contains(&stat) {
                spawn.derived.push(stat);
            }
        }
    }
}

/// Build a spawn record.
///
/// # Errors
///
/// Returns [`EventError::InvalidTimestamp`] if the despawn time is not
/// representable. Validated events never fail here.
pub fn spawn_record(
    event: &SpawnEvent,
    reference: &ReferenceData,
) -> Result<SpawnRecord, EventError> {
    let ivs = event.individual_values();
    Ok(SpawnRecord {
        encounter_id: event.encounter_id.clone(),
        species_id: event.pokemon_id,
        name: species_name(reference, event.pokemon_id),
        latitude: event.latitude,
        longitude: event.longitude,
        disappears_at: event.disappears_at()?,
        cp: event.cp,
        level: event.pokemon_level,
        ivs,
        iv_percent: ivs.map(stats::iv_percent),
        move_1: event.move_1.and_then(|m| move_name(reference, m)),
        move_2: event.move_2.and_then(|m| move_name(reference, m)),
        form: event.form.and_then(form_letter),
        derived: Vec::new(),
    })
}

/// Build a raid record, taking the gym name from the roster tracker when known.
///
/// # Errors
///
/// Returns [`EventError::InvalidTimestamp`] if the start or end time is not
/// representable. Validated events never fail here.
pub fn raid_record(
    event: &RaidEvent,
    reference: &ReferenceData,
    gym: Option<&GymRecord>,
) -> Result<RaidRecord, EventError> {
    let boss = event.pokemon_id.map(|species_id| RaidBoss {
        species_id,
        name: species_name(reference, species_id),
        cp: event.cp,
        move_1: event.move_1.and_then(|m| move_name(reference, m)),
        move_2: event.move_2.and_then(|m| move_name(reference, m)),
    });

    Ok(RaidRecord {
        gym_id: event.gym_id.clone(),
        gym_name: gym.map(|g| g.name.clone()),
        latitude: event.latitude,
        longitude: event.longitude,
        level: event.level,
        starts_at: event.starts_at()?,
        ends_at: event.ends_at()?,
        spawned_at: event.spawned_at(),
        boss,
    })
}

fn species_name(reference: &ReferenceData, id: u16) -> Option<String> {
    match reference.species_name(id) {
        Ok(name) => Some(name.to_owned()),
        Err(e) => {
            warn!(error = %e, "species name lookup failed, omitting name");
            None
        }
    }
}

fn move_name(reference: &ReferenceData, id: u16) -> Option<String> {
    match reference.move_name(id) {
        Ok(name) => Some(name.to_owned()),
        Err(e) => {
            warn!(error = %e, "move name lookup failed, omitting move");
            None
        }
    }
}

/// Form 1 is `A`, form 26 is `Z`; anything else has no letter.
fn form_letter(form: u8) -> Option<char> {
    if (1..=26).contains(&form) {
        form.checked_add(64).map(char::from)
    } else {
        None
    }
}
