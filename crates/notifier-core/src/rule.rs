//! Rule definitions as they appear in the configuration file.
//!
//! A rule is a conjunction of optional constraints. Every field left out of
//! the YAML is an absent constraint and never causes a rejection. Rules are
//! immutable after load; evaluation lives in [`crate::rule_engine`].
//!
//! Each rule id holds exactly one predicate. Alternatives are written as
//! several rule ids routed to the same targets: a record goes to a target
//! when any of them matches, and to each target only once.
//!
//! ```yaml
//! rules:
//!   perfect_unown:
//!     name: Unown
//!     min_iv: 100
//!     min_cp: { 20: 500, 30: 800 }
//!     moves:
//!       - { move_1: Hidden Power, move_2: null }
//!     geofence: downtown
//!   legendary_eggs:
//!     scope: raid
//!     raid: false
//!     levels: [5]
//! ```

use std::collections::BTreeMap;

use notifier_types::EventKind;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::record::NumericAttribute;

/// Which event kinds a rule applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    /// Creature spawns.
    #[default]
    Spawn,
    /// Raids and eggs.
    Raid,
}

impl RuleScope {
    /// Whether a record of this kind is in scope.
    pub const fn covers(self, kind: EventKind) -> bool {
        matches!(
            (self, kind),
            (Self::Spawn, EventKind::Spawn) | (Self::Raid, EventKind::Raid | EventKind::Egg)
        )
    }
}

/// A combat-power bound.
///
/// A bare number is compared against the combat power reported with the
/// event. A map is a per-level threshold checked against the combat power
/// computed from base stats and individual values at each listed level.
/// Level keys may be plain numbers or quoted strings (`{"20": 300}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CpThreshold {
    /// Compare against the observed value.
    Observed(u32),
    /// Level to threshold; every level must satisfy its bound.
    PerLevel(#[serde(deserialize_with = "level_map")] BTreeMap<u8, u32>),
}

/// A level written as a number or as a numeric string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct LevelKey(u8);

impl<'de> Deserialize<'de> for LevelKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(LevelVisitor)
    }
}

struct LevelVisitor;

impl Visitor<'_> for LevelVisitor {
    type Value = LevelKey;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a level between 0 and 255")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        u8::try_from(v)
            .map(LevelKey)
            .map_err(|e| E::custom(format!("level {v}: {e}")))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u8::try_from(v)
            .map(LevelKey)
            .map_err(|e| E::custom(format!("level {v}: {e}")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.trim()
            .parse()
            .map(LevelKey)
            .map_err(|e| E::custom(format!("level {v:?}: {e}")))
    }
}

fn level_map<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<u8, u32>, D::Error> {
    let raw = BTreeMap::<LevelKey, u32>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(LevelKey(level), v)| (level, v)).collect())
}

fn optional_level_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<BTreeMap<u8, u32>>, D::Error> {
    let raw = Option::<BTreeMap<LevelKey, u32>>::deserialize(deserializer)?;
    Ok(raw.map(|map| map.into_iter().map(|(LevelKey(level), v)| (level, v)).collect()))
}

/// An accepted move pair. A missing slot accepts any move.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoveSet {
    /// Required fast move name.
    #[serde(default)]
    pub move_1: Option<String>,
    /// Required charged move name.
    #[serde(default)]
    pub move_2: Option<String>,
}

impl MoveSet {
    /// Whether the observed moves satisfy this pair.
    pub fn accepts(&self, move_1: Option<&str>, move_2: Option<&str>) -> bool {
        slot_accepts(self.move_1.as_deref(), move_1) && slot_accepts(self.move_2.as_deref(), move_2)
    }
}

fn slot_accepts(wanted: Option<&str>, observed: Option<&str>) -> bool {
    wanted.is_none_or(|w| observed == Some(w))
}

/// A named include rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    /// Event kinds the rule applies to.
    #[serde(default)]
    pub scope: RuleScope,

    /// Exact species name.
    #[serde(default)]
    pub name: Option<String>,

    /// Minimum latitude.
    #[serde(default)]
    pub min_lat: Option<f64>,
    /// Maximum latitude.
    #[serde(default)]
    pub max_lat: Option<f64>,
    /// Minimum longitude.
    #[serde(default)]
    pub min_lon: Option<f64>,
    /// Maximum longitude.
    #[serde(default)]
    pub max_lon: Option<f64>,
    /// Minimum species id.
    #[serde(default)]
    pub min_id: Option<f64>,
    /// Maximum species id.
    #[serde(default)]
    pub max_id: Option<f64>,
    /// Minimum IV percentage.
    #[serde(default)]
    pub min_iv: Option<f64>,
    /// Maximum IV percentage.
    #[serde(default)]
    pub max_iv: Option<f64>,
    /// Minimum attack IV.
    #[serde(default)]
    pub min_attack: Option<f64>,
    /// Maximum attack IV.
    #[serde(default)]
    pub max_attack: Option<f64>,
    /// Minimum defense IV.
    #[serde(default)]
    pub min_defense: Option<f64>,
    /// Maximum defense IV.
    #[serde(default)]
    pub max_defense: Option<f64>,
    /// Minimum stamina IV.
    #[serde(default)]
    pub min_stamina: Option<f64>,
    /// Maximum stamina IV.
    #[serde(default)]
    pub max_stamina: Option<f64>,
    /// Minimum level (spawn level or raid tier).
    #[serde(default)]
    pub min_level: Option<f64>,
    /// Maximum level (spawn level or raid tier).
    #[serde(default)]
    pub max_level: Option<f64>,

    /// Minimum combat power.
    #[serde(default)]
    pub min_cp: Option<CpThreshold>,
    /// Maximum combat power.
    #[serde(default)]
    pub max_cp: Option<CpThreshold>,
    /// Minimum hit points per level.
    #[serde(default, deserialize_with = "optional_level_map")]
    pub min_hp: Option<BTreeMap<u8, u32>>,
    /// Maximum hit points per level.
    #[serde(default, deserialize_with = "optional_level_map")]
    pub max_hp: Option<BTreeMap<u8, u32>>,

    /// Accepted move pairs; at least one must match.
    #[serde(default)]
    pub moves: Option<Vec<MoveSet>>,

    /// Named geofence the event must fall inside.
    #[serde(default)]
    pub geofence: Option<String>,

    /// Raid rules: accept unhatched eggs.
    #[serde(default = "default_true")]
    pub egg: bool,
    /// Raid rules: accept hatched raids.
    #[serde(default = "default_true")]
    pub raid: bool,
    /// Raid rules: accepted raid tiers.
    #[serde(default)]
    pub levels: Option<Vec<u8>>,
}

const fn default_true() -> bool {
    true
}

/// One `min_*`/`max_*` pair of a rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericBound {
    /// Attribute being bounded.
    pub attribute: NumericAttribute,
    /// Criterion label of the minimum.
    pub min_label: &'static str,
    /// Criterion label of the maximum.
    pub max_label: &'static str,
    /// Inclusive minimum.
    pub min: Option<f64>,
    /// Inclusive maximum.
    pub max: Option<f64>,
}

impl Rule {
    /// A spawn rule with no constraints.
    pub fn spawn() -> Self {
        Self {
            egg: true,
            raid: true,
            ..Self::default()
        }
    }

    /// A raid rule with no constraints (eggs and hatched raids accepted).
    pub fn raid() -> Self {
        Self {
            scope: RuleScope::Raid,
            ..Self::spawn()
        }
    }

    /// The eight numeric bounds in evaluation order.
    pub const fn bounds(&self) -> [NumericBound; 8] {
        [
            bound(NumericAttribute::Lat, "min_lat", "max_lat", self.min_lat, self.max_lat),
            bound(NumericAttribute::Lon, "min_lon", "max_lon", self.min_lon, self.max_lon),
            bound(NumericAttribute::Id, "min_id", "max_id", self.min_id, self.max_id),
            bound(NumericAttribute::Iv, "min_iv", "max_iv", self.min_iv, self.max_iv),
            bound(
                NumericAttribute::Attack,
                "min_attack",
                "max_attack",
                self.min_attack,
                self.max_attack,
            ),
            bound(
                NumericAttribute::Defense,
                "min_defense",
                "max_defense",
                self.min_defense,
                self.max_defense,
            ),
            bound(
                NumericAttribute::Stamina,
                "min_stamina",
                "max_stamina",
                self.min_stamina,
                self.max_stamina,
            ),
            bound(
                NumericAttribute::Level,
                "min_level",
                "max_level",
                self.min_level,
                self.max_level,
            ),
        ]
    }
}

const fn bound(
    attribute: NumericAttribute,
    min_label: &'static str,
    max_label: &'static str,
    min: Option<f64>,
    max: Option<f64>,
) -> NumericBound {
    NumericBound {
        attribute,
        min_label,
        max_label,
        min,
        max,
    }
}
