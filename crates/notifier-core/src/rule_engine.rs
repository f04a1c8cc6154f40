//! Evaluates one record against one rule.
//!
//! Evaluation is a short-circuiting conjunction over six stages, run in a
//! fixed order:
//!
//! 1. **Kind gating**: rule scope, then for raid rules the egg/raid flags
//!    and accepted tiers.
//! 2. **Name**: exact species name.
//! 3. **Numeric bounds**: `min_*`/`max_*` on lat, lon, id, iv, attack,
//!    defense, stamina and level. A missing attribute compares as
//!    [`MIN_SENTINEL`] against minimums and [`MAX_SENTINEL`] against maximums.
//! 4. **Combat stats**: observed CP bounds and per-level CP/HP thresholds.
//!    Per-level thresholds need all three individual values.
//! 5. **Moves**: at least one accepted pair must match.
//! 6. **Geofence**: containment in the named region.
//!
//! Eggs have no boss, so stages 2, 4 and 5 are skipped for them. Stage order
//! only affects cost: every constraint is a pure predicate over the record,
//! so the verdict equals the conjunction of the constraints taken one by one.
//!
//! The engine is stateless. Per-level stats computed along the way are
//! returned so the caller can attach them to the delivered record.

use tracing::warn;

use crate::geofence::GeofenceIndex;
use crate::record::{DerivedKind, DerivedStat, Record};
use crate::reference::ReferenceData;
use crate::rule::{CpThreshold, Rule};
use crate::stats;

/// Value a missing attribute takes against a minimum.
pub const MIN_SENTINEL: f64 = -1.0;

/// Value a missing attribute takes against a maximum.
pub const MAX_SENTINEL: f64 = 99_999.0;

/// Shared read-only inputs to evaluation.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    /// Base stats and level multipliers.
    pub reference: &'a ReferenceData,
    /// Configured geofences.
    pub geofences: &'a GeofenceIndex,
}

/// Outcome of evaluating one rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleEvaluation {
    /// Whether every constraint held.
    pub matched: bool,
    /// Constraints that held, in evaluation order. Diagnostic only.
    pub satisfied: Vec<&'static str>,
    /// The constraint that failed, if any.
    pub failed: Option<&'static str>,
    /// Per-level stats computed while evaluating.
    pub derived: Vec<DerivedStat>,
}

/// Evaluate `record` against `rule`.
pub fn evaluate(record: &Record, rule: &Rule, ctx: &MatchContext<'_>) -> RuleEvaluation {
    let mut trace = Trace::default();
    let outcome = run_stages(record, rule, ctx, &mut trace);
    RuleEvaluation {
        matched: outcome.is_ok(),
        satisfied: trace.satisfied,
        failed: outcome.err(),
        derived: trace.derived,
    }
}

/// Satisfied criteria and computed stats collected while evaluating.
#[derive(Debug, Default)]
struct Trace {
    satisfied: Vec<&'static str>,
    derived: Vec<DerivedStat>,
}

impl Trace {
    /// Record `label` as satisfied if `holds`, otherwise fail with it.
    fn check(&mut self, label: &'static str, holds: bool) -> Result<(), &'static str> {
        if holds {
            self.satisfied.push(label);
            Ok(())
        } else {
            Err(label)
        }
    }

    fn derive(&mut self, stat: DerivedStat) {
        if !self.derived.contains(&stat) {
            self.derived.push(stat);
        }
    }
}

fn run_stages(
    record: &Record,
    rule: &Rule,
    ctx: &MatchContext<'_>,
    trace: &mut Trace,
) -> Result<(), &'static str> {
    kind_stage(record, rule, trace)?;
    if !record.is_egg() {
        name_stage(record, rule, trace)?;
    }
    bounds_stage(record, rule, trace)?;
    if !record.is_egg() {
        combat_stage(record, rule, ctx.reference, trace)?;
        moves_stage(record, rule, trace)?;
    }
    geofence_stage(record, rule, ctx.geofences, trace)
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

fn kind_stage(record: &Record, rule: &Rule, trace: &mut Trace) -> Result<(), &'static str> {
    if !rule.scope.covers(record.kind()) {
        return Err("scope");
    }
    let Record::Raid(raid) = record else {
        return Ok(());
    };
    if raid.is_egg() {
        trace.check("egg", rule.egg)?;
    } else {
        trace.check("raid", rule.raid)?;
    }
    if let Some(levels) = &rule.levels {
        trace.check("levels", levels.contains(&raid.level))?;
    }
    Ok(())
}

fn name_stage(record: &Record, rule: &Rule, trace: &mut Trace) -> Result<(), &'static str> {
    if let Some(name) = &rule.name {
        trace.check("name", record.name() == Some(name.as_str()))?;
    }
    Ok(())
}

fn bounds_stage(record: &Record, rule: &Rule, trace: &mut Trace) -> Result<(), &'static str> {
    for bound in rule.bounds() {
        let value = record.attribute(bound.attribute);
        if let Some(min) = bound.min {
            trace.check(bound.min_label, value.unwrap_or(MIN_SENTINEL) >= min)?;
        }
        if let Some(max) = bound.max {
            trace.check(bound.max_label, value.unwrap_or(MAX_SENTINEL) <= max)?;
        }
    }
    Ok(())
}

fn combat_stage(
    record: &Record,
    rule: &Rule,
    reference: &ReferenceData,
    trace: &mut Trace,
) -> Result<(), &'static str> {
    if let Some(threshold) = &rule.min_cp {
        let holds = match threshold {
            CpThreshold::Observed(min) => observed_cp(record, MIN_SENTINEL) >= f64::from(*min),
            CpThreshold::PerLevel(levels) => {
                per_level(record, reference, DerivedKind::Cp, levels, trace, |v, t| v >= t)
            }
        };
        trace.check("min_cp", holds)?;
    }
    if let Some(threshold) = &rule.max_cp {
        let holds = match threshold {
            CpThreshold::Observed(max) => observed_cp(record, MAX_SENTINEL) <= f64::from(*max),
            CpThreshold::PerLevel(levels) => {
                per_level(record, reference, DerivedKind::Cp, levels, trace, |v, t| v <= t)
            }
        };
        trace.check("max_cp", holds)?;
    }
    if let Some(levels) = &rule.min_hp {
        let holds = per_level(record, reference, DerivedKind::Hp, levels, trace, |v, t| v >= t);
        trace.check("min_hp", holds)?;
    }
    if let Some(levels) = &rule.max_hp {
        let holds = per_level(record, reference, DerivedKind::Hp, levels, trace, |v, t| v <= t);
        trace.check("max_hp", holds)?;
    }
    Ok(())
}

fn observed_cp(record: &Record, sentinel: f64) -> f64 {
    record.observed_cp().map_or(sentinel, f64::from)
}

/// Check every `(level, threshold)` pair, computing the stat at each level.
///
/// Fails without computing anything when individual values are missing, and
/// on the first reference miss.
fn per_level(
    record: &Record,
    reference: &ReferenceData,
    kind: DerivedKind,
    levels: &std::collections::BTreeMap<u8, u32>,
    trace: &mut Trace,
    holds: impl Fn(u32, u32) -> bool,
) -> bool {
    let (Some(species), Some(ivs)) = (record.species_id(), record.ivs()) else {
        return false;
    };
    for (&level, &threshold) in levels {
        let computed = match kind {
            DerivedKind::Cp => stats::combat_power(reference, species, level, ivs),
            DerivedKind::Hp => stats::hit_points(reference, species, level, ivs.stamina),
        };
        let value = match computed {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, species, level, "cannot compute stat, rule does not match");
                return false;
            }
        };
        trace.derive(DerivedStat { kind, level, value });
        if !holds(value, threshold) {
            return false;
        }
    }
    true
}

fn moves_stage(record: &Record, rule: &Rule, trace: &mut Trace) -> Result<(), &'static str> {
    if let Some(sets) = &rule.moves {
        let (move_1, move_2) = record.moves();
        trace.check("moves", sets.iter().any(|s| s.accepts(move_1, move_2)))?;
    }
    Ok(())
}

fn geofence_stage(
    record: &Record,
    rule: &Rule,
    geofences: &GeofenceIndex,
    trace: &mut Trace,
) -> Result<(), &'static str> {
    if let Some(name) = &rule.geofence {
        let (lat, lon) = record.coordinates();
        trace.check("geofence", geofences.contains(name, lat, lon))?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::DateTime;
    use notifier_types::{EncounterId, GymId, IndividualValues};

    use super::*;
    use crate::geofence::{Coordinate, Geofence};
    use crate::record::{RaidBoss, RaidRecord, SpawnRecord};
    use crate::reference::BaseStats;
    use crate::rule::{MoveSet, RuleScope};

    fn reference() -> ReferenceData {
        ReferenceData::new()
            .with_species(
                7,
                "Flat",
                BaseStats {
                    attack: 100,
                    defense: 100,
                    stamina: 100,
                },
            )
            .with_level(20, 0.5)
            .with_level(30, 0.7)
    }

    fn geofences() -> GeofenceIndex {
        let square = [(0.0, 0.0), (0.0, 50.0), (50.0, 50.0), (50.0, 0.0)]
            .into_iter()
            .map(Coordinate::from)
            .collect();
        GeofenceIndex::new([Geofence::new("square", square).unwrap()])
    }

    fn spawn() -> Record {
        Record::Spawn(SpawnRecord {
            encounter_id: EncounterId::new("abc"),
            species_id: 7,
            name: Some("Flat".to_owned()),
            latitude: 10.0,
            longitude: 20.0,
            disappears_at: DateTime::from_timestamp(1_000, 0).unwrap(),
            cp: Some(302),
            level: Some(20),
            ivs: Some(IndividualValues {
                attack: 10,
                defense: 10,
                stamina: 10,
            }),
            iv_percent: Some(200.0 / 3.0),
            move_1: Some("Tackle".to_owned()),
            move_2: Some("Body Slam".to_owned()),
            form: None,
            derived: Vec::new(),
        })
    }

    fn raid(boss: bool) -> Record {
        Record::Raid(RaidRecord {
            gym_id: GymId::new("g1"),
            gym_name: None,
            latitude: 10.0,
            longitude: 20.0,
            level: 5,
            starts_at: DateTime::from_timestamp(1_000, 0).unwrap(),
            ends_at: DateTime::from_timestamp(4_600, 0).unwrap(),
            spawned_at: None,
            boss: boss.then(|| RaidBoss {
                species_id: 7,
                name: Some("Flat".to_owned()),
                cp: Some(40_000),
                move_1: None,
                move_2: None,
            }),
        })
    }

    fn raid_with_moves(fast: &str, charged: &str) -> Record {
        let mut inner = match raid(true) {
            Record::Raid(inner) => inner,
            other => panic!("Expected raid, got {other:?}"),
        };
        if let Some(boss) = inner.boss.as_mut() {
            boss.move_1 = Some(fast.to_owned());
            boss.move_2 = Some(charged.to_owned());
        }
        Record::Raid(inner)
    }

    fn eval(record: &Record, rule: &Rule) -> RuleEvaluation {
        let reference = reference();
        let geofences = geofences();
        let ctx = MatchContext {
            reference: &reference,
            geofences: &geofences,
        };
        evaluate(record, rule, &ctx)
    }

    #[test]
    fn empty_rule_matches_every_event_of_its_kind() {
        assert!(eval(&spawn(), &Rule::spawn()).matched);
        assert!(eval(&raid(true), &Rule::raid()).matched);
        assert!(eval(&raid(false), &Rule::raid()).matched);
        assert!(eval(&spawn(), &Rule::spawn()).satisfied.is_empty());
    }

    #[test]
    fn scope_mismatch_never_matches() {
        let result = eval(&raid(true), &Rule::spawn());
        assert!(!result.matched);
        assert_eq!(result.failed, Some("scope"));
        assert!(!eval(&spawn(), &Rule::raid()).matched);
    }

    #[test]
    fn min_attack_on_perfect_spawn() {
        let rule = Rule {
            min_attack: Some(10.0),
            max_iv: Some(100.0),
            ..Rule::spawn()
        };
        let result = eval(&spawn(), &rule);
        assert!(result.matched);
        assert_eq!(result.satisfied, vec!["max_iv", "min_attack"]);
    }

    #[test]
    fn missing_attribute_fails_bounds() {
        let Record::Spawn(mut inner) = spawn() else {
            return;
        };
        inner.level = None;
        let record = Record::Spawn(inner);

        let min = Rule {
            min_level: Some(1.0),
            ..Rule::spawn()
        };
        let max = Rule {
            max_level: Some(40.0),
            ..Rule::spawn()
        };
        assert_eq!(eval(&record, &min).failed, Some("min_level"));
        assert_eq!(eval(&record, &max).failed, Some("max_level"));
    }

    #[test]
    fn per_level_cp_is_derived() {
        let rule = Rule {
            min_cp: Some(CpThreshold::PerLevel(BTreeMap::from([(20, 302)]))),
            ..Rule::spawn()
        };
        let result = eval(&spawn(), &rule);
        assert!(result.matched);
        assert_eq!(
            result.derived,
            vec![DerivedStat {
                kind: DerivedKind::Cp,
                level: 20,
                value: 302,
            }]
        );

        let too_high = Rule {
            min_cp: Some(CpThreshold::PerLevel(BTreeMap::from([(20, 303)]))),
            ..Rule::spawn()
        };
        assert_eq!(eval(&spawn(), &too_high).failed, Some("min_cp"));
    }

    #[test]
    fn every_listed_level_must_hold() {
        let rule = Rule {
            max_hp: Some(BTreeMap::from([(20, 55), (30, 60)])),
            ..Rule::spawn()
        };
        // hp(20) = 55, hp(30) = floor(110 * 0.7) = 77
        let result = eval(&spawn(), &rule);
        assert!(!result.matched);
        assert_eq!(result.derived.len(), 2);
    }

    #[test]
    fn per_level_threshold_needs_all_ivs() {
        let Record::Spawn(mut inner) = spawn() else {
            return;
        };
        inner.ivs = None;
        let rule = Rule {
            min_hp: Some(BTreeMap::from([(20, 1)])),
            ..Rule::spawn()
        };
        let result = eval(&Record::Spawn(inner), &rule);
        assert_eq!(result.failed, Some("min_hp"));
        assert!(result.derived.is_empty());
    }

    #[test]
    fn unknown_level_fails_rule() {
        let rule = Rule {
            min_cp: Some(CpThreshold::PerLevel(BTreeMap::from([(35, 1)]))),
            ..Rule::spawn()
        };
        assert!(!eval(&spawn(), &rule).matched);
    }

    #[test]
    fn observed_cp_bounds() {
        let rule = Rule {
            min_cp: Some(CpThreshold::Observed(300)),
            max_cp: Some(CpThreshold::Observed(310)),
            ..Rule::spawn()
        };
        assert!(eval(&spawn(), &rule).matched);

        let raid_rule = Rule {
            min_cp: Some(CpThreshold::Observed(50_000)),
            ..Rule::raid()
        };
        assert_eq!(eval(&raid(true), &raid_rule).failed, Some("min_cp"));
    }

    #[test]
    fn move_pairs_with_wildcards() {
        let rule = Rule {
            moves: Some(vec![
                MoveSet {
                    move_1: Some("Bite".to_owned()),
                    move_2: None,
                },
                MoveSet {
                    move_1: None,
                    move_2: Some("Body Slam".to_owned()),
                },
            ]),
            ..Rule::spawn()
        };
        assert!(eval(&spawn(), &rule).matched);

        let none_match = Rule {
            moves: Some(vec![MoveSet {
                move_1: Some("Bite".to_owned()),
                move_2: None,
            }]),
            ..Rule::spawn()
        };
        assert_eq!(eval(&spawn(), &none_match).failed, Some("moves"));
    }

    #[test]
    fn raid_moves_come_from_the_boss() {
        let rule = Rule {
            moves: Some(vec![MoveSet {
                move_1: Some("Confusion".to_owned()),
                move_2: None,
            }]),
            ..Rule::raid()
        };

        let result = eval(&raid_with_moves("Confusion", "Psystrike"), &rule);
        assert!(result.matched);
        assert_eq!(result.satisfied, vec!["raid", "moves"]);

        assert_eq!(
            eval(&raid_with_moves("Psycho Cut", "Psystrike"), &rule).failed,
            Some("moves")
        );
        // A boss whose moves are unknown cannot satisfy a required move.
        assert_eq!(eval(&raid(true), &rule).failed, Some("moves"));
        // Eggs skip the moves stage entirely.
        let egg = eval(&raid(false), &rule);
        assert!(egg.matched);
        assert_eq!(egg.satisfied, vec!["egg"]);
    }

    #[test]
    fn geofence_membership() {
        let inside = Rule {
            geofence: Some("square".to_owned()),
            ..Rule::spawn()
        };
        assert!(eval(&spawn(), &inside).matched);

        let unknown = Rule {
            geofence: Some("nowhere".to_owned()),
            ..Rule::spawn()
        };
        assert_eq!(eval(&spawn(), &unknown).failed, Some("geofence"));
    }

    #[test]
    fn raid_flags_and_levels() {
        let eggs_only = Rule {
            raid: false,
            ..Rule::raid()
        };
        assert!(eval(&raid(false), &eggs_only).matched);
        assert_eq!(eval(&raid(true), &eggs_only).failed, Some("raid"));

        let tier_three = Rule {
            levels: Some(vec![3]),
            ..Rule::raid()
        };
        assert_eq!(eval(&raid(false), &tier_three).failed, Some("levels"));
    }

    #[test]
    fn eggs_skip_boss_constraints() {
        let rule = Rule {
            scope: RuleScope::Raid,
            name: Some("Mewtwo".to_owned()),
            min_cp: Some(CpThreshold::Observed(1)),
            ..Rule::raid()
        };
        assert!(eval(&raid(false), &rule).matched);
        assert_eq!(eval(&raid(true), &rule).failed, Some("name"));
    }

    #[test]
    fn verdict_is_conjunction_of_single_constraints() {
        let singles = [
            Rule {
                name: Some("Flat".to_owned()),
                ..Rule::spawn()
            },
            Rule {
                min_iv: Some(60.0),
                ..Rule::spawn()
            },
            Rule {
                max_lon: Some(15.0),
                ..Rule::spawn()
            },
            Rule {
                min_cp: Some(CpThreshold::PerLevel(BTreeMap::from([(30, 500)]))),
                ..Rule::spawn()
            },
            Rule {
                geofence: Some("square".to_owned()),
                ..Rule::spawn()
            },
        ];
        let combined = Rule {
            name: Some("Flat".to_owned()),
            min_iv: Some(60.0),
            max_lon: Some(15.0),
            min_cp: Some(CpThreshold::PerLevel(BTreeMap::from([(30, 500)]))),
            geofence: Some("square".to_owned()),
            ..Rule::spawn()
        };

        let record = spawn();
        let each: Vec<bool> = singles.iter().map(|r| eval(&record, r).matched).collect();
        assert_eq!(each, vec![true, true, false, true, true]);
        assert_eq!(eval(&record, &combined).matched, each.iter().all(|m| *m));

        // Dropping the single failing constraint flips the verdict.
        let relaxed = Rule {
            max_lon: None,
            ..combined
        };
        assert!(eval(&record, &relaxed).matched);
    }
}
