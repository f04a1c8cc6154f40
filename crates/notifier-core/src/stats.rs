//! Derived combat statistics.
//!
//! Pure functions over [`ReferenceData`]; no state, safe to call from any
//! context. Formulas:
//!
//! ```text
//! iv%  = (atk + def + sta) * 100 / 45
//! cp   = floor((baseAtk + atk) * sqrt(baseDef + def) * sqrt(baseSta + sta) * cpm(level)^2 / 10)
//! hp   = floor((baseSta + sta) * cpm(level))
//! ```

use notifier_types::IndividualValues;

use crate::reference::{LookupError, ReferenceData};

/// Sum of three perfect individual values.
const MAX_IV_SUM: f64 = 45.0;

/// Individual-value percentage in `0.0..=100.0`.
pub fn iv_percent(ivs: IndividualValues) -> f64 {
    let sum = f64::from(ivs.attack) + f64::from(ivs.defense) + f64::from(ivs.stamina);
    sum * 100.0 / MAX_IV_SUM
}

/// Combat power of `species` at `level` with the given individual values.
///
/// # Errors
///
/// Returns [`LookupError`] if the species' base stats or the level's
/// multiplier are unknown.
pub fn combat_power(
    reference: &ReferenceData,
    species: u16,
    level: u8,
    ivs: IndividualValues,
) -> Result<u32, LookupError> {
    let base = reference.base_stats(species)?;
    let multiplier = reference.level_multiplier(level)?;

    let attack = f64::from(base.attack) + f64::from(ivs.attack);
    let defense = f64::from(base.defense) + f64::from(ivs.defense);
    let stamina = f64::from(base.stamina) + f64::from(ivs.stamina);

    let cp = attack * defense.sqrt() * stamina.sqrt() * (multiplier.powi(2) / 10.0);
    Ok(floor_to_u32(cp))
}

/// Hit points of `species` at `level` with the given stamina individual value.
///
/// # Errors
///
/// Returns [`LookupError`] if the species' base stats or the level's
/// multiplier are unknown.
pub fn hit_points(
    reference: &ReferenceData,
    species: u16,
    level: u8,
    iv_stamina: u8,
) -> Result<u32, LookupError> {
    let base = reference.base_stats(species)?;
    let multiplier = reference.level_multiplier(level)?;

    let stamina = f64::from(base.stamina) + f64::from(iv_stamina);
    Ok(floor_to_u32(stamina * multiplier))
}

/// Truncate a non-negative stat toward zero. Negative or NaN inputs become 0.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn floor_to_u32(value: f64) -> u32 {
    value.floor().max(0.0) as u32
}
