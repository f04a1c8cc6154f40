//! Static reference tables: species names, move names, base stats, and the
//! level to combat-power-multiplier table.
//!
//! [`ReferenceData`] is built once at startup (from a data directory or
//! programmatically) and then shared immutably by reference. Lookups never
//! fall back to a default: a miss is a [`LookupError`] the caller decides
//! how to handle.
//!
//! # Data directory layout
//!
//! | File         | Shape                                          |
//! |--------------|------------------------------------------------|
//! | `names.json` | `{"1": "Bulbasaur", ...}`                      |
//! | `moves.json` | `{"13": "Wrap", ...}`                          |
//! | `stats.json` | `{"1": {"attack": 118, "defense": 111, "stamina": 128}}` |
//! | `cpm.json`   | `{"1": 0.094, "1.5": 0.135, ...}`              |
//!
//! Only whole levels are kept from `cpm.json`; half levels are skipped.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors raised while loading reference files.
#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    /// A reference file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A reference file is not valid JSON of the expected shape.
    #[error("failed to parse {path}: {source}")]
    Json {
        /// The file that failed.
        path: PathBuf,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// A key in a reference file is not a valid numeric id.
    #[error("invalid key {key:?} in {file}")]
    InvalidKey {
        /// Which file contained the key.
        file: &'static str,
        /// The offending key.
        key: String,
    },
}

/// A reference lookup miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// No name or base stats are known for this species.
    #[error("unknown species id {0}")]
    UnknownSpecies(u16),

    /// No name is known for this move.
    #[error("unknown move id {0}")]
    UnknownMove(u16),

    /// No multiplier is known for this level.
    #[error("unknown level {0}")]
    UnknownLevel(u8),
}

/// Per-species base stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseStats {
    /// Base attack.
    pub attack: u16,
    /// Base defense.
    pub defense: u16,
    /// Base stamina.
    pub stamina: u16,
}

/// Immutable reference tables shared by the record builder and the stat model.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    species_names: HashMap<u16, String>,
    move_names: HashMap<u16, String>,
    base_stats: HashMap<u16, BaseStats>,
    level_multipliers: BTreeMap<u8, f64>,
}

impl ReferenceData {
    /// An empty set of tables. Every lookup misses until populated.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load all four tables from a data directory.
    ///
    /// # Errors
    ///
    /// Returns [`ReferenceError`] if a file is missing, unparsable, or
    /// contains a non-numeric id key.
    pub fn from_dir(dir: &Path) -> Result<Self, ReferenceError> {
        let names: HashMap<String, String> = read_json(&dir.join("names.json"))?;
        let moves: HashMap<String, String> = read_json(&dir.join("moves.json"))?;
        let stats: HashMap<String, BaseStats> = read_json(&dir.join("stats.json"))?;
        let cpm: HashMap<String, f64> = read_json(&dir.join("cpm.json"))?;

        let mut level_multipliers = BTreeMap::new();
        for (key, multiplier) in cpm {
            match key.parse::<u8>() {
                Ok(level) => {
                    level_multipliers.insert(level, multiplier);
                }
                Err(_) if key.parse::<f64>().is_ok() => {
                    debug!(level = key, "skipping fractional level multiplier");
                }
                Err(_) => {
                    return Err(ReferenceError::InvalidKey {
                        file: "cpm.json",
                        key,
                    });
                }
            }
        }

        Ok(Self {
            species_names: parse_keys("names.json", names)?,
            move_names: parse_keys("moves.json", moves)?,
            base_stats: parse_keys("stats.json", stats)?,
            level_multipliers,
        })
    }

    /// Add a species name and base stats.
    #[must_use]
    pub fn with_species(mut self, id: u16, name: &str, stats: BaseStats) -> Self {
        self.species_names.insert(id, name.to_owned());
        self.base_stats.insert(id, stats);
        self
    }

    /// Add a move name.
    #[must_use]
    pub fn with_move(mut self, id: u16, name: &str) -> Self {
        self.move_names.insert(id, name.to_owned());
        self
    }

    /// Add a level multiplier.
    #[must_use]
    pub fn with_level(mut self, level: u8, multiplier: f64) -> Self {
        self.level_multipliers.insert(level, multiplier);
        self
    }

    /// Display name of a species.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::UnknownSpecies`] on a miss.
    pub fn species_name(&self, id: u16) -> Result<&str, LookupError> {
        self.species_names
            .get(&id)
            .map(String::as_str)
            .ok_or(LookupError::UnknownSpecies(id))
    }

    /// Display name of a move.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::UnknownMove`] on a miss.
    pub fn move_name(&self, id: u16) -> Result<&str, LookupError> {
        self.move_names
            .get(&id)
            .map(String::as_str)
            .ok_or(LookupError::UnknownMove(id))
    }

    /// Base stats of a species.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::UnknownSpecies`] on a miss.
    pub fn base_stats(&self, id: u16) -> Result<BaseStats, LookupError> {
        self.base_stats
            .get(&id)
            .copied()
            .ok_or(LookupError::UnknownSpecies(id))
    }

    /// Combat-power multiplier for a level.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::UnknownLevel`] on a miss.
    pub fn level_multiplier(&self, level: u8) -> Result<f64, LookupError> {
        self.level_multipliers
            .get(&level)
            .copied()
            .ok_or(LookupError::UnknownLevel(level))
    }

    /// Number of species with base stats.
    pub fn species_count(&self) -> usize {
        self.base_stats.len()
    }

    /// Number of whole levels with a multiplier.
    pub fn level_count(&self) -> usize {
        self.level_multipliers.len()
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ReferenceError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ReferenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ReferenceError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_keys<V>(
    file: &'static str,
    raw: HashMap<String, V>,
) -> Result<HashMap<u16, V>, ReferenceError> {
    raw.into_iter()
        .map(|(key, value)| match key.parse::<u16>() {
            Ok(id) => Ok((id, value)),
            Err(_) => Err(ReferenceError::InvalidKey { file, key }),
        })
        .collect()
}
