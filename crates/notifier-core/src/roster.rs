//! Gym roster history and "joined" transition detection.
//!
//! The tracker remembers the last roster of every gym it has seen. Per gym
//! the state machine is `Unknown -> Known`:
//!
//! - **Unknown**: the first snapshot is stored verbatim and produces no
//!   transitions. There is nothing to compare against, and reporting every
//!   defender as "joined" on cold start would be noise.
//! - **Known**: each tracked trainer present in the new snapshot but absent
//!   from the previous one yields exactly one [`RosterTransition`]. Trainers
//!   who left are not reported.
//!
//! After diffing, the stored record is replaced with the new snapshot. A
//! transition carries the gym name, position and team from the new
//! snapshot, so a renamed gym is reported under its new name.

use std::collections::{BTreeSet, HashMap, HashSet};

use notifier_types::{GymId, GymUpdateEvent, Team};
use serde::Serialize;
use tracing::{debug, info};

/// The last-known state of one gym.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GymRecord {
    /// Display name.
    pub name: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Controlling faction.
    pub team: Team,
    /// Trainer names in roster order (duplicates allowed).
    pub trainers: Vec<String>,
}

impl GymRecord {
    fn from_update(update: &GymUpdateEvent) -> Self {
        Self {
            name: update.name.clone(),
            latitude: update.latitude,
            longitude: update.longitude,
            team: update.team,
            trainers: update.trainer_names().map(str::to_owned).collect(),
        }
    }
}

/// A tracked trainer appeared in a gym.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterTransition {
    /// The trainer who joined.
    pub trainer_name: String,
    /// The gym joined.
    pub gym_id: GymId,
    /// Gym display name from the snapshot that revealed the join.
    pub gym_name: String,
    /// Gym latitude.
    pub latitude: f64,
    /// Gym longitude.
    pub longitude: f64,
    /// Faction holding the gym after the update.
    pub team: Team,
}

/// Last-known rosters keyed by gym, plus the trainer names of interest.
#[derive(Debug, Clone, Default)]
pub struct GymRosterTracker {
    tracked: BTreeSet<String>,
    gyms: HashMap<GymId, GymRecord>,
}

impl GymRosterTracker {
    /// A tracker watching the given trainer names.
    pub fn new(tracked: impl IntoIterator<Item = String>) -> Self {
        Self {
            tracked: tracked.into_iter().collect(),
            gyms: HashMap::new(),
        }
    }

    /// Apply a snapshot and return the tracked trainers who joined.
    pub fn observe(&mut self, update: &GymUpdateEvent) -> Vec<RosterTransition> {
        let record = GymRecord::from_update(update);

        let Some(previous) = self.gyms.insert(update.gym_id.clone(), record) else {
            debug!(
                gym_id = %update.gym_id,
                gym = %update.name,
                defenders = update.roster.len(),
                "first observation of gym, roster recorded"
            );
            return Vec::new();
        };

        let before: HashSet<&str> = previous.trainers.iter().map(String::as_str).collect();
        let now: HashSet<&str> = update.trainer_names().collect();

        let transitions: Vec<RosterTransition> = self
            .tracked
            .iter()
            .filter(|name| now.contains(name.as_str()) && !before.contains(name.as_str()))
            .map(|name| RosterTransition {
                trainer_name: name.clone(),
                gym_id: update.gym_id.clone(),
                gym_name: update.name.clone(),
                latitude: update.latitude,
                longitude: update.longitude,
                team: update.team,
            })
            .collect();

        for t in &transitions {
            info!(
                trainer = %t.trainer_name,
                gym_id = %t.gym_id,
                gym = %t.gym_name,
                "tracked trainer joined gym"
            );
        }

        transitions
    }

    /// The last-known record of a gym.
    pub fn gym(&self, gym_id: &GymId) -> Option<&GymRecord> {
        self.gyms.get(gym_id)
    }

    /// Number of gyms with a recorded roster.
    pub fn known_gyms(&self) -> usize {
        self.gyms.len()
    }

    /// Whether a trainer name is tracked.
    pub fn is_tracked(&self, trainer: &str) -> bool {
        self.tracked.contains(trainer)
    }
}

#[cfg(test)]
mod tests {
    use notifier_types::GymMember;

    use super::*;

    fn update(trainers: &[&str]) -> GymUpdateEvent {
        GymUpdateEvent {
            gym_id: GymId::new("gym-1"),
            name: String::from("Fountain"),
            latitude: 1.0,
            longitude: 2.0,
            team: Team::Valor,
            roster: trainers
                .iter()
                .map(|t| GymMember {
                    trainer_name: (*t).to_owned(),
                    pokemon_id: 143,
                    cp: None,
                    trainer_level: None,
                })
                .collect(),
        }
    }

    fn tracker() -> GymRosterTracker {
        GymRosterTracker::new(["ash".to_owned(), "misty".to_owned()])
    }

    #[test]
    fn first_observation_never_emits() {
        let mut t = tracker();
        assert!(t.observe(&update(&["ash", "misty"])).is_empty());
        assert_eq!(t.known_gyms(), 1);
    }

    #[test]
    fn newly_present_tracked_trainer_emits_once() {
        let mut t = tracker();
        t.observe(&update(&["brock"]));
        let joined = t.observe(&update(&["brock", "ash", "ash"]));
        assert_eq!(joined.len(), 1);
        assert_eq!(joined.first().map(|j| j.trainer_name.as_str()), Some("ash"));
        assert_eq!(joined.first().map(|j| j.team), Some(Team::Valor));
    }

    #[test]
    fn trainer_present_in_both_emits_nothing() {
        let mut t = tracker();
        t.observe(&update(&["ash"]));
        assert!(t.observe(&update(&["ash", "brock"])).is_empty());
    }

    #[test]
    fn departure_emits_nothing() {
        let mut t = tracker();
        t.observe(&update(&["ash", "misty"]));
        assert!(t.observe(&update(&["misty"])).is_empty());
        // Returning after a departure is a fresh join.
        assert_eq!(t.observe(&update(&["misty", "ash"])).len(), 1);
    }

    #[test]
    fn untracked_trainers_are_ignored() {
        let mut t = tracker();
        t.observe(&update(&[]));
        assert!(t.observe(&update(&["gary"])).is_empty());
        assert!(!t.is_tracked("gary"));
    }

    #[test]
    fn join_reports_name_from_new_snapshot() {
        let mut t = tracker();
        t.observe(&update(&["brock"]));
        let mut renamed = update(&["brock", "misty"]);
        renamed.name = String::from("New Fountain");
        let joined = t.observe(&renamed);
        assert_eq!(
            joined.first().map(|j| j.gym_name.as_str()),
            Some("New Fountain")
        );
    }

    #[test]
    fn record_is_replaced_after_diff() {
        let mut t = tracker();
        t.observe(&update(&["brock"]));
        let mut renamed = update(&["misty"]);
        renamed.name = String::from("New Fountain");
        t.observe(&renamed);

        let record = t.gym(&GymId::new("gym-1"));
        assert_eq!(record.map(|r| r.name.as_str()), Some("New Fountain"));
        assert_eq!(record.map(|r| r.trainers.clone()), Some(vec!["misty".to_owned()]));
    }
}
