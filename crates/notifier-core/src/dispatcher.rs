//! The single consumer that turns raw payloads into notifications.
//!
//! [`Dispatcher`] exclusively owns all mutable pipeline state: the dedup
//! cache and the gym roster tracker. Per payload, in order:
//!
//! 1. Decode and validate. Malformed and unsupported payloads are dropped
//!    here and never touch the cache or the roster.
//! 2. Dedup spawns, raids and eggs by their dedup key.
//! 3. Gym updates go to the roster tracker; joins are delivered to every
//!    enabled gym target.
//! 4. Spawns and raids become canonical records and are evaluated against
//!    every rule in scope. The union of the matching rules' enabled targets
//!    receives one notification.
//!
//! [`Dispatcher::run`] drives this from the ingest queue and sweeps the
//! dedup cache on a fixed cadence from the same task.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use notifier_types::{Event, EventError, GymUpdateEvent, TargetId};
use serde_json::Value;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, NotifierConfig};
use crate::dedup::{DedupCache, DedupKey};
use crate::delivery::{Delivery, Notification, NotificationPayload};
use crate::geofence::GeofenceIndex;
use crate::ingest::IngestReceiver;
use crate::record::{self, Record};
use crate::reference::ReferenceData;
use crate::roster::GymRosterTracker;
use crate::rule_engine::{self, MatchContext};

/// What happened to one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Failed to decode or validate.
    Malformed,
    /// Well-formed envelope of a type this pipeline ignores.
    Unsupported,
    /// Already processed and not yet expired.
    Duplicate,
    /// Processed; no rule with an enabled target matched.
    Unmatched,
    /// Handed to delivery for this many targets.
    Dispatched {
        /// Distinct targets.
        targets: usize,
    },
    /// Matched, but delivery refused the notification.
    Undelivered,
    /// Gym roster recorded; this many join notifications were handed off.
    RosterUpdated {
        /// Join notifications handed to delivery.
        joins: usize,
    },
}

/// Counters kept for the lifetime of a dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Payloads taken off the queue.
    pub received: u64,
    /// Payloads dropped as malformed.
    pub malformed: u64,
    /// Payloads dropped as unsupported.
    pub unsupported: u64,
    /// Events dropped as duplicates.
    pub duplicates: u64,
    /// Events processed without a delivery.
    pub unmatched: u64,
    /// Notifications handed to delivery.
    pub dispatched: u64,
    /// Notifications delivery refused.
    pub delivery_failures: u64,
    /// Dedup entries removed by sweeps.
    pub swept: u64,
}

const fn bump(counter: &mut u64) {
    *counter = counter.saturating_add(1);
}

/// Owns pipeline state and routes events to delivery.
#[derive(Debug)]
pub struct Dispatcher<D> {
    config: NotifierConfig,
    reference: Arc<ReferenceData>,
    geofences: GeofenceIndex,
    dedup: DedupCache,
    roster: GymRosterTracker,
    delivery: D,
    stats: DispatchStats,
}

impl<D: Delivery> Dispatcher<D> {
    /// Build a dispatcher from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidGeofence`] if a geofence polygon is unusable.
    pub fn new(
        config: NotifierConfig,
        reference: Arc<ReferenceData>,
        delivery: D,
    ) -> Result<Self, ConfigError> {
        let geofences = config.geofence_index()?;
        let roster = GymRosterTracker::new(config.tracked_trainers.iter().cloned());
        info!(
            rules = config.rules.len(),
            targets = config.targets.len(),
            geofences = geofences.len(),
            tracked_trainers = config.tracked_trainers.len(),
            "dispatcher ready"
        );
        Ok(Self {
            config,
            reference,
            geofences,
            dedup: DedupCache::new(),
            roster,
            delivery,
            stats: DispatchStats::default(),
        })
    }

    /// Counters so far.
    pub const fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// The delivery collaborator.
    pub const fn delivery(&self) -> &D {
        &self.delivery
    }

    /// The roster tracker.
    pub const fn roster(&self) -> &GymRosterTracker {
        &self.roster
    }

    /// The dedup cache.
    pub const fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    /// Process one raw payload as of `now`.
    pub fn handle(&mut self, payload: Value, now: DateTime<Utc>) -> Outcome {
        bump(&mut self.stats.received);

        let event = match Event::from_payload(payload) {
            Ok(event) => event,
            Err(EventError::Unsupported(kind)) => {
                debug!(kind = %kind, "unsupported payload type, skipping");
                bump(&mut self.stats.unsupported);
                return Outcome::Unsupported;
            }
            Err(e) => {
                warn!(error = %e, "malformed payload dropped");
                bump(&mut self.stats.malformed);
                return Outcome::Malformed;
            }
        };

        match DedupKey::for_event(&event) {
            Ok(Some(key)) => {
                if self.dedup.seen_key(&key, now) {
                    debug!(kind = key.kind.as_str(), key = %key.key, "duplicate event skipped");
                    bump(&mut self.stats.duplicates);
                    return Outcome::Duplicate;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "malformed payload dropped");
                bump(&mut self.stats.malformed);
                return Outcome::Malformed;
            }
        }

        let built = match &event {
            Event::GymUpdate(update) => return self.handle_gym_update(update),
            Event::Spawn(spawn) => record::spawn_record(spawn, &self.reference).map(Record::Spawn),
            Event::Raid(raid) => {
                let gym = self.roster.gym(&raid.gym_id);
                record::raid_record(raid, &self.reference, gym).map(Record::Raid)
            }
        };
        match built {
            Ok(record) => self.route(record),
            Err(e) => {
                warn!(error = %e, "could not build record, dropping event");
                bump(&mut self.stats.malformed);
                Outcome::Malformed
            }
        }
    }

    fn handle_gym_update(&mut self, update: &GymUpdateEvent) -> Outcome {
        let transitions = self.roster.observe(update);
        if transitions.is_empty() {
            return Outcome::RosterUpdated { joins: 0 };
        }

        let targets: BTreeSet<TargetId> = self.config.gym_targets().cloned().collect();
        if targets.is_empty() {
            debug!(gym_id = %update.gym_id, "no gym targets configured, joins not delivered");
            return Outcome::RosterUpdated { joins: 0 };
        }

        let mut joins = 0_usize;
        for transition in transitions {
            let notification = Notification {
                targets: targets.clone(),
                payload: NotificationPayload::GymJoin(transition),
            };
            if self.hand_off(notification) {
                joins = joins.saturating_add(1);
            }
        }
        Outcome::RosterUpdated { joins }
    }

    fn route(&mut self, mut record: Record) -> Outcome {
        let ctx = MatchContext {
            reference: &self.reference,
            geofences: &self.geofences,
        };

        let mut targets = BTreeSet::new();
        let mut derived = Vec::new();
        for (rule_id, rule) in &self.config.rules {
            if !rule.scope.covers(record.kind()) {
                continue;
            }
            let evaluation = rule_engine::evaluate(&record, rule, &ctx);
            if !evaluation.matched {
                debug!(
                    rule = %rule_id,
                    record = record.label(),
                    failed = evaluation.failed.unwrap_or("unknown"),
                    "rule did not match"
                );
                continue;
            }
            info!(
                rule = %rule_id,
                record = record.label(),
                kind = record.kind().as_str(),
                satisfied = ?evaluation.satisfied,
                "rule matched"
            );
            derived.extend(evaluation.derived);
            targets.extend(
                self.config
                    .routes_for(rule_id)
                    .iter()
                    .filter(|t| self.config.is_enabled(t))
                    .cloned(),
            );
        }

        if targets.is_empty() {
            bump(&mut self.stats.unmatched);
            return Outcome::Unmatched;
        }

        record.add_derived(derived);
        let count = targets.len();
        let payload = match record {
            Record::Spawn(spawn) => NotificationPayload::Spawn(spawn),
            Record::Raid(raid) => NotificationPayload::Raid(raid),
        };
        if self.hand_off(Notification { targets, payload }) {
            Outcome::Dispatched { targets: count }
        } else {
            Outcome::Undelivered
        }
    }

    /// Give a notification to delivery. Failures are logged and counted only.
    fn hand_off(&mut self, notification: Notification) -> bool {
        let kind = notification.payload.kind();
        let targets = notification.targets.len();
        match self.delivery.deliver(notification) {
            Ok(()) => {
                debug!(kind, targets, "notification handed to delivery");
                bump(&mut self.stats.dispatched);
                true
            }
            Err(e) => {
                warn!(kind, targets, error = %e, "delivery refused notification, dropping");
                bump(&mut self.stats.delivery_failures);
                false
            }
        }
    }

    /// Drop dedup entries expired at `now`.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let removed = self.dedup.sweep(now);
        self.stats.swept = self
            .stats
            .swept
            .saturating_add(u64::try_from(removed).unwrap_or(u64::MAX));
        debug!(removed, remaining = self.dedup.len(), "dedup cache swept");
        removed
    }

    /// Consume the ingest queue until every producer is gone, sweeping the
    /// dedup cache every configured interval. Returns the final counters.
    pub async fn run(&mut self, mut ingest: IngestReceiver) -> DispatchStats {
        let mut sweep = tokio::time::interval(self.config.settings.sweep_interval());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        sweep.tick().await;

        info!(
            sweep_interval_secs = self.config.settings.sweep_interval_secs,
            "dispatcher started"
        );

        loop {
            tokio::select! {
                payload = ingest.recv() => {
                    let Some(payload) = payload else {
                        break;
                    };
                    self.handle(payload, Utc::now());
                }
                _ = sweep.tick() => {
                    self.sweep(Utc::now());
                }
            }
        }

        let s = self.stats;
        info!(
            received = s.received,
            malformed = s.malformed,
            unsupported = s.unsupported,
            duplicates = s.duplicates,
            unmatched = s.unmatched,
            dispatched = s.dispatched,
            delivery_failures = s.delivery_failures,
            swept = s.swept,
            "ingest queue closed, dispatcher stopped"
        );
        s
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::reference::BaseStats;

    const CONFIG: &str = r"
rules:
  strong:
    min_attack: 10
  in_town:
    min_attack: 14
    geofence: town
  legendary:
    scope: raid
    levels: [5]
  silent:
    min_iv: 0
routes:
  strong: [main, muted]
  in_town: [main, backup]
  legendary: [main]
targets:
  main: { gym: true }
  backup: {}
  muted: { enabled: false, gym: true }
geofences:
  town: [[0.0, 0.0], [0.0, 50.0], [50.0, 50.0], [50.0, 0.0]]
tracked_trainers: [ash]
";

    fn dispatcher() -> Dispatcher<Vec<Notification>> {
        let reference = ReferenceData::new().with_species(
            201,
            "Unown",
            BaseStats {
                attack: 136,
                defense: 91,
                stamina: 96,
            },
        );
        Dispatcher::new(
            NotifierConfig::parse(CONFIG).unwrap(),
            Arc::new(reference),
            Vec::new(),
        )
        .unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn spawn(id: &str, attack: u8) -> Value {
        json!({
            "type": "pokemon",
            "message": {
                "encounter_id": id, "pokemon_id": 201,
                "latitude": 10.0, "longitude": 20.0, "disappear_time": 1000,
                "individual_attack": attack, "individual_defense": 15,
                "individual_stamina": 15
            }
        })
    }

    fn gym(trainers: &[&str]) -> Value {
        let roster: Vec<Value> = trainers
            .iter()
            .map(|t| json!({ "trainer_name": t, "pokemon_id": 143 }))
            .collect();
        json!({
            "type": "gym_details",
            "message": {
                "id": "g1", "name": "Fountain", "latitude": 1.0,
                "longitude": 2.0, "team": 2, "pokemon": roster
            }
        })
    }

    fn targets(n: &Notification) -> Vec<&str> {
        n.targets.iter().map(TargetId::as_str).collect()
    }

    #[test]
    fn union_of_enabled_targets_each_once() {
        let mut d = dispatcher();
        assert_eq!(
            d.handle(spawn("abc", 15), at(0)),
            Outcome::Dispatched { targets: 2 }
        );
        let sent = d.delivery();
        assert_eq!(sent.len(), 1);
        assert_eq!(targets(sent.first().unwrap()), vec!["backup", "main"]);
    }

    #[test]
    fn rule_ids_routed_together_act_as_alternatives() {
        let mut d = dispatcher();
        // Only `strong` holds; `in_town` needs attack 14.
        assert_eq!(
            d.handle(spawn("weak", 10), at(0)),
            Outcome::Dispatched { targets: 1 }
        );
        assert_eq!(targets(d.delivery().first().unwrap()), vec!["main"]);
        assert_eq!(d.handle(spawn("none", 9), at(0)), Outcome::Unmatched);
    }

    #[test]
    fn numeric_encounter_id_is_dispatched() {
        let mut d = dispatcher();
        let mut payload = spawn("placeholder", 15);
        payload["message"]["encounter_id"] = json!(1_234_567_890_123_u64);
        assert_eq!(d.handle(payload.clone(), at(0)), Outcome::Dispatched { targets: 2 });
        assert_eq!(d.handle(payload, at(1)), Outcome::Duplicate);
    }

    #[test]
    fn duplicates_are_dropped_until_expiry() {
        let mut d = dispatcher();
        d.handle(spawn("abc", 15), at(0));
        assert_eq!(d.handle(spawn("abc", 15), at(10)), Outcome::Duplicate);
        assert_eq!(d.delivery().len(), 1);

        // Despawn at 1000: the key is reusable from then on.
        assert_eq!(
            d.handle(spawn("abc", 15), at(1_000)),
            Outcome::Dispatched { targets: 2 }
        );
        assert_eq!(d.stats().duplicates, 1);
    }

    #[test]
    fn matching_rule_without_route_delivers_nothing() {
        let mut d = dispatcher();
        assert_eq!(d.handle(spawn("weak", 3), at(0)), Outcome::Unmatched);
        assert!(d.delivery().is_empty());
    }

    #[test]
    fn malformed_payload_leaves_cache_untouched() {
        let mut d = dispatcher();
        let bad = json!({
            "type": "pokemon",
            "message": { "encounter_id": "abc", "pokemon_id": 201, "latitude": 95.0,
                         "longitude": 0.0, "disappear_time": 1000 }
        });
        assert_eq!(d.handle(bad, at(0)), Outcome::Malformed);
        assert!(d.dedup().is_empty());
        assert_eq!(
            d.handle(json!({ "type": "weather", "message": {} }), at(0)),
            Outcome::Unsupported
        );
        assert_eq!(d.stats().malformed, 1);
        assert_eq!(d.stats().unsupported, 1);
    }

    #[test]
    fn raid_matches_raid_scoped_rules_only() {
        let mut d = dispatcher();
        let egg = json!({
            "type": "raid",
            "message": { "gym_id": "g1", "start": 1000, "end": 4600, "level": 5,
                         "latitude": 10.0, "longitude": 20.0 }
        });
        assert_eq!(d.handle(egg, at(0)), Outcome::Dispatched { targets: 1 });
        let notification = d.delivery().first().unwrap();
        assert_eq!(notification.payload.kind(), "egg");
    }

    #[test]
    fn raid_record_picks_up_known_gym_name() {
        let mut d = dispatcher();
        d.handle(gym(&[]), at(0));
        let raid = json!({
            "type": "raid",
            "message": { "gym_id": "g1", "start": 1000, "end": 4600, "level": 5,
                         "pokemon_id": 201, "latitude": 10.0, "longitude": 20.0 }
        });
        d.handle(raid, at(0));
        match &d.delivery().first().unwrap().payload {
            NotificationPayload::Raid(r) => assert_eq!(r.gym_name.as_deref(), Some("Fountain")),
            other => panic!("Expected raid payload, got {other:?}"),
        }
    }

    #[test]
    fn gym_joins_go_to_enabled_gym_targets() {
        let mut d = dispatcher();
        assert_eq!(d.handle(gym(&["gary"]), at(0)), Outcome::RosterUpdated { joins: 0 });
        assert_eq!(
            d.handle(gym(&["gary", "ash"]), at(1)),
            Outcome::RosterUpdated { joins: 1 }
        );
        let sent = d.delivery().first().unwrap();
        assert_eq!(targets(sent), vec!["main"]);
        assert_eq!(sent.payload.kind(), "gym_join");

        // Gym updates are never deduplicated.
        assert_eq!(
            d.handle(gym(&["gary", "ash"]), at(2)),
            Outcome::RosterUpdated { joins: 0 }
        );
    }

    #[test]
    fn sweep_counts_removed_entries() {
        let mut d = dispatcher();
        d.handle(spawn("a", 15), at(0));
        d.handle(spawn("b", 15), at(0));
        assert_eq!(d.sweep(at(999)), 0);
        assert_eq!(d.sweep(at(1_000)), 2);
        assert_eq!(d.stats().swept, 2);
    }

    #[test]
    fn full_delivery_queue_is_counted_not_fatal() {
        let (queue, _rx) = crate::delivery::delivery_queue(1);
        let mut d = Dispatcher::new(
            NotifierConfig::parse(CONFIG).unwrap(),
            Arc::new(ReferenceData::new()),
            queue,
        )
        .unwrap();
        assert_eq!(
            d.handle(spawn("a", 15), at(0)),
            Outcome::Dispatched { targets: 2 }
        );
        assert_eq!(d.handle(spawn("b", 15), at(0)), Outcome::Undelivered);
        assert_eq!(d.stats().delivery_failures, 1);
    }
}
