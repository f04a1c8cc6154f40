//! Time-bounded deduplication of repeated event reports.
//!
//! Scanners report the same spawn or raid many times. [`DedupCache`] keeps
//! one key space per [`DedupKind`] mapping an event key to the instant after
//! which it may be processed again.
//!
//! An entry is expired once `expires_at <= now`: the exact expiry instant
//! already counts as expired. Lookups honour expiry on their own, so the
//! periodic [`DedupCache::sweep`] only bounds memory and never changes a
//! verdict.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use notifier_types::{Event, EventError};

/// Independent dedup key spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DedupKind {
    /// Keyed by encounter id.
    Spawn,
    /// Keyed by gym id + start timestamp.
    Raid,
    /// Keyed by gym id + start timestamp.
    Egg,
}

impl DedupKind {
    /// Label used in log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spawn => "spawn",
            Self::Raid => "raid",
            Self::Egg => "egg",
        }
    }
}

/// The dedup identity of one event plus the instant it stops mattering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupKey {
    /// Key space.
    pub kind: DedupKind,
    /// Key within the space.
    pub key: String,
    /// When the key may be reused.
    pub expires_at: DateTime<Utc>,
}

impl DedupKey {
    /// Derive the dedup key of an event. Gym updates are never deduplicated.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InvalidTimestamp`] if the event's expiry is not
    /// representable. Validated events never fail here.
    pub fn for_event(event: &Event) -> Result<Option<Self>, EventError> {
        let key = match event {
            Event::Spawn(spawn) => Self {
                kind: DedupKind::Spawn,
                key: spawn.encounter_id.as_str().to_owned(),
                expires_at: spawn.disappears_at()?,
            },
            Event::Raid(raid) => Self {
                kind: if raid.is_egg() {
                    DedupKind::Egg
                } else {
                    DedupKind::Raid
                },
                key: format!("{}{}", raid.gym_id, raid.start),
                expires_at: raid.ends_at()?,
            },
            Event::GymUpdate(_) => return Ok(None),
        };
        Ok(Some(key))
    }
}

/// Per-kind key → expiry maps.
#[derive(Debug, Clone, Default)]
pub struct DedupCache {
    spawns: HashMap<String, DateTime<Utc>>,
    raids: HashMap<String, DateTime<Utc>>,
    eggs: HashMap<String, DateTime<Utc>>,
}

impl DedupCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    const fn space(&self, kind: DedupKind) -> &HashMap<String, DateTime<Utc>> {
        match kind {
            DedupKind::Spawn => &self.spawns,
            DedupKind::Raid => &self.raids,
            DedupKind::Egg => &self.eggs,
        }
    }

    const fn space_mut(&mut self, kind: DedupKind) -> &mut HashMap<String, DateTime<Utc>> {
        match kind {
            DedupKind::Spawn => &mut self.spawns,
            DedupKind::Raid => &mut self.raids,
            DedupKind::Egg => &mut self.eggs,
        }
    }

    /// Insert-if-absent.
    ///
    /// Returns `true` (and changes nothing) if `key` is present and not yet
    /// expired at `now`. Otherwise records `key` with `expires_at` and
    /// returns `false`, meaning the caller should process the event.
    pub fn seen(
        &mut self,
        kind: DedupKind,
        key: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        let space = self.space_mut(kind);
        if let Some(&recorded) = space.get(key)
            && recorded > now
        {
            return true;
        }
        space.insert(key.to_owned(), expires_at);
        false
    }

    /// [`DedupCache::seen`] for a derived [`DedupKey`].
    pub fn seen_key(&mut self, key: &DedupKey, now: DateTime<Utc>) -> bool {
        self.seen(key.kind, &key.key, key.expires_at, now)
    }

    /// Remove every entry expired at `now`. Returns how many were removed.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        [&mut self.spawns, &mut self.raids, &mut self.eggs]
            .into_iter()
            .map(|space| {
                let before = space.len();
                space.retain(|_, expires_at| *expires_at > now);
                before.saturating_sub(space.len())
            })
            .sum()
    }

    /// Whether `key` is currently recorded (expired or not) in a key space.
    pub fn contains(&self, kind: DedupKind, key: &str) -> bool {
        self.space(kind).contains_key(key)
    }

    /// Total entries across all key spaces.
    pub fn len(&self) -> usize {
        self.spawns
            .len()
            .saturating_add(self.raids.len())
            .saturating_add(self.eggs.len())
    }

    /// Whether all key spaces are empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
