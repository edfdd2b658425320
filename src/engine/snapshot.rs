use super::merge::UnifiedMarket;
use super::normalize::{Event, MarketKey, MarketQuote};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

/// Selection -> decimal price.
pub type PriceMap = BTreeMap<String, f64>;

#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize)]
pub struct SnapshotKey {
    pub event_id: String,
    pub market: MarketKey,
}

impl SnapshotKey {
    pub fn new(event_id: impl Into<String>, market: MarketKey) -> Self {
        Self {
            event_id: event_id.into(),
            market,
        }
    }
}

/// Opening and current prices of one (event, market).
///
/// A selection's opening price is written on its first observation and never
/// changes afterwards except through [`SnapshotStore::reset`]. `current` keeps
/// the last known price of every selection ever seen, so a selection missing
/// from a tick stays at its previous value.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub opening: PriceMap,
    pub current: PriceMap,
    /// `current` as it was before the latest update.
    pub previous: PriceMap,
    pub unified: UnifiedMarket,
    pub sources: Vec<String>,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Movement (vs opening) at which each selection last alerted.
    #[serde(skip)]
    alerted: PriceMap,
    #[serde(skip)]
    refreshed: Instant,
}

/// What one update changed, handed to the alert engine.
#[derive(Debug, Clone)]
pub struct SnapshotDelta {
    pub key: SnapshotKey,
    pub opening: PriceMap,
    pub previous: PriceMap,
    pub current: PriceMap,
    /// Selections priced in this tick.
    pub updated: Vec<String>,
    pub sources: Vec<String>,
    pub first_seen: bool,
    pub observed_at: DateTime<Utc>,
    /// Movement at the last alert per selection, cleared on reset.
    pub alerted: PriceMap,
}

/// Matches of the same pairing further apart than this are distinct fixtures.
const REMATCH_GAP_HOURS: i64 = 24;

#[derive(Default)]
pub struct SnapshotStore {
    snapshots: DashMap<SnapshotKey, Snapshot>,
    events: DashMap<String, Event>,
    /// event_id -> every normalized quote for that event from the last tick
    source_quotes: DashMap<String, Vec<MarketQuote>>,
}

fn sources_of(unified: &UnifiedMarket) -> Vec<String> {
    let mut sources: Vec<String> = unified.values().flat_map(|u| u.sources.iter().cloned()).collect();
    sources.sort();
    sources.dedup();
    sources
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event on first sight. Later sightings never modify it, unless
    /// both carry start times more than a day apart: that is a rematch, which
    /// replaces the event and drops every market tracked for the old fixture.
    /// Returns true when the event was inserted or replaced.
    pub fn register_event(&self, event: Event) -> bool {
        let event_id = event.event_id.clone();
        let rematch = match self.events.entry(event_id.clone()) {
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(event);
                return true;
            }
            dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                let rematch = match (slot.get().commence_time, event.commence_time) {
                    (Some(old), Some(new)) => (new - old).num_hours().abs() > REMATCH_GAP_HOURS,
                    _ => false,
                };
                if rematch {
                    slot.insert(event);
                }
                rematch
            }
        };
        if rematch {
            self.snapshots.retain(|k, _| k.event_id != event_id);
            self.source_quotes.remove(&event_id);
        }
        rematch
    }

    pub fn event(&self, event_id: &str) -> Option<Event> {
        self.events.get(event_id).map(|e| e.clone())
    }

    pub fn events(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.events.iter().map(|e| e.value().clone()).collect();
        events.sort_by(|a, b| a.event_id.cmp(&b.event_id));
        events
    }

    /// Replace the per-source quotes kept for an event with this tick's.
    pub fn record_source_quotes(&self, event_id: &str, quotes: Vec<MarketQuote>) {
        self.source_quotes.insert(event_id.to_string(), quotes);
    }

    pub fn source_quotes(&self, event_id: &str) -> Vec<MarketQuote> {
        self.source_quotes.get(event_id).map(|q| q.clone()).unwrap_or_default()
    }

    /// Apply one tick of unified prices. An empty tick leaves the snapshot
    /// untouched and returns None. The entry lock is held for the whole
    /// update, so concurrent writers to one key serialize.
    pub fn update(&self, event_id: &str, market: MarketKey, unified: &UnifiedMarket) -> Option<SnapshotDelta> {
        if unified.is_empty() {
            return None;
        }
        let key = SnapshotKey::new(event_id, market);
        let observed_at = unified.values().map(|u| u.observed_at).max().unwrap_or_else(Utc::now);
        let incoming: PriceMap = unified.iter().map(|(sel, u)| (sel.clone(), u.price)).collect();
        let sources = sources_of(unified);

        let mut entry = self.snapshots.entry(key.clone()).or_insert_with(|| Snapshot {
            opening: PriceMap::new(),
            current: PriceMap::new(),
            previous: PriceMap::new(),
            unified: UnifiedMarket::new(),
            sources: Vec::new(),
            opened_at: observed_at,
            updated_at: observed_at,
            alerted: PriceMap::new(),
            refreshed: Instant::now(),
        });
        let snap = entry.value_mut();
        let first_seen = snap.opening.is_empty();

        for (selection, price) in &incoming {
            snap.opening.entry(selection.clone()).or_insert(*price);
        }
        snap.previous = snap.current.clone();
        snap.current.extend(incoming.iter().map(|(s, p)| (s.clone(), *p)));
        snap.unified.extend(unified.iter().map(|(s, u)| (s.clone(), u.clone())));
        snap.sources = sources.clone();
        snap.updated_at = observed_at;
        snap.refreshed = Instant::now();

        Some(SnapshotDelta {
            key,
            opening: snap.opening.clone(),
            previous: snap.previous.clone(),
            current: snap.current.clone(),
            updated: incoming.into_keys().collect(),
            sources,
            first_seen,
            observed_at,
            alerted: snap.alerted.clone(),
        })
    }

    /// Remember the movement at which `selection` alerted.
    pub fn mark_alerted(&self, key: &SnapshotKey, selection: &str, movement: f64) {
        if let Some(mut snap) = self.snapshots.get_mut(key) {
            snap.alerted.insert(selection.to_string(), movement);
        }
    }

    /// Drop events that kicked off more than `kickoff_grace` before `now`
    /// along with their markets, then markets not refreshed within
    /// `stale_after` (zero keeps them). Events left without markets go too.
    /// Returns the number of markets removed.
    pub fn evict(&self, now: DateTime<Utc>, kickoff_grace: chrono::Duration, stale_after: Duration) -> usize {
        let before = self.snapshots.len();
        let finished: Vec<String> = self
            .events
            .iter()
            .filter(|e| {
                e.commence_time
                    .and_then(|t| t.checked_add_signed(kickoff_grace))
                    .is_some_and(|end| end < now)
            })
            .map(|e| e.key().clone())
            .collect();
        for event_id in &finished {
            self.events.remove(event_id);
            self.source_quotes.remove(event_id);
        }
        self.snapshots.retain(|k, s| {
            !finished.contains(&k.event_id) && (stale_after.is_zero() || s.refreshed.elapsed() < stale_after)
        });
        let removed = before.saturating_sub(self.snapshots.len());
        if removed > 0 {
            let live: std::collections::HashSet<String> =
                self.snapshots.iter().map(|e| e.key().event_id.clone()).collect();
            self.events.retain(|id, _| live.contains(id));
            self.source_quotes.retain(|id, _| live.contains(id));
        }
        removed
    }

    pub fn get(&self, key: &SnapshotKey) -> Option<Snapshot> {
        self.snapshots.get(key).map(|s| s.clone())
    }

    pub fn for_event(&self, event_id: &str) -> Vec<(MarketKey, Snapshot)> {
        let mut markets: Vec<(MarketKey, Snapshot)> = self
            .snapshots
            .iter()
            .filter(|e| e.key().event_id == event_id)
            .map(|e| (e.key().market, e.value().clone()))
            .collect();
        markets.sort_by_key(|(market, _)| *market);
        markets
    }

    pub fn keys(&self) -> Vec<SnapshotKey> {
        let mut keys: Vec<SnapshotKey> = self.snapshots.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn is_fresh(&self, key: &SnapshotKey, ttl: Duration) -> bool {
        self.snapshots
            .get(key)
            .is_some_and(|s| s.refreshed.elapsed() < ttl)
    }

    /// True when at least one market is tracked and every tracked market is
    /// within the TTL.
    pub fn all_fresh(&self, ttl: Duration) -> bool {
        !self.snapshots.is_empty() && self.snapshots.iter().all(|s| s.refreshed.elapsed() < ttl)
    }

    /// Re-baseline a market: its opening becomes the current prices.
    pub fn reset(&self, key: &SnapshotKey) -> bool {
        match self.snapshots.get_mut(key) {
            Some(mut snap) => {
                snap.opening = snap.current.clone();
                snap.opened_at = Utc::now();
                snap.alerted.clear();
                true
            }
            None => false,
        }
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.snapshots.iter().map(|s| s.updated_at).max()
    }

    pub fn clear(&self) {
        self.snapshots.clear();
        self.events.clear();
        self.source_quotes.clear();
    }
}
