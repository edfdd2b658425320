use super::alert::{movement_pct, Alert, Direction};
use super::normalize::MarketKey;
use super::snapshot::{PriceMap, SnapshotKey, SnapshotStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

pub const DEFAULT_ALERT_LIMIT: usize = 200;
pub const MAX_ALERT_LIMIT: usize = 1000;
pub const REPLACED_LOG_CAPACITY: usize = 200;

/// Query over the alert history. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub event_id: Option<String>,
    pub market: Option<MarketKey>,
    pub direction: Option<Direction>,
    pub unread_only: bool,
    /// Only alerts with an id strictly greater than this.
    pub since_id: Option<u64>,
    /// Clamped to 1..=1000; None means 200.
    pub limit: Option<usize>,
}

impl AlertFilter {
    fn matches(&self, alert: &Alert) -> bool {
        self.event_id.as_deref().map_or(true, |e| alert.event_id == e)
            && self.market.map_or(true, |m| alert.market == m)
            && self.direction.map_or(true, |d| alert.direction == d)
            && (!self.unread_only || !alert.read)
            && self.since_id.map_or(true, |id| alert.id > id)
    }

    fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_ALERT_LIMIT).clamp(1, MAX_ALERT_LIMIT)
    }
}

struct AlertLogInner {
    alerts: VecDeque<Alert>,
    next_id: u64,
}

/// In-memory alert history, bounded; the oldest alerts fall off first.
pub struct AlertLog {
    inner: Mutex<AlertLogInner>,
    capacity: usize,
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(AlertLogInner {
                alerts: VecDeque::with_capacity(capacity.min(1024)),
                next_id: 1,
            }),
            capacity: capacity.max(1),
        }
    }

    // Every mutation leaves the deque consistent, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, AlertLogInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Assign ids and append. Returns the stored alerts.
    pub fn push(&self, alerts: Vec<Alert>) -> Vec<Alert> {
        let mut inner = self.lock();
        let mut stored = Vec::with_capacity(alerts.len());
        for mut alert in alerts {
            alert.id = inner.next_id;
            alert.read = false;
            inner.next_id += 1;
            if inner.alerts.len() >= self.capacity {
                inner.alerts.pop_front();
            }
            inner.alerts.push_back(alert.clone());
            stored.push(alert);
        }
        stored
    }

    pub fn list(&self, filter: &AlertFilter) -> Vec<Alert> {
        let inner = self.lock();
        inner
            .alerts
            .iter()
            .rev()
            .filter(|a| filter.matches(a))
            .take(filter.effective_limit())
            .cloned()
            .collect()
    }

    pub fn mark_read(&self, ids: &[u64]) -> usize {
        let ids: HashSet<u64> = ids.iter().copied().collect();
        let mut inner = self.lock();
        let mut changed = 0;
        for alert in inner.alerts.iter_mut().filter(|a| ids.contains(&a.id) && !a.read) {
            alert.read = true;
            changed += 1;
        }
        changed
    }

    pub fn mark_all_read(&self) -> usize {
        let mut inner = self.lock();
        let mut changed = 0;
        for alert in inner.alerts.iter_mut().filter(|a| !a.read) {
            alert.read = true;
            changed += 1;
        }
        changed
    }

    /// Drop the whole history. Ids keep increasing afterwards.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let n = inner.alerts.len();
        inner.alerts.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.lock().alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn unread_count(&self) -> usize {
        let inner = self.lock();
        inner.alerts.iter().filter(|a| !a.read).count()
    }

    /// The biggest mover of each (event, market), ranked by `|movement|`
    /// descending, most recent first on ties.
    pub fn top_movers(&self, limit: usize) -> Vec<Alert> {
        self.top_movers_where(limit, |_| true)
    }

    /// [`AlertLog::top_movers`] over the alerts for which `keep` holds.
    pub fn top_movers_where(&self, limit: usize, keep: impl Fn(&Alert) -> bool) -> Vec<Alert> {
        let inner = self.lock();
        let mut best: HashMap<(&str, MarketKey), &Alert> = HashMap::new();
        for alert in inner.alerts.iter().filter(|a| keep(a)) {
            let key = (alert.event_id.as_str(), alert.market);
            let replace = best.get(&key).map_or(true, |cur| ranks_before(
                alert.movement_pct.abs(),
                alert.created_at,
                cur.movement_pct.abs(),
                cur.created_at,
            ));
            if replace {
                best.insert(key, alert);
            }
        }
        let mut ranked: Vec<Alert> = best.into_values().cloned().collect();
        ranked.sort_by(|a, b| rank_order(
            a.movement_pct.abs(),
            a.created_at,
            b.movement_pct.abs(),
            b.created_at,
        ).then_with(|| b.id.cmp(&a.id)));
        ranked.truncate(limit);
        ranked
    }
}

fn rank_order(
    a_move: f64,
    a_at: DateTime<Utc>,
    b_move: f64,
    b_at: DateTime<Utc>,
) -> std::cmp::Ordering {
    b_move.total_cmp(&a_move).then_with(|| b_at.cmp(&a_at))
}

fn ranks_before(a_move: f64, a_at: DateTime<Utc>, b_move: f64, b_at: DateTime<Utc>) -> bool {
    rank_order(a_move, a_at, b_move, b_at) != std::cmp::Ordering::Greater
}

/// Movement summary of one tracked market against its opening prices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketMovement {
    pub key: SnapshotKey,
    /// Selection with the largest absolute movement.
    pub selection: String,
    pub movement_pct: f64,
    pub updated_at: DateTime<Utc>,
    /// 1X2 markets only.
    pub money_flow: Option<f64>,
    pub movement_label: Option<String>,
}

const MATCH_RESULT_LEGS: [(&str, &str); 3] = [("1", "Home"), ("X", "Draw"), ("2", "Away")];

fn implied_1x2(prices: &PriceMap) -> Option<[f64; 3]> {
    let mut implied = [0.0; 3];
    for (slot, (selection, _)) in implied.iter_mut().zip(MATCH_RESULT_LEGS) {
        let price = *prices.get(selection)?;
        *slot = if price > 1.0 { 1.0 / price } else { 0.0 };
    }
    let total: f64 = implied.iter().sum();
    if total > 0.0 {
        implied.iter_mut().for_each(|p| *p /= total);
    }
    Some(implied)
}

/// Money-flow index of a 1X2 market, 0..=100 to one decimal: the mean absolute
/// shift of the margin-free implied probabilities since opening, scaled by 350.
pub fn money_flow(opening: &PriceMap, current: &PriceMap) -> Option<f64> {
    let start = implied_1x2(opening)?;
    let now = implied_1x2(current)?;
    let shift = start.iter().zip(now).map(|(a, b)| (b - a).abs()).sum::<f64>() / 3.0;
    let index = (100.0 * shift * 3.5).min(100.0);
    Some((index * 10.0).round() / 10.0)
}

/// Which 1X2 leg moved most since opening, e.g. `Home↑` when the home price
/// shortened (money came in) or `Away↓` when the away price drifted.
pub fn movement_label(opening: &PriceMap, current: &PriceMap) -> Option<String> {
    let mut best: Option<(&str, f64)> = None;
    for (selection, name) in MATCH_RESULT_LEGS {
        let delta = opening.get(selection)? - current.get(selection)?;
        if best.map_or(true, |(_, d)| delta.abs() > d.abs()) {
            best = Some((name, delta));
        }
    }
    best.map(|(name, delta)| format!("{}{}", name, if delta > 0.0 { "↑" } else { "↓" }))
}

/// Rank every tracked market by the largest `|movement|` among its
/// selections, ties broken by most recent update. With `started_by` set,
/// markets of events that kicked off by then are left out.
pub fn rank_markets(store: &SnapshotStore, limit: usize, started_by: Option<DateTime<Utc>>) -> Vec<MarketMovement> {
    let mut ranked: Vec<MarketMovement> = store
        .keys()
        .into_iter()
        .filter(|key| match started_by {
            Some(now) => !store.event(&key.event_id).is_some_and(|e| e.has_started(now)),
            None => true,
        })
        .filter_map(|key| {
            let snap = store.get(&key)?;
            let (selection, movement) = snap
                .current
                .iter()
                .filter_map(|(sel, &cur)| {
                    let open = *snap.opening.get(sel)?;
                    (open > 0.0).then(|| (sel.clone(), movement_pct(open, cur)))
                })
                .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))?;
            let (money_flow, movement_label) = match key.market {
                MarketKey::MatchResult => (
                    money_flow(&snap.opening, &snap.current),
                    movement_label(&snap.opening, &snap.current),
                ),
                _ => (None, None),
            };
            Some(MarketMovement {
                key,
                selection,
                movement_pct: movement,
                updated_at: snap.updated_at,
                money_flow,
                movement_label,
            })
        })
        .collect();
    ranked.sort_by(|a, b| rank_order(a.movement_pct.abs(), a.updated_at, b.movement_pct.abs(), b.updated_at));
    ranked.truncate(limit);
    ranked
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplacedEntry {
    pub key: SnapshotKey,
    pub replaced_at: DateTime<Utc>,
}

/// Remembers the current top-N markets and logs the ones that drop out.
#[derive(Debug, Default)]
pub struct TopMarketsTracker {
    current: Vec<MarketMovement>,
    replaced: VecDeque<ReplacedEntry>,
}

impl TopMarketsTracker {
    /// Install a new top-N set. Returns the keys that left the set.
    pub fn observe(&mut self, top: Vec<MarketMovement>, at: DateTime<Utc>) -> Vec<SnapshotKey> {
        let now: HashSet<&SnapshotKey> = top.iter().map(|m| &m.key).collect();
        let dropped: Vec<SnapshotKey> = self
            .current
            .iter()
            .filter(|m| !now.contains(&m.key))
            .map(|m| m.key.clone())
            .collect();
        for key in &dropped {
            if self.replaced.len() >= REPLACED_LOG_CAPACITY {
                self.replaced.pop_front();
            }
            self.replaced.push_back(ReplacedEntry { key: key.clone(), replaced_at: at });
        }
        self.current = top;
        dropped
    }

    pub fn current(&self) -> &[MarketMovement] {
        &self.current
    }

    pub fn replaced(&self) -> Vec<ReplacedEntry> {
        self.replaced.iter().cloned().collect()
    }
}
