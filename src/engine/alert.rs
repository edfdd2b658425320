use super::normalize::MarketKey;
use super::snapshot::SnapshotDelta;
use crate::config::{AlertConfig, Baseline};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Price lengthened (outcome judged less likely).
    Up,
    /// Price shortened (steam).
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// A price movement that crossed the alert threshold. Immutable once created;
/// `id` and `read` are owned by the alert log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: u64,
    pub event_id: String,
    pub market: MarketKey,
    pub selection: String,
    /// Baseline price the movement is measured from (opening or previous tick).
    pub opening_price: f64,
    pub current_price: f64,
    pub movement_pct: f64,
    pub direction: Direction,
    pub sources: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Alert {
    pub fn message(&self) -> String {
        format!(
            "{} {} {}: {:.2} -> {:.2} ({:+.2}%)",
            self.event_id,
            self.market,
            self.selection,
            self.opening_price,
            self.current_price,
            self.movement_pct * 100.0,
        )
    }
}

/// `(current - opening) / opening`
pub fn movement_pct(opening: f64, current: f64) -> f64 {
    (current - opening) / opening
}

/// Compare every selection priced in this tick against its baseline and emit
/// an alert iff `|movement| >= threshold`. With `steam_only` set, lengthening
/// prices never alert. Against the opening baseline, a selection that already
/// alerted only alerts again once it has moved a further `threshold` from the
/// movement it last alerted at.
pub fn evaluate(delta: &SnapshotDelta, config: &AlertConfig) -> Vec<Alert> {
    let baseline = match config.baseline {
        Baseline::Opening => &delta.opening,
        Baseline::PreviousTick => &delta.previous,
    };

    let mut alerts = Vec::new();
    for selection in &delta.updated {
        let (Some(&base), Some(&current)) = (baseline.get(selection), delta.current.get(selection)) else {
            continue;
        };
        if !(base.is_finite() && base > 0.0 && current.is_finite()) {
            continue;
        }

        let movement = movement_pct(base, current);
        if movement.abs() < config.threshold {
            continue;
        }
        if config.baseline == Baseline::Opening
            && delta
                .alerted
                .get(selection)
                .is_some_and(|last| (movement - last).abs() < config.threshold)
        {
            continue;
        }
        let direction = if movement < 0.0 { Direction::Down } else { Direction::Up };
        if config.steam_only && direction == Direction::Up {
            continue;
        }

        alerts.push(Alert {
            id: 0,
            event_id: delta.key.event_id.clone(),
            market: delta.key.market,
            selection: selection.clone(),
            opening_price: base,
            current_price: current,
            movement_pct: movement,
            direction,
            sources: delta.sources.clone(),
            created_at: delta.observed_at,
            read: false,
        });
    }
    alerts
}
