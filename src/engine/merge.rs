use super::normalize::{MarketKey, MarketQuote};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Median price for one (event, market, selection) across every bookmaker
/// that quoted it in the current tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedQuote {
    pub event_id: String,
    pub market: MarketKey,
    pub selection: String,
    pub price: f64,
    /// Source tags that contributed, sorted.
    pub sources: Vec<String>,
    /// Number of bookmaker prices the median was taken over.
    pub contributors: usize,
    pub observed_at: DateTime<Utc>,
}

/// Unified prices of one (event, market), keyed by selection.
pub type UnifiedMarket = BTreeMap<String, UnifiedQuote>;

/// Median with lower-middle tie-break for even lengths. Non-finite values are ignored.
pub fn median(prices: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = prices.iter().copied().filter(|p| p.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    Some(sorted[(sorted.len() - 1) / 2])
}

/// Merge quotes for a single (event, market, selection). Each (source,
/// bookmaker) pair counts once; a repeated pair keeps its latest observation.
/// Pure: the same input always yields the same output.
pub fn merge(quotes: &[MarketQuote]) -> Option<UnifiedQuote> {
    let first = quotes.first()?;

    let mut latest: BTreeMap<(&str, &str), &MarketQuote> = BTreeMap::new();
    for q in quotes {
        let key = (q.source.as_str(), q.bookmaker.as_str());
        let newer = latest.get(&key).map_or(true, |prev| q.observed_at >= prev.observed_at);
        if newer {
            latest.insert(key, q);
        }
    }

    let prices: Vec<f64> = latest.values().map(|q| q.price).collect();
    let price = median(&prices)?;
    let sources: BTreeSet<&str> = latest.keys().map(|(source, _)| *source).collect();
    let observed_at = latest.values().map(|q| q.observed_at).max().unwrap_or(first.observed_at);

    Some(UnifiedQuote {
        event_id: first.event_id.clone(),
        market: first.market,
        selection: first.selection.clone(),
        price,
        sources: sources.into_iter().map(str::to_string).collect(),
        contributors: prices.len(),
        observed_at,
    })
}

/// Group a whole tick by (event, market) and merge every selection.
pub fn unify(quotes: &[MarketQuote]) -> BTreeMap<(String, MarketKey), UnifiedMarket> {
    let mut grouped: BTreeMap<(String, MarketKey), BTreeMap<String, Vec<MarketQuote>>> = BTreeMap::new();
    for q in quotes {
        grouped
            .entry((q.event_id.clone(), q.market))
            .or_default()
            .entry(q.selection.clone())
            .or_default()
            .push(q.clone());
    }

    grouped
        .into_iter()
        .map(|(key, selections)| {
            let unified: UnifiedMarket = selections
                .into_iter()
                .filter_map(|(selection, qs)| merge(&qs).map(|u| (selection, u)))
                .collect();
            (key, unified)
        })
        .filter(|(_, unified)| !unified.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn quote(source: &str, bookmaker: &str, selection: &str, price: f64) -> MarketQuote {
        MarketQuote {
            event_id: "ARSENAL-CHELSEA".to_string(),
            market: MarketKey::MatchResult,
            selection: selection.to_string(),
            price,
            source: source.to_string(),
            bookmaker: bookmaker.to_string(),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_median_odd_length() {
        assert_eq!(median(&[2.10, 1.90, 1.95]), Some(1.95));
    }

    #[test]
    fn test_median_even_length_takes_lower_middle() {
        assert_eq!(median(&[2.00, 1.80]), Some(1.80));
        assert_eq!(median(&[2.4, 2.0, 2.2, 2.6]), Some(2.2));
    }

    #[test]
    fn test_median_empty_and_non_finite() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[f64::NAN]), None);
        assert_eq!(median(&[f64::NAN, 1.9]), Some(1.9));
    }

    #[test]
    fn test_merge_examples() {
        let qs = vec![
            quote("theoddsapi", "bet365", "1", 1.90),
            quote("theoddsapi", "pinnacle", "1", 1.95),
            quote("stoiximan", "betano", "1", 2.10),
        ];
        let u = merge(&qs).unwrap();
        assert_eq!(u.price, 1.95);
        assert_eq!(u.contributors, 3);
        assert_eq!(u.sources, vec!["stoiximan", "theoddsapi"]);

        let qs = vec![quote("a", "bet365", "1", 1.80), quote("b", "opap", "1", 2.00)];
        assert_eq!(merge(&qs).unwrap().price, 1.80);
    }

    #[test]
    fn test_merge_single_source_used_as_is() {
        let u = merge(&[quote("opap", "opap", "X", 3.4)]).unwrap();
        assert_eq!(u.price, 3.4);
        assert_eq!(u.contributors, 1);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let qs = vec![
            quote("a", "bet365", "1", 1.90),
            quote("b", "pinnacle", "1", 1.97),
            quote("c", "opap", "1", 1.85),
            quote("d", "betano", "1", 2.05),
        ];
        assert_eq!(merge(&qs), merge(&qs));
    }

    #[test]
    fn test_merge_repeated_bookmaker_keeps_latest() {
        let mut old = quote("a", "bet365", "1", 1.50);
        old.observed_at = Utc::now() - Duration::seconds(30);
        let new = quote("a", "bet365", "1", 1.90);
        let u = merge(&[old, new]).unwrap();
        assert_eq!(u.price, 1.90);
        assert_eq!(u.contributors, 1);
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge(&[]).is_none());
    }

    #[test]
    fn test_unify_groups_by_event_and_market() {
        let mut totals = quote("a", "bet365", "+2.5", 1.95);
        totals.market = MarketKey::Totals(250);
        let qs = vec![
            quote("a", "bet365", "1", 1.90),
            quote("b", "opap", "1", 2.00),
            quote("a", "bet365", "X", 3.50),
            totals,
        ];
        let unified = unify(&qs);
        assert_eq!(unified.len(), 2);
        let result = &unified[&("ARSENAL-CHELSEA".to_string(), MarketKey::MatchResult)];
        assert_eq!(result.len(), 2);
        assert_eq!(result["1"].price, 1.90);
        assert_eq!(result["X"].price, 3.50);
        let ou = &unified[&("ARSENAL-CHELSEA".to_string(), MarketKey::Totals(250))];
        assert_eq!(ou["+2.5"].price, 1.95);
    }
}
