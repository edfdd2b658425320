use crate::feed::types::{RawPrice, RawQuote};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Canonical market. Totals lines are stored in hundredths of a goal so the
/// key stays hashable (2.5 -> 250, 2.25 -> 225).
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize)]
pub enum MarketKey {
    MatchResult,
    Totals(i32),
}

impl MarketKey {
    pub fn totals(line: f64) -> Option<Self> {
        if !line.is_finite() || line <= 0.0 || line > 20.0 {
            return None;
        }
        Some(MarketKey::Totals((line * 100.0).round() as i32))
    }

    pub fn line(&self) -> Option<f64> {
        match self {
            MarketKey::MatchResult => None,
            MarketKey::Totals(hundredths) => Some(*hundredths as f64 / 100.0),
        }
    }

    /// Canonical selection labels for a totals line: ("+2.5", "-2.5").
    pub fn over_under_labels(line: f64) -> (String, String) {
        (format!("+{}", line), format!("-{}", line))
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line() {
            None => write!(f, "1x2"),
            Some(line) => write!(f, "totals_{}", line),
        }
    }
}

/// A real-world match as first seen from any source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub event_id: String,
    pub competition: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: Option<DateTime<Utc>>,
}

impl Event {
    /// Kicked off at or before `now`. Events without a start time never count as started.
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.commence_time.is_some_and(|t| t <= now)
    }
}

/// One priced outcome in canonical vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketQuote {
    pub event_id: String,
    pub market: MarketKey,
    pub selection: String,
    pub price: f64,
    pub source: String,
    pub bookmaker: String,
    pub observed_at: DateTime<Utc>,
}

/// Decimal price from a number or a string ("1.95", "1,95").
/// Non-numeric, non-finite and <= 1.0 prices are invalid.
pub fn coerce_price(raw: &RawPrice) -> Option<f64> {
    let price = match raw {
        RawPrice::Number(p) => *p,
        RawPrice::Text(s) => s.trim().replace(',', ".").parse::<f64>().ok()?,
        RawPrice::Missing => return None,
    };
    (price.is_finite() && price > 1.0).then_some(price)
}

/// Map provider bookmaker names onto a small fixed vocabulary.
pub fn canonical_bookmaker(name: &str) -> String {
    let compact: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    let canonical = match compact.as_str() {
        s if s.contains("bet365") => "bet365",
        s if s.contains("betano") || s.contains("stoiximan") => "betano",
        s if s.contains("pinnacle") => "pinnacle",
        s if s.contains("williamhill") => "williamhill",
        s if s.contains("unibet") => "unibet",
        s if s.contains("betfair") => "betfair",
        s if s.contains("opap") || s.contains("pamestoixima") => "opap",
        _ => return compact,
    };
    canonical.to_string()
}

fn parse_trailing_number(s: &str) -> Option<f64> {
    s.split(|c: char| c.is_whitespace() || c == '_' || c == '/')
        .rev()
        .find_map(|tok| tok.trim_start_matches(['+', '-']).replace(',', ".").parse::<f64>().ok())
}

/// Canonical market for a raw market name. Totals need a line, taken from the
/// record, the market name or the selection name, in that order.
pub fn canonical_market(market: &str, line: Option<f64>, selection: &str) -> Option<MarketKey> {
    let m = market.trim().to_lowercase();
    match m.as_str() {
        "h2h" | "1x2" | "match-winner" | "match winner" | "match_winner" | "full_time"
        | "fulltime result" | "full time result" | "match result" | "3way result" => {
            Some(MarketKey::MatchResult)
        }
        _ if m.contains("total") || m.contains("over/under") || m.contains("over_under") => {
            let line = line
                .or_else(|| parse_trailing_number(&m))
                .or_else(|| parse_trailing_number(selection))?;
            MarketKey::totals(line)
        }
        _ => None,
    }
}

/// Team name reduced to an uppercase alphanumeric token with club prefixes
/// and suffixes stripped ("Arsenal FC" and "Arsenal" -> "ARSENAL").
pub fn normalize_team(name: &str) -> String {
    const AFFIXES: &[&str] = &["FC", "AFC", "CF", "SC", "FK", "SK", "BK", "SV", "CFC", "AC", "AS", "SSC", "CD", "PFC"];

    let s = name
        .to_uppercase()
        .replace("SAINT", "ST")
        .replace('&', "AND")
        .replace('.', "");
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    while tokens.len() > 1 && tokens.last().is_some_and(|t| AFFIXES.contains(t)) {
        tokens.pop();
    }
    while tokens.len() > 1 && tokens.first().is_some_and(|t| AFFIXES.contains(t)) {
        tokens.remove(0);
    }

    let mut out = tokens.concat();
    out.retain(|c| c.is_alphanumeric());
    out
}

/// Canonical `HOME-AWAY` event key, or None when either team is unknown.
pub fn event_key(home: &str, away: &str) -> Option<String> {
    let h = normalize_team(home);
    let a = normalize_team(away);
    if h.is_empty() || a.is_empty() {
        return None;
    }
    Some(format!("{}-{}", h, a))
}

fn canonical_selection(raw: &RawQuote, market: MarketKey) -> Option<String> {
    let sel = raw.selection.trim();
    let lower = sel.to_lowercase();
    match market {
        MarketKey::MatchResult => {
            let canonical = match lower.as_str() {
                "1" | "home" => "1",
                "x" | "draw" | "tie" => "X",
                "2" | "away" => "2",
                _ => {
                    let team = normalize_team(sel);
                    if team.is_empty() {
                        return None;
                    } else if team == normalize_team(&raw.home_team) {
                        "1"
                    } else if team == normalize_team(&raw.away_team) {
                        "2"
                    } else {
                        return None;
                    }
                }
            };
            Some(canonical.to_string())
        }
        MarketKey::Totals(_) => {
            let line = market.line()?;
            let (over, under) = MarketKey::over_under_labels(line);
            if lower.starts_with("over") || lower.starts_with('+') || lower == "o" {
                Some(over)
            } else if lower.starts_with("under") || lower.starts_with('-') || lower == "u" {
                Some(under)
            } else {
                None
            }
        }
    }
}

fn parse_commence(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Canonical event id for a raw record. Records without team names fall back
/// to the provider's own id, scoped by source.
pub fn event_id_for(raw: &RawQuote) -> String {
    event_key(&raw.home_team, &raw.away_team)
        .unwrap_or_else(|| format!("{}:{}", raw.source, raw.provider_event_id))
}

pub fn event_from_raw(raw: &RawQuote) -> Event {
    Event {
        event_id: event_id_for(raw),
        competition: raw.competition.clone(),
        home_team: raw.home_team.clone(),
        away_team: raw.away_team.clone(),
        commence_time: parse_commence(raw.commence_time.as_deref()),
    }
}

/// Result of normalizing one fetch's worth of records.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub quotes: Vec<MarketQuote>,
    /// One entry per distinct event id, first sighting wins.
    pub events: Vec<Event>,
    pub skipped: usize,
}

/// Pure mapping from provider records to canonical quotes, with an optional
/// bookmaker allow-list (canonical names; empty keeps everything), an
/// optional competition scope and an optional upcoming-only filter.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    allow: HashSet<String>,
    competitions: Vec<String>,
    upcoming_only: bool,
}

impl Normalizer {
    pub fn new(allow: &[String]) -> Self {
        Self {
            allow: allow.iter().map(|b| canonical_bookmaker(b)).collect(),
            ..Self::default()
        }
    }

    /// Keep only competitions whose name contains one of `scope`
    /// (case-insensitive). Records with no competition name are kept.
    pub fn with_competitions(mut self, scope: &[String]) -> Self {
        self.competitions = scope
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        self
    }

    /// Drop records whose match kicked off at or before the observation time.
    pub fn upcoming_only(mut self, enabled: bool) -> Self {
        self.upcoming_only = enabled;
        self
    }

    pub fn in_scope(&self, competition: &str) -> bool {
        let competition = competition.trim().to_lowercase();
        self.competitions.is_empty()
            || competition.is_empty()
            || self.competitions.iter().any(|c| competition.contains(c.as_str()))
    }

    pub fn normalize(&self, raw: &RawQuote, observed_at: DateTime<Utc>) -> Option<MarketQuote> {
        let price = coerce_price(&raw.price)?;

        if !self.in_scope(&raw.competition) {
            return None;
        }
        if self.upcoming_only
            && parse_commence(raw.commence_time.as_deref()).is_some_and(|t| t <= observed_at)
        {
            return None;
        }

        let bookmaker = if raw.bookmaker.trim().is_empty() {
            canonical_bookmaker(&raw.source)
        } else {
            canonical_bookmaker(&raw.bookmaker)
        };
        if !self.allow.is_empty() && !self.allow.contains(&bookmaker) {
            return None;
        }

        let market = canonical_market(&raw.market, raw.line, &raw.selection)?;
        let selection = canonical_selection(raw, market)?;

        Some(MarketQuote {
            event_id: event_id_for(raw),
            market,
            selection,
            price,
            source: raw.source.clone(),
            bookmaker,
            observed_at,
        })
    }

    /// Never fails: records that cannot be normalized are counted and dropped.
    pub fn normalize_batch(&self, raws: &[RawQuote], observed_at: DateTime<Utc>) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();
        let mut seen: HashSet<String> = HashSet::new();
        for raw in raws {
            match self.normalize(raw, observed_at) {
                Some(quote) => {
                    if seen.insert(quote.event_id.clone()) {
                        batch.events.push(event_from_raw(raw));
                    }
                    batch.quotes.push(quote);
                }
                None => {
                    tracing::debug!(
                        source = raw.source.as_str(),
                        bookmaker = raw.bookmaker.as_str(),
                        market = raw.market.as_str(),
                        selection = raw.selection.as_str(),
                        "record skipped"
                    );
                    batch.skipped += 1;
                }
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(market: &str, line: Option<f64>, selection: &str, price: RawPrice) -> RawQuote {
        RawQuote {
            source: "theoddsapi".to_string(),
            provider_event_id: "abc".to_string(),
            competition: "EPL".to_string(),
            home_team: "Arsenal FC".to_string(),
            away_team: "Chelsea".to_string(),
            commence_time: Some("2025-11-06T19:30:00Z".to_string()),
            bookmaker: "Bet365".to_string(),
            market: market.to_string(),
            line,
            selection: selection.to_string(),
            price,
        }
    }

    #[test]
    fn test_coerce_price() {
        assert_eq!(coerce_price(&RawPrice::Number(1.95)), Some(1.95));
        assert_eq!(coerce_price(&RawPrice::Text(" 1,95 ".to_string())), Some(1.95));
        assert_eq!(coerce_price(&RawPrice::Text("2.10".to_string())), Some(2.10));
        assert_eq!(coerce_price(&RawPrice::Number(1.0)), None);
        assert_eq!(coerce_price(&RawPrice::Number(0.0)), None);
        assert_eq!(coerce_price(&RawPrice::Number(f64::NAN)), None);
        assert_eq!(coerce_price(&RawPrice::Number(f64::INFINITY)), None);
        assert_eq!(coerce_price(&RawPrice::Text("abc".to_string())), None);
        assert_eq!(coerce_price(&RawPrice::Missing), None);
    }

    #[test]
    fn test_canonical_bookmaker() {
        assert_eq!(canonical_bookmaker("Bet365"), "bet365");
        assert_eq!(canonical_bookmaker("Stoiximan"), "betano");
        assert_eq!(canonical_bookmaker("Betano.gr"), "betano");
        assert_eq!(canonical_bookmaker("William Hill"), "williamhill");
        assert_eq!(canonical_bookmaker("Pame Stoixima"), "opap");
        assert_eq!(canonical_bookmaker("Betfair Exchange"), "betfair");
        assert_eq!(canonical_bookmaker("Some Book"), "somebook");
    }

    #[test]
    fn test_canonical_market() {
        assert_eq!(canonical_market("h2h", None, "Arsenal"), Some(MarketKey::MatchResult));
        assert_eq!(canonical_market("Match Winner", None, "Home"), Some(MarketKey::MatchResult));
        assert_eq!(canonical_market("totals", Some(2.5), "Over"), Some(MarketKey::Totals(250)));
        assert_eq!(canonical_market("Goals Over/Under", None, "Over 3.5"), Some(MarketKey::Totals(350)));
        assert_eq!(canonical_market("over/under 1.5", None, "Over"), Some(MarketKey::Totals(150)));
        assert_eq!(canonical_market("totals", None, "Over"), None);
        assert_eq!(canonical_market("h2h_lay", None, "Arsenal"), None);
        assert_eq!(canonical_market("btts", None, "Yes"), None);
    }

    #[test]
    fn test_normalize_team_strips_affixes() {
        assert_eq!(normalize_team("Arsenal FC"), "ARSENAL");
        assert_eq!(normalize_team("AC Milan"), "MILAN");
        assert_eq!(normalize_team("Saint-Etienne"), "STETIENNE");
        assert_eq!(normalize_team("Brighton & Hove Albion"), "BRIGHTONANDHOVEALBION");
        assert_eq!(normalize_team("FC"), "FC");
        assert_eq!(normalize_team("Ολυμπιακος"), "ΟΛΥΜΠΙΑΚΟΣ");
    }

    #[test]
    fn test_event_key_groups_providers() {
        assert_eq!(event_key("Arsenal FC", "Chelsea"), event_key("Arsenal", "Chelsea F.C."));
        assert_eq!(event_key("Arsenal", "Chelsea").as_deref(), Some("ARSENAL-CHELSEA"));
        assert_eq!(event_key("", "Chelsea"), None);
    }

    #[test]
    fn test_normalize_match_result_by_team_name() {
        let n = Normalizer::default();
        let now = Utc::now();
        let home = n.normalize(&raw("h2h", None, "Arsenal", RawPrice::Number(1.92)), now).unwrap();
        assert_eq!(home.selection, "1");
        assert_eq!(home.event_id, "ARSENAL-CHELSEA");
        assert_eq!(home.bookmaker, "bet365");
        let away = n.normalize(&raw("h2h", None, "Chelsea FC", RawPrice::Number(4.1)), now).unwrap();
        assert_eq!(away.selection, "2");
        let draw = n.normalize(&raw("h2h", None, "Draw", RawPrice::Number(3.6)), now).unwrap();
        assert_eq!(draw.selection, "X");
        assert!(n.normalize(&raw("h2h", None, "Liverpool", RawPrice::Number(3.6)), now).is_none());
    }

    #[test]
    fn test_normalize_totals_selection() {
        let n = Normalizer::default();
        let q = n.normalize(&raw("totals", Some(2.5), "Over", RawPrice::Number(1.95)), Utc::now()).unwrap();
        assert_eq!(q.market, MarketKey::Totals(250));
        assert_eq!(q.selection, "+2.5");
        let q = n.normalize(&raw("totals", Some(2.5), "Under", RawPrice::Number(1.87)), Utc::now()).unwrap();
        assert_eq!(q.selection, "-2.5");
    }

    #[test]
    fn test_normalize_drops_invalid_price() {
        let n = Normalizer::default();
        assert!(n.normalize(&raw("h2h", None, "Draw", RawPrice::Missing), Utc::now()).is_none());
        assert!(n.normalize(&raw("h2h", None, "Draw", RawPrice::Number(0.95)), Utc::now()).is_none());
    }

    #[test]
    fn test_allow_list() {
        let n = Normalizer::new(&["pinnacle".to_string(), "Stoiximan".to_string()]);
        assert!(n.normalize(&raw("h2h", None, "Draw", RawPrice::Number(3.6)), Utc::now()).is_none());
        let mut r = raw("h2h", None, "Draw", RawPrice::Number(3.6));
        r.bookmaker = "Betano".to_string();
        assert!(n.normalize(&r, Utc::now()).is_some());
    }

    #[test]
    fn test_missing_teams_use_provider_id() {
        let mut r = raw("1x2", None, "Home", RawPrice::Number(2.0));
        r.home_team.clear();
        r.away_team.clear();
        r.source = "sportmonks".to_string();
        let q = Normalizer::default().normalize(&r, Utc::now()).unwrap();
        assert_eq!(q.event_id, "sportmonks:abc");
        assert_eq!(q.selection, "1");
    }

    #[test]
    fn test_normalize_batch_skips_and_collects_events() {
        let raws = vec![
            raw("h2h", None, "Arsenal", RawPrice::Number(1.92)),
            raw("h2h", None, "Draw", RawPrice::Text("n/a".to_string())),
            raw("h2h", None, "Chelsea", RawPrice::Number(4.1)),
        ];
        let batch = Normalizer::default().normalize_batch(&raws, Utc::now());
        assert_eq!(batch.quotes.len(), 2);
        assert_eq!(batch.skipped, 1);
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].home_team, "Arsenal FC");
        assert!(batch.events[0].commence_time.is_some());
    }

    #[test]
    fn test_competition_scope() {
        let n = Normalizer::default().with_competitions(&["Premier".to_string(), "super league".to_string()]);
        assert!(n.in_scope("English Premier League"));
        assert!(n.in_scope("Super League 1"));
        assert!(!n.in_scope("Serie A"));
        assert!(n.in_scope(""));

        let mut r = raw("h2h", None, "Draw", RawPrice::Number(3.6));
        r.competition = "Serie A".to_string();
        assert!(n.normalize(&r, Utc::now()).is_none());
        assert!(Normalizer::default().normalize(&r, Utc::now()).is_some());
    }

    #[test]
    fn test_upcoming_only_drops_started_matches() {
        let n = Normalizer::default().upcoming_only(true);
        let kickoff = DateTime::parse_from_rfc3339("2025-11-06T19:30:00Z").unwrap().with_timezone(&Utc);
        let r = raw("h2h", None, "Draw", RawPrice::Number(3.6));
        assert!(n.normalize(&r, kickoff - chrono::Duration::minutes(1)).is_some());
        assert!(n.normalize(&r, kickoff).is_none());
        assert!(n.normalize(&r, kickoff + chrono::Duration::hours(1)).is_none());

        let mut undated = r.clone();
        undated.commence_time = None;
        assert!(n.normalize(&undated, kickoff).is_some());

        let batch = n.normalize_batch(&[r], kickoff);
        assert_eq!(batch.skipped, 1);
        assert!(batch.events.is_empty());
    }

    #[test]
    fn test_event_has_started() {
        let kickoff = Utc::now();
        let event = Event {
            event_id: "ARSENAL-CHELSEA".to_string(),
            competition: "EPL".to_string(),
            home_team: "Arsenal".to_string(),
            away_team: "Chelsea".to_string(),
            commence_time: Some(kickoff),
        };
        assert!(!event.has_started(kickoff - chrono::Duration::seconds(1)));
        assert!(event.has_started(kickoff));
        assert!(!Event { commence_time: None, ..event }.has_started(kickoff));
    }

    #[test]
    fn test_parse_commence_formats() {
        assert!(parse_commence(Some("2025-11-06T19:30:00Z")).is_some());
        assert!(parse_commence(Some("2025-11-06 19:30:00")).is_some());
        assert!(parse_commence(Some("tomorrow")).is_none());
        assert!(parse_commence(None).is_none());
    }

    #[test]
    fn test_market_key_display() {
        assert_eq!(MarketKey::MatchResult.to_string(), "1x2");
        assert_eq!(MarketKey::Totals(250).to_string(), "totals_2.5");
        assert_eq!(MarketKey::totals(2.5).and_then(|m| m.line()), Some(2.5));
        assert_eq!(MarketKey::totals(-1.0), None);
    }
}
