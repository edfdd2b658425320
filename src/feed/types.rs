use serde::Deserialize;

/// One priced outcome exactly as a provider reported it, before normalization.
/// Names are provider-specific; the normalizer maps them onto the canonical vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuote {
    pub source: String,
    pub provider_event_id: String,
    pub competition: String,
    pub home_team: String,
    pub away_team: String,
    /// RFC3339 when the provider supplies one.
    pub commence_time: Option<String>,
    pub bookmaker: String,
    pub market: String,
    /// Goal line for totals markets, when the provider puts it outside the market name.
    pub line: Option<f64>,
    pub selection: String,
    pub price: RawPrice,
}

/// Providers send prices as numbers, strings, or not at all.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(untagged)]
pub enum RawPrice {
    Number(f64),
    Text(String),
    #[default]
    Missing,
}

/// API usage quota info extracted from response headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiQuota {
    pub requests_used: u64,
    pub requests_remaining: u64,
}

// ── the-odds-api.com v4 ───────────────────────────────────────────────

/// the-odds-api.com v4 response: top-level array of events
#[derive(Debug, Deserialize)]
pub struct TheOddsApiEvent {
    pub id: String,
    #[serde(default)]
    pub sport_title: String,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub commence_time: Option<String>,
    #[serde(default)]
    pub bookmakers: Vec<TheOddsApiBookmaker>,
}

#[derive(Debug, Deserialize)]
pub struct TheOddsApiBookmaker {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub markets: Vec<TheOddsApiMarket>,
}

#[derive(Debug, Deserialize)]
pub struct TheOddsApiMarket {
    pub key: String,
    /// Parsed one by one so a malformed outcome only drops itself.
    #[serde(default)]
    pub outcomes: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct TheOddsApiOutcome {
    pub name: String,
    #[serde(default)]
    pub price: RawPrice,
    #[serde(default)]
    pub point: Option<f64>,
}

// ── bookmaker front-API events (Stoiximan / OPAP style) ───────────────

#[derive(Debug, Deserialize)]
pub struct FrontApiResponse {
    /// Parsed one by one into [`FrontApiEvent`] so a malformed event only drops itself.
    #[serde(default)]
    pub events: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontApiEvent {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub home_team: Option<String>,
    #[serde(default)]
    pub away_team: Option<String>,
    #[serde(default)]
    pub competition: Option<FrontApiCompetition>,
    #[serde(default)]
    pub competition_name: Option<String>,
    /// Epoch seconds or milliseconds.
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub markets: Vec<FrontApiMarket>,
}

#[derive(Debug, Deserialize)]
pub struct FrontApiCompetition {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct FrontApiMarket {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub line: Option<f64>,
    #[serde(default)]
    pub selections: Vec<FrontApiSelection>,
}

#[derive(Debug, Deserialize)]
pub struct FrontApiSelection {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: RawPrice,
}
