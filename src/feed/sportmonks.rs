//! SportMonks v3 football odds feed.
//!
//! Rows arrive flat (one priced label per row) and the shape varies per plan:
//! `bookmaker`, `market` and `price` may be plain values or nested objects.
//! Parsing works on `serde_json::Value` so an unexpected shape skips the row
//! instead of failing the whole batch.

use super::types::*;
use super::SourceAdapter;
use crate::config::SportMonksConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

pub const SOURCE_NAME: &str = "sportmonks";

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Name-like field: either a plain string or an object carrying `name`/`key`.
fn name_field(v: Option<&Value>, inner: &str) -> Option<String> {
    match v? {
        Value::Object(map) => map.get(inner).and_then(as_text),
        other => as_text(other),
    }
}

fn price_field(v: Option<&Value>) -> RawPrice {
    let v = match v {
        Some(Value::Object(map)) => map.get("decimal").or_else(|| map.get("value")),
        other => other,
    };
    match v {
        Some(Value::Number(n)) => n.as_f64().map(RawPrice::Number).unwrap_or_default(),
        Some(Value::String(s)) => RawPrice::Text(s.clone()),
        _ => RawPrice::Missing,
    }
}

/// (fixture id, home, away, start time) from either an embedded fixture object
/// or a bare `fixture_id`.
fn fixture_info(row: &Value) -> Option<(String, String, String, Option<String>)> {
    match row.get("fixture") {
        Some(Value::Object(fixture)) => {
            let id = fixture.get("id").and_then(as_text)?;
            let mut home = String::new();
            let mut away = String::new();
            for p in fixture.get("participants").and_then(Value::as_array).into_iter().flatten() {
                let location = p.pointer("/meta/location").and_then(Value::as_str);
                let name = p.get("name").and_then(as_text).unwrap_or_default();
                match location {
                    Some("home") => home = name,
                    Some("away") => away = name,
                    _ => {}
                }
            }
            let start = fixture.get("starting_at").and_then(as_text);
            Some((id, home, away, start))
        }
        Some(other) => Some((as_text(other)?, String::new(), String::new(), None)),
        None => {
            let id = row.get("fixture_id").and_then(as_text)?;
            Some((id, String::new(), String::new(), None))
        }
    }
}

pub fn parse_sportmonks_response(json: &str) -> Result<Vec<RawQuote>> {
    let body: Value = serde_json::from_str(json).context("failed to parse SportMonks JSON")?;
    let rows = body
        .get("data")
        .and_then(Value::as_array)
        .context("SportMonks response has no data array")?;

    let mut quotes = Vec::new();
    for row in rows {
        let Some((fixture_id, home, away, start)) = fixture_info(row) else {
            tracing::debug!("SportMonks row without fixture, skipping");
            continue;
        };
        let selection = name_field(row.get("label"), "name")
            .or_else(|| name_field(row.get("outcome"), "name"))
            .unwrap_or_default();
        let bookmaker = name_field(row.get("bookmaker"), "name").unwrap_or_default();
        let market = name_field(row.get("market"), "key")
            .or_else(|| name_field(row.get("market"), "name"))
            .unwrap_or_else(|| "h2h".to_string());
        let line = row
            .get("total")
            .and_then(as_text)
            .and_then(|t| t.trim().parse::<f64>().ok());

        quotes.push(RawQuote {
            source: SOURCE_NAME.to_string(),
            provider_event_id: fixture_id,
            competition: String::new(),
            home_team: home,
            away_team: away,
            commence_time: start,
            bookmaker,
            market,
            line,
            selection: selection.trim().to_string(),
            price: price_field(row.get("price").or_else(|| row.get("value"))),
        });
    }
    Ok(quotes)
}

pub struct SportMonks {
    client: Client,
    api_token: String,
    base_url: String,
    league_id: Option<u64>,
    per_page: u32,
}

impl SportMonks {
    pub fn new(api_token: String, config: &SportMonksConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            client,
            api_token,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            league_id: config.league_id,
            per_page: config.per_page,
        })
    }
}

#[async_trait]
impl SourceAdapter for SportMonks {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(&mut self) -> Result<Vec<RawQuote>> {
        let mut query: Vec<(&str, String)> = vec![
            ("api_token", self.api_token.clone()),
            ("include", "bookmaker,market,fixture.participants".to_string()),
            ("per_page", self.per_page.to_string()),
        ];
        if let Some(league) = self.league_id {
            query.push(("filters", format!("league_id:{}", league)));
        }

        let resp = self.client.get(&self.base_url).query(&query).send().await
            .context("SportMonks request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("SportMonks API error ({}): {}", status, body);
        }

        let text = resp.text().await.context("SportMonks response read failed")?;
        parse_sportmonks_response(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_json() -> &'static str {
        r#"{
            "data": [
                {
                    "fixture": {
                        "id": 19135003,
                        "starting_at": "2025-11-06 19:30:00",
                        "participants": [
                            { "name": "Panathinaikos", "meta": { "location": "home" } },
                            { "name": "PAOK", "meta": { "location": "away" } }
                        ]
                    },
                    "bookmaker": { "name": "Bet365" },
                    "market": { "key": "1x2", "name": "Fulltime Result" },
                    "label": "Home",
                    "price": { "decimal": "2.10" }
                },
                {
                    "fixture_id": 19135004,
                    "bookmaker": "Pinnacle",
                    "market": "totals",
                    "label": "Over",
                    "total": "2.5",
                    "price": 1.85
                },
                {
                    "bookmaker": "Pinnacle",
                    "label": "Draw",
                    "price": 3.3
                }
            ]
        }"#
    }

    #[test]
    fn test_parse_nested_row() {
        let quotes = parse_sportmonks_response(fixture_json()).unwrap();
        let q = &quotes[0];
        assert_eq!(q.provider_event_id, "19135003");
        assert_eq!(q.home_team, "Panathinaikos");
        assert_eq!(q.away_team, "PAOK");
        assert_eq!(q.bookmaker, "Bet365");
        assert_eq!(q.market, "1x2");
        assert_eq!(q.selection, "Home");
        assert_eq!(q.price, RawPrice::Text("2.10".to_string()));
    }

    #[test]
    fn test_parse_flat_row() {
        let quotes = parse_sportmonks_response(fixture_json()).unwrap();
        let q = &quotes[1];
        assert_eq!(q.provider_event_id, "19135004");
        assert_eq!(q.market, "totals");
        assert_eq!(q.line, Some(2.5));
        assert_eq!(q.price, RawPrice::Number(1.85));
    }

    #[test]
    fn test_parse_skips_row_without_fixture() {
        let quotes = parse_sportmonks_response(fixture_json()).unwrap();
        assert_eq!(quotes.len(), 2);
    }

    #[test]
    fn test_parse_missing_data_array() {
        assert!(parse_sportmonks_response(r#"{"message": "plan"}"#).is_err());
    }
}
