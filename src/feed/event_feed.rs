//! Bookmaker "front API" event feeds (Stoiximan, OPAP / Pame Stoixima).
//!
//! Both publish `{"events": [...]}` with teams, a competition and
//! `markets[].selections[]`. The bookmaker tag is fixed per configured feed.

use super::types::*;
use super::SourceAdapter;
use crate::config::EventFeedConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const POSITIONAL_RESULT: [&str; 3] = ["1", "X", "2"];

fn value_to_id(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Epoch seconds or milliseconds to RFC3339.
fn start_time_rfc3339(ts: i64) -> Option<String> {
    let dt = if ts > 10_i64.pow(12) {
        chrono::DateTime::from_timestamp_millis(ts)
    } else {
        chrono::DateTime::from_timestamp(ts, 0)
    };
    dt.map(|dt| dt.to_rfc3339())
}

/// "Home - Away" / "Home vs Away" event names.
fn split_event_name(name: &str) -> Option<(String, String)> {
    [" - ", " vs ", " v "].iter().find_map(|sep| {
        let (h, a) = name.split_once(sep)?;
        let (h, a) = (h.trim(), a.trim());
        (!h.is_empty() && !a.is_empty()).then(|| (h.to_string(), a.to_string()))
    })
}

/// Flatten a front-API body into raw quotes. A malformed event is skipped;
/// only a body that is not a JSON object fails.
pub fn parse_front_api_response(json: &str, source: &str) -> Result<Vec<RawQuote>> {
    let resp: FrontApiResponse =
        serde_json::from_str(json).with_context(|| format!("failed to parse {} JSON", source))?;

    let mut quotes = Vec::new();
    for value in resp.events {
        let event: FrontApiEvent = match serde_json::from_value(value) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(source, error = %e, "malformed event skipped");
                continue;
            }
        };
        let teams = match (&event.home_team, &event.away_team) {
            (Some(h), Some(a)) if !h.is_empty() && !a.is_empty() => Some((h.clone(), a.clone())),
            _ => event.name.as_deref().and_then(split_event_name),
        };
        let Some((home, away)) = teams else {
            tracing::debug!(source, "event without team names, skipping");
            continue;
        };

        let event_id = event
            .id
            .as_ref()
            .and_then(value_to_id)
            .unwrap_or_else(|| format!("{} - {}", home, away));
        let competition = event
            .competition
            .as_ref()
            .map(|c| c.name.clone())
            .or_else(|| event.competition_name.clone())
            .unwrap_or_default();
        let commence_time = event.start_time.and_then(start_time_rfc3339);

        for (idx, market) in event.markets.iter().enumerate() {
            // The first unnamed market is the match result in both feeds.
            let market_key = market
                .key
                .clone()
                .or_else(|| market.name.clone())
                .unwrap_or_else(|| if idx == 0 { "1x2".to_string() } else { String::new() });
            if market_key.is_empty() {
                continue;
            }

            for (pos, sel) in market.selections.iter().enumerate() {
                let selection = if sel.name.trim().is_empty() {
                    match POSITIONAL_RESULT.get(pos) {
                        Some(s) if market.selections.len() == 3 => s.to_string(),
                        _ => continue,
                    }
                } else {
                    sel.name.clone()
                };

                quotes.push(RawQuote {
                    source: source.to_string(),
                    provider_event_id: event_id.clone(),
                    competition: competition.clone(),
                    home_team: home.clone(),
                    away_team: away.clone(),
                    commence_time: commence_time.clone(),
                    bookmaker: source.to_string(),
                    market: market_key.clone(),
                    line: market.line,
                    selection,
                    price: sel.price.clone(),
                });
            }
        }
    }
    Ok(quotes)
}

pub struct EventFeed {
    client: Client,
    name: String,
    url: String,
    api_key: Option<String>,
}

impl EventFeed {
    pub fn new(config: &EventFeedConfig, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36")
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            client,
            name: config.name.to_lowercase(),
            url: config.url.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl SourceAdapter for EventFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&mut self) -> Result<Vec<RawQuote>> {
        let mut req = self.client.get(&self.url);
        if let Some(ref key) = self.api_key {
            req = req.header("X-API-Key", key.as_str());
        }

        let resp = req.send().await
            .with_context(|| format!("{} request failed", self.name))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} HTTP {}: {}", self.name, status, body);
        }

        let text = resp.text().await
            .with_context(|| format!("{} response read failed", self.name))?;
        parse_front_api_response(&text, &self.name)
    }
}
