use super::types::*;
use super::SourceAdapter;
use crate::config::TheOddsApiConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub const SOURCE_NAME: &str = "theoddsapi";

pub struct TheOddsApi {
    client: Client,
    api_key: String,
    base_url: String,
    regions: String,
    markets: String,
    sport_keys: Vec<String>,
    last_quota: Option<ApiQuota>,
}

/// Parse a quota header that may be an integer or float (e.g. "14527.0").
fn parse_quota_header(headers: &reqwest::header::HeaderMap, name: &str) -> u64 {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| v as u64)
        .unwrap_or(0)
}

/// Flatten a the-odds-api events array into one raw quote per
/// (bookmaker, market, outcome). Malformed events and outcomes are skipped;
/// only a body that is not a JSON array fails.
pub fn parse_the_odds_api_response(json: &str) -> Result<Vec<RawQuote>> {
    let events: Vec<serde_json::Value> =
        serde_json::from_str(json).context("failed to parse the-odds-api response")?;

    let mut quotes = Vec::new();
    for value in events {
        let event: TheOddsApiEvent = match serde_json::from_value(value) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(source = SOURCE_NAME, error = %e, "malformed event skipped");
                continue;
            }
        };
        for bm in &event.bookmakers {
            let bookmaker = if bm.title.is_empty() { &bm.key } else { &bm.title };
            for market in &bm.markets {
                for value in &market.outcomes {
                    let outcome = match TheOddsApiOutcome::deserialize(value) {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            tracing::debug!(
                                source = SOURCE_NAME,
                                event = event.id.as_str(),
                                market = market.key.as_str(),
                                error = %e,
                                "malformed outcome skipped"
                            );
                            continue;
                        }
                    };
                    quotes.push(RawQuote {
                        source: SOURCE_NAME.to_string(),
                        provider_event_id: event.id.clone(),
                        competition: event.sport_title.clone(),
                        home_team: event.home_team.clone(),
                        away_team: event.away_team.clone(),
                        commence_time: event.commence_time.clone(),
                        bookmaker: bookmaker.clone(),
                        market: market.key.clone(),
                        line: outcome.point,
                        selection: outcome.name,
                        price: outcome.price,
                    });
                }
            }
        }
    }
    Ok(quotes)
}

impl TheOddsApi {
    pub fn new(api_key: String, config: &TheOddsApiConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("odds-monitor/0.1")
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            regions: config.regions.clone(),
            markets: config.markets.clone(),
            sport_keys: config.sport_keys.clone(),
            last_quota: None,
        })
    }

    fn odds_url(&self, sport_key: &str) -> String {
        format!(
            "{}/v4/sports/{}/odds?apiKey={}&regions={}&markets={}&oddsFormat=decimal&dateFormat=iso",
            self.base_url, sport_key, self.api_key, self.regions, self.markets,
        )
    }

    /// One sport key. The quota headers are returned even when the status is
    /// an error, since failed calls are still counted against the quota.
    async fn fetch_sport(&self, sport_key: &str) -> (Option<ApiQuota>, Result<Vec<RawQuote>>) {
        let resp = match self.client.get(self.odds_url(sport_key)).send().await {
            Ok(resp) => resp,
            Err(e) => return (None, Err(anyhow::Error::new(e).context("the-odds-api request failed"))),
        };

        let quota = ApiQuota {
            requests_used: parse_quota_header(resp.headers(), "x-requests-used"),
            requests_remaining: parse_quota_header(resp.headers(), "x-requests-remaining"),
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return (Some(quota), Err(anyhow::anyhow!("the-odds-api {} ({}): {}", sport_key, status, body)));
        }

        let result = match resp.text().await {
            Ok(text) => parse_the_odds_api_response(&text),
            Err(e) => Err(anyhow::Error::new(e).context("the-odds-api response read failed")),
        };
        (Some(quota), result)
    }
}

/// Latest quota reading: the one with the most requests used.
fn latest_quota(readings: impl IntoIterator<Item = ApiQuota>) -> Option<ApiQuota> {
    readings.into_iter().max_by_key(|q| q.requests_used)
}

#[async_trait]
impl SourceAdapter for TheOddsApi {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    /// One request per configured sport key, all in flight at once so the
    /// per-request timeout bounds the whole call. A failing sport key is
    /// logged and skipped; the call only fails when every sport key failed.
    async fn fetch(&mut self) -> Result<Vec<RawQuote>> {
        let this = &*self;
        let results = futures_util::future::join_all(
            this.sport_keys.iter().map(|key| async move { (key, this.fetch_sport(key).await) }),
        )
        .await;

        let mut quotes = Vec::new();
        let mut readings = Vec::new();
        let mut last_err = None;
        let mut any_ok = false;
        for (sport_key, (quota, result)) in results {
            readings.extend(quota);
            match result {
                Ok(mut batch) => {
                    any_ok = true;
                    quotes.append(&mut batch);
                }
                Err(e) => {
                    tracing::warn!(sport = sport_key.as_str(), error = %e, "the-odds-api sport fetch failed");
                    last_err = Some(e);
                }
            }
        }
        if let Some(quota) = latest_quota(readings) {
            self.last_quota = Some(quota);
        }

        match last_err {
            Some(e) if !any_ok => Err(e),
            _ => Ok(quotes),
        }
    }

    fn last_quota(&self) -> Option<ApiQuota> {
        self.last_quota.clone()
    }
}
