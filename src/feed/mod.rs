pub mod event_feed;
pub mod health;
pub mod simulated;
pub mod sportmonks;
pub mod the_odds_api;
pub mod types;

use crate::config::{Config, Mode};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use types::{ApiQuota, RawQuote};

pub const ODDS_API_KEY_VAR: &str = "ODDS_API_KEY";
pub const SPORTMONKS_KEY_VAR: &str = "SPORTMONKS_API_KEY";

/// One odds provider. Adapters do not retry: a failed call is reported to the
/// caller and the next scheduled cycle tries again.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&mut self) -> Result<Vec<RawQuote>>;
    fn last_quota(&self) -> Option<ApiQuota> {
        None
    }
}

/// Build the adapters for the configured mode. A source whose credentials are
/// missing is logged and left out; the remaining sources still run.
pub fn build_sources(config: &Config) -> Vec<Box<dyn SourceAdapter>> {
    if config.monitor.mode == Mode::Simulated {
        return vec![Box::new(simulated::SimulatedFeed::new(&config.sources.simulated))];
    }

    let timeout = Duration::from_millis(config.monitor.request_timeout_ms);
    let mut sources: Vec<Box<dyn SourceAdapter>> = Vec::new();

    if let Some(cfg) = config.sources.the_odds_api.as_ref().filter(|c| c.enabled) {
        let built = Config::api_key(ODDS_API_KEY_VAR)
            .and_then(|key| the_odds_api::TheOddsApi::new(key, cfg, timeout));
        match built {
            Ok(src) => sources.push(Box::new(src)),
            Err(e) => tracing::warn!(source = the_odds_api::SOURCE_NAME, error = %e, "source disabled"),
        }
    }

    if let Some(cfg) = config.sources.sportmonks.as_ref().filter(|c| c.enabled) {
        let built = Config::api_key(SPORTMONKS_KEY_VAR)
            .and_then(|key| sportmonks::SportMonks::new(key, cfg, timeout));
        match built {
            Ok(src) => sources.push(Box::new(src)),
            Err(e) => tracing::warn!(source = sportmonks::SOURCE_NAME, error = %e, "source disabled"),
        }
    }

    for cfg in config.sources.event_feeds.iter().filter(|c| c.enabled) {
        let api_key = match cfg.api_key_env.as_deref() {
            Some(var) => match Config::api_key(var) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!(source = cfg.name.as_str(), error = %e, "continuing without API key");
                    None
                }
            },
            None => None,
        };
        match event_feed::EventFeed::new(cfg, api_key, timeout) {
            Ok(src) => sources.push(Box::new(src)),
            Err(e) => tracing::warn!(source = cfg.name.as_str(), error = %e, "source disabled"),
        }
    }

    sources
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_mode_builds_only_simulated_feed() {
        let config = Config::parse(
            r#"
            [monitor]
            mode = "simulated"

            [[sources.event_feeds]]
            name = "opap"
            url = "https://example.invalid/events"
            "#,
        )
        .unwrap();
        let sources = build_sources(&config);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name(), simulated::SOURCE_NAME);
    }

    #[test]
    fn test_live_mode_builds_enabled_event_feeds() {
        let config = Config::parse(
            r#"
            [[sources.event_feeds]]
            name = "Stoiximan"
            url = "https://example.invalid/a"

            [[sources.event_feeds]]
            name = "opap"
            url = "https://example.invalid/b"
            enabled = false
            "#,
        )
        .unwrap();
        let sources = build_sources(&config);
        let names: Vec<_> = sources.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["stoiximan"]);
    }

    #[test]
    fn test_live_mode_without_sources_is_empty() {
        let config = Config::parse("").unwrap();
        assert!(build_sources(&config).is_empty());
    }
}
