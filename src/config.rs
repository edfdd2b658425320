use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

const ENV_FILE: &str = ".env";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub goal_matrix: GoalMatrixConfig,
    #[serde(default)]
    pub bookmakers: BookmakerConfig,
    #[serde(default)]
    pub competitions: CompetitionConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

/// Whether the pipeline polls real providers or the simulated random-walk feed.
/// Chosen once at construction; nothing downstream branches on it.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Live,
    Simulated,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_s: u64,
    /// A market refreshed less than this long ago counts as fresh; a cycle
    /// where every tracked market is fresh skips the outbound fetch.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_s: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Number of recent calls considered when deciding whether a source is down.
    #[serde(default = "default_health_window")]
    pub health_window: usize,
    #[serde(default = "default_alert_log_capacity")]
    pub alert_log_capacity: usize,
    #[serde(default = "default_top_movers_limit")]
    pub top_movers_limit: usize,
    #[serde(default = "default_listener_buffer")]
    pub listener_buffer: usize,
    /// Drop quotes for matches that have already kicked off.
    #[serde(default = "default_upcoming_only")]
    pub upcoming_only: bool,
    /// A match is forgotten this long after kick-off.
    #[serde(default = "default_kickoff_grace")]
    pub kickoff_grace_s: u64,
    /// A market not updated for this long is forgotten. 0 keeps markets forever.
    #[serde(default = "default_stale_after")]
    pub stale_after_s: u64,
}

fn default_refresh_interval() -> u64 { 60 }
fn default_cache_ttl() -> u64 { 15 }
fn default_request_timeout() -> u64 { 10_000 }
fn default_health_window() -> usize { 5 }
fn default_alert_log_capacity() -> usize { 500 }
fn default_top_movers_limit() -> usize { 10 }
fn default_listener_buffer() -> usize { 64 }
fn default_upcoming_only() -> bool { true }
fn default_kickoff_grace() -> u64 { 3 * 3600 }
fn default_stale_after() -> u64 { 6 * 3600 }

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Live,
            refresh_interval_s: default_refresh_interval(),
            cache_ttl_s: default_cache_ttl(),
            request_timeout_ms: default_request_timeout(),
            health_window: default_health_window(),
            alert_log_capacity: default_alert_log_capacity(),
            top_movers_limit: default_top_movers_limit(),
            listener_buffer: default_listener_buffer(),
            upcoming_only: default_upcoming_only(),
            kickoff_grace_s: default_kickoff_grace(),
            stale_after_s: default_stale_after(),
        }
    }
}

/// Reference price a movement is measured against.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Baseline {
    #[default]
    Opening,
    PreviousTick,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertConfig {
    /// Fractional movement that triggers an alert (0.05 = 5%).
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Only alert on shortening prices (steam moves).
    #[serde(default)]
    pub steam_only: bool,
    #[serde(default)]
    pub baseline: Baseline,
}

fn default_threshold() -> f64 { 0.05 }

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            steam_only: false,
            baseline: Baseline::Opening,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GoalMatrixConfig {
    #[serde(default = "default_over_line")]
    pub over_line: f64,
    /// Highest goal count per side included in the scoreline grid.
    #[serde(default = "default_goal_cap")]
    pub goal_cap: u32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// `mu = mu_intercept + mu_slope / over_price`
    #[serde(default = "default_mu_intercept")]
    pub mu_intercept: f64,
    #[serde(default = "default_mu_slope")]
    pub mu_slope: f64,
    #[serde(default = "default_fallback_over_price")]
    pub fallback_over_price: f64,
}

fn default_over_line() -> f64 { 2.5 }
fn default_goal_cap() -> u32 { 9 }
fn default_top_k() -> usize { 5 }
fn default_mu_intercept() -> f64 { 0.8 }
fn default_mu_slope() -> f64 { 3.2 }
fn default_fallback_over_price() -> f64 { 1.9 }

impl Default for GoalMatrixConfig {
    fn default() -> Self {
        Self {
            over_line: default_over_line(),
            goal_cap: default_goal_cap(),
            top_k: default_top_k(),
            mu_intercept: default_mu_intercept(),
            mu_slope: default_mu_slope(),
            fallback_over_price: default_fallback_over_price(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BookmakerConfig {
    /// Canonical bookmaker names to keep. Empty keeps everything.
    #[serde(default)]
    pub allow: Vec<String>,
}

/// League scope. Entries are matched case-insensitively as substrings of the
/// competition name ("premier" keeps "Premier League").
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CompetitionConfig {
    /// Empty keeps every competition.
    #[serde(default)]
    pub allow: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    pub the_odds_api: Option<TheOddsApiConfig>,
    pub sportmonks: Option<SportMonksConfig>,
    #[serde(default)]
    pub event_feeds: Vec<EventFeedConfig>,
    #[serde(default)]
    pub simulated: SimulatedConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TheOddsApiConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub base_url: String,
    #[serde(default = "default_regions")]
    pub regions: String,
    #[serde(default = "default_markets")]
    pub markets: String,
    pub sport_keys: Vec<String>,
}

fn default_enabled() -> bool { true }
fn default_regions() -> String { "eu".to_string() }
fn default_markets() -> String { "h2h,totals".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct SportMonksConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub base_url: String,
    pub league_id: Option<u64>,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_per_page() -> u32 { 50 }

#[derive(Debug, Deserialize, Clone)]
pub struct EventFeedConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Source tag, also used as the bookmaker name for every quote.
    pub name: String,
    pub url: String,
    /// Optional `X-API-Key` header value, read from this env var.
    pub api_key_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimulatedConfig {
    pub seed: Option<u64>,
    #[serde(default = "default_sim_fixtures")]
    pub fixtures: usize,
    /// Maximum fractional price drift per tick.
    #[serde(default = "default_sim_drift")]
    pub drift: f64,
}

fn default_sim_fixtures() -> usize { 8 }
fn default_sim_drift() -> f64 { 0.04 }

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            seed: None,
            fixtures: default_sim_fixtures(),
            drift: default_sim_drift(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse config TOML")
    }

    /// Startup-time sanity checks. Problems are reported, not fatal: the
    /// monitor still runs on whatever data it can get.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.monitor.mode == Mode::Live && self.enabled_source_count() == 0 {
            warnings.push("no odds sources enabled; live mode will produce no data".to_string());
        }
        if !(self.alerts.threshold > 0.0 && self.alerts.threshold < 1.0) {
            warnings.push(format!(
                "alert threshold {} outside (0, 1); expected a fraction such as 0.05",
                self.alerts.threshold
            ));
        }
        if self.monitor.refresh_interval_s == 0 {
            warnings.push("refresh_interval_s is 0; scheduler will use 1s".to_string());
        }
        if self.monitor.request_timeout_ms == 0 {
            warnings.push("request_timeout_ms is 0; every fetch will time out".to_string());
        }
        warnings
    }

    pub fn enabled_source_count(&self) -> usize {
        let odds_api = self.sources.the_odds_api.as_ref().is_some_and(|c| c.enabled) as usize;
        let sportmonks = self.sources.sportmonks.as_ref().is_some_and(|c| c.enabled) as usize;
        let feeds = self.sources.event_feeds.iter().filter(|f| f.enabled).count();
        odds_api + sportmonks + feeds
    }

    /// Load .env file into process environment. Real env vars take precedence.
    pub fn load_env_file() {
        let path = Path::new(ENV_FILE);
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return,
        };
        // Strip BOM if present (common on Windows-created files)
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
        for (key, value) in parse_env_lines(content) {
            if std::env::var(&key).is_err() {
                std::env::set_var(key, value);
            }
        }
    }

    /// Read a credential from the environment. Missing or blank keys are an error
    /// for the caller to turn into a disabled source.
    pub fn api_key(var: &str) -> Result<String> {
        match std::env::var(var) {
            Ok(key) if !sanitize_key(&key).is_empty() => Ok(sanitize_key(&key)),
            _ => anyhow::bail!("{} is not set", var),
        }
    }
}

fn parse_env_lines(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim().trim_matches('\r');
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let (key, value) = line.split_once('=')?;
            let value = value.trim().trim_matches('"').trim_matches('\'');
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

/// Strip carriage returns, BOM, and other invisible chars from a key value.
fn sanitize_key(raw: &str) -> String {
    raw.replace(['\r', '\u{feff}', '\u{200b}'], "")
        .trim()
        .to_string()
}
