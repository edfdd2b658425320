use crate::config::{Config, Mode};
use crate::engine::alert::{self, Alert};
use crate::engine::goal_matrix::{self, ProbabilityResult};
use crate::engine::merge::{unify, UnifiedQuote};
use crate::engine::movers::{self, AlertFilter, MarketMovement, ReplacedEntry, TopMarketsTracker};
use crate::engine::normalize::{Event, MarketKey, MarketQuote, Normalizer};
use crate::engine::snapshot::{PriceMap, Snapshot, SnapshotKey, SnapshotStore};
use crate::feed::health::{SourceHealth, SourceStatus};
use crate::feed::types::{ApiQuota, RawQuote};
use crate::feed::{build_sources, SourceAdapter};
use crate::stream::{AlertListener, AlertStream};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

/// Headroom over the per-request timeout before a whole source fetch is
/// abandoned; adapters bound their own HTTP calls by the request timeout.
const FETCH_TIMEOUT_SLACK: Duration = Duration::from_secs(2);

/// One polled provider: the adapter behind its own async lock so a source is
/// never polled by two cycles at once, plus its health record.
struct SourceSlot {
    name: String,
    adapter: tokio::sync::Mutex<Box<dyn SourceAdapter>>,
    health: Mutex<SourceHealth>,
    quota: Mutex<Option<ApiQuota>>,
}

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Every tracked market was within the cache TTL, nothing was fetched.
    pub skipped_fresh: bool,
    pub sources_ok: usize,
    pub sources_failed: usize,
    pub raw_quotes: usize,
    pub normalized: usize,
    pub skipped_records: usize,
    pub markets_updated: usize,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketView {
    pub market: MarketKey,
    pub opening: PriceMap,
    pub current: PriceMap,
    pub unified: Vec<UnifiedQuote>,
    pub sources: Vec<String>,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// 1X2 markets only.
    pub money_flow: Option<f64>,
    pub movement_label: Option<String>,
}

/// Everything known about one event.
#[derive(Debug, Clone, Serialize)]
pub struct OddsSnapshotView {
    pub event: Option<Event>,
    pub markets: Vec<MarketView>,
    /// Normalized quotes of the last tick that included this event.
    pub per_source_quotes: Vec<MarketQuote>,
    pub sources_seen: Vec<String>,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorSummary {
    pub mode: &'static str,
    pub events: usize,
    pub markets: usize,
    pub alerts: usize,
    pub unread_alerts: usize,
    pub listeners: usize,
    pub sources: usize,
    pub sources_down: usize,
    pub last_update: Option<DateTime<Utc>>,
    /// "OK" once any market is tracked, "No Data" before.
    pub status: &'static str,
}

/// The odds pipeline: sources -> normalize -> merge -> snapshot -> alerts.
///
/// All state is owned here and reached through `&self`, so one instance can
/// be shared behind an `Arc` by the scheduler and any number of readers.
pub struct OddsMonitor {
    config: Config,
    sources: Vec<SourceSlot>,
    normalizer: Normalizer,
    store: SnapshotStore,
    alerts: movers::AlertLog,
    stream: AlertStream,
    top_markets: Mutex<TopMarketsTracker>,
    cycle_lock: tokio::sync::Mutex<()>,
}

impl OddsMonitor {
    /// Build with the sources the configuration selects for its mode.
    pub fn new(config: Config) -> Self {
        let sources = build_sources(&config);
        Self::with_sources(config, sources)
    }

    pub fn with_sources(config: Config, sources: Vec<Box<dyn SourceAdapter>>) -> Self {
        let window = config.monitor.health_window;
        let sources = sources
            .into_iter()
            .map(|adapter| SourceSlot {
                name: adapter.name().to_string(),
                adapter: tokio::sync::Mutex::new(adapter),
                health: Mutex::new(SourceHealth::new(window)),
                quota: Mutex::new(None),
            })
            .collect();
        Self {
            normalizer: Normalizer::new(&config.bookmakers.allow)
                .with_competitions(&config.competitions.allow)
                .upcoming_only(config.monitor.upcoming_only),
            store: SnapshotStore::new(),
            alerts: movers::AlertLog::new(config.monitor.alert_log_capacity),
            stream: AlertStream::new(config.monitor.listener_buffer),
            top_markets: Mutex::new(TopMarketsTracker::default()),
            cycle_lock: tokio::sync::Mutex::new(()),
            sources,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name.clone()).collect()
    }

    /// Scheduled refresh: skipped while every tracked market is within the cache TTL.
    pub async fn refresh_cycle(&self) -> CycleReport {
        self.run_cycle(false).await
    }

    /// Refresh regardless of cache freshness.
    pub async fn force_refresh(&self) -> CycleReport {
        self.run_cycle(true).await
    }

    async fn run_cycle(&self, force: bool) -> CycleReport {
        let _cycle = self.cycle_lock.lock().await;

        let ttl = Duration::from_secs(self.config.monitor.cache_ttl_s);
        if !force && !ttl.is_zero() && self.store.all_fresh(ttl) {
            tracing::debug!("all markets fresh, skipping fetch");
            return CycleReport { skipped_fresh: true, ..Default::default() };
        }

        let mut report = CycleReport::default();
        let raw = self.fetch_all(&mut report).await;
        report.raw_quotes = raw.len();

        let observed_at = Utc::now();
        let batch = self.normalizer.normalize_batch(&raw, observed_at);
        report.normalized = batch.quotes.len();
        report.skipped_records = batch.skipped;

        for event in batch.events {
            let known = self.store.event(&event.event_id).is_some();
            let event_id = event.event_id.clone();
            if self.store.register_event(event) && known {
                tracing::info!(event = event_id.as_str(), "rematch detected, markets re-opened");
            }
        }
        let mut by_event: BTreeMap<String, Vec<MarketQuote>> = BTreeMap::new();
        for q in &batch.quotes {
            by_event.entry(q.event_id.clone()).or_default().push(q.clone());
        }
        for (event_id, quotes) in by_event {
            self.store.record_source_quotes(&event_id, quotes);
        }

        let mut new_alerts = Vec::new();
        for ((event_id, market), unified) in unify(&batch.quotes) {
            if let Some(delta) = self.store.update(&event_id, market, &unified) {
                report.markets_updated += 1;
                new_alerts.extend(alert::evaluate(&delta, &self.config.alerts));
            }
        }

        for a in &new_alerts {
            self.store
                .mark_alerted(&SnapshotKey::new(a.event_id.as_str(), a.market), &a.selection, a.movement_pct);
        }
        let stored = self.alerts.push(new_alerts);
        for a in &stored {
            tracing::info!(
                alert_id = a.id,
                event = a.event_id.as_str(),
                market = %a.market,
                selection = a.selection.as_str(),
                direction = %a.direction,
                movement = a.movement_pct,
                "smart money alert"
            );
            self.stream.publish(a);
        }
        report.alerts = stored;

        let grace = chrono::Duration::from_std(Duration::from_secs(self.config.monitor.kickoff_grace_s))
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        let stale_after = Duration::from_secs(self.config.monitor.stale_after_s);
        let evicted = self.store.evict(observed_at, grace, stale_after);
        if evicted > 0 {
            tracing::info!(markets = evicted, "evicted finished or stale markets");
        }

        let top = movers::rank_markets(&self.store, self.config.monitor.top_movers_limit, self.started_by(observed_at));
        let dropped = self
            .top_markets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .observe(top, observed_at);
        if !dropped.is_empty() {
            tracing::debug!(count = dropped.len(), "markets left the top movers");
        }

        tracing::info!(
            sources_ok = report.sources_ok,
            sources_failed = report.sources_failed,
            quotes = report.normalized,
            skipped = report.skipped_records,
            markets = report.markets_updated,
            alerts = report.alerts.len(),
            "refresh cycle complete"
        );
        report
    }

    /// Cut-off for "already kicked off" when only upcoming matches are shown.
    fn started_by(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.config.monitor.upcoming_only.then_some(now)
    }

    /// Poll every source concurrently, each under the request timeout plus
    /// some slack. A failed or timed-out source contributes nothing this cycle.
    async fn fetch_all(&self, report: &mut CycleReport) -> Vec<RawQuote> {
        let timeout = Duration::from_millis(self.config.monitor.request_timeout_ms) + FETCH_TIMEOUT_SLACK;
        let results = futures_util::future::join_all(self.sources.iter().map(|slot| async move {
            let mut adapter = slot.adapter.lock().await;
            let result = match tokio::time::timeout(timeout, adapter.fetch()).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("timed out after {}ms", timeout.as_millis())),
            };
            let quota = adapter.last_quota();
            (slot, result, quota)
        }))
        .await;

        let now = Utc::now();
        let mut raw = Vec::new();
        for (slot, result, quota) in results {
            if quota.is_some() {
                *slot.quota.lock().unwrap_or_else(|e| e.into_inner()) = quota;
            }
            let mut health = slot.health.lock().unwrap_or_else(|e| e.into_inner());
            match result {
                Ok(mut quotes) => {
                    health.record_success(quotes.len(), now);
                    report.sources_ok += 1;
                    raw.append(&mut quotes);
                }
                Err(e) => {
                    tracing::warn!(source = slot.name.as_str(), error = %e, "source fetch failed");
                    health.record_failure(format!("{:#}", e));
                    report.sources_failed += 1;
                    if health.is_down() {
                        tracing::warn!(source = slot.name.as_str(), "source is down");
                    }
                }
            }
        }
        raw
    }

    pub fn get_odds_snapshot(&self, event_id: &str) -> Option<OddsSnapshotView> {
        let event = self.store.event(event_id);
        let markets: Vec<MarketView> = self
            .store
            .for_event(event_id)
            .into_iter()
            .map(|(market, snap)| {
                let (money_flow, movement_label) = match market {
                    MarketKey::MatchResult => (
                        movers::money_flow(&snap.opening, &snap.current),
                        movers::movement_label(&snap.opening, &snap.current),
                    ),
                    _ => (None, None),
                };
                MarketView {
                    market,
                    opening: snap.opening,
                    current: snap.current,
                    unified: snap.unified.into_values().collect(),
                    sources: snap.sources,
                    opened_at: snap.opened_at,
                    updated_at: snap.updated_at,
                    money_flow,
                    movement_label,
                }
            })
            .collect();
        if event.is_none() && markets.is_empty() {
            return None;
        }

        let per_source_quotes = self.store.source_quotes(event_id);
        let mut sources_seen: Vec<String> = per_source_quotes.iter().map(|q| q.source.clone()).collect();
        sources_seen.extend(markets.iter().flat_map(|m| m.sources.iter().cloned()));
        sources_seen.sort();
        sources_seen.dedup();
        let last_update = markets.iter().map(|m| m.updated_at).max();

        Some(OddsSnapshotView {
            event,
            markets,
            per_source_quotes,
            sources_seen,
            last_update,
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.store.events()
    }

    pub fn get_alerts(&self, filter: &AlertFilter) -> Vec<Alert> {
        self.alerts.list(filter)
    }

    pub fn mark_read(&self, ids: &[u64]) -> usize {
        self.alerts.mark_read(ids)
    }

    pub fn mark_all_read(&self) -> usize {
        self.alerts.mark_all_read()
    }

    pub fn clear_alerts(&self) -> usize {
        self.alerts.clear()
    }

    /// Biggest alerted movers. When only upcoming matches are shown, alerts of
    /// events that kicked off or were evicted are left out.
    pub fn get_top_movers(&self, limit: usize) -> Vec<Alert> {
        match self.started_by(Utc::now()) {
            Some(now) => self.alerts.top_movers_where(limit, |a| {
                self.store.event(&a.event_id).is_some_and(|e| !e.has_started(now))
            }),
            None => self.alerts.top_movers(limit),
        }
    }

    /// Tracked markets ranked by movement against their opening prices.
    pub fn top_markets(&self, limit: usize) -> Vec<MarketMovement> {
        movers::rank_markets(&self.store, limit, self.started_by(Utc::now()))
    }

    /// Markets that dropped out of the top movers between cycles, oldest first.
    pub fn replaced_log(&self) -> Vec<ReplacedEntry> {
        self.top_markets.lock().unwrap_or_else(|e| e.into_inner()).replaced()
    }

    /// Re-baseline one market's opening prices to its current prices.
    pub fn reset_market(&self, event_id: &str, market: MarketKey) -> bool {
        self.store.reset(&SnapshotKey::new(event_id, market))
    }

    pub fn compute_goal_matrix(&self, lambda_home: f64, lambda_away: f64, over_line: f64) -> ProbabilityResult {
        goal_matrix::compute_probabilities(lambda_home, lambda_away, over_line, &self.config.goal_matrix)
    }

    /// GoalMatrix with rates derived from the event's unified prices. None when
    /// neither the match result nor the totals market for the line is tracked.
    pub fn goal_matrix_for_event(&self, event_id: &str, over_line: Option<f64>) -> Option<ProbabilityResult> {
        let line = over_line.unwrap_or(self.config.goal_matrix.over_line);
        let result = self.store.get(&SnapshotKey::new(event_id, MarketKey::MatchResult));
        let totals = MarketKey::totals(line).and_then(|m| self.store.get(&SnapshotKey::new(event_id, m)));
        if result.is_none() && totals.is_none() {
            return None;
        }

        let price = |snap: &Option<Snapshot>, sel: &str| {
            snap.as_ref().and_then(|s| s.current.get(sel).copied())
        };
        let (over_label, _) = MarketKey::over_under_labels(line);
        let (lh, la) = goal_matrix::derive_lambdas(
            price(&result, "1"),
            price(&result, "2"),
            price(&totals, &over_label),
            &self.config.goal_matrix,
        );
        Some(self.compute_goal_matrix(lh, la, line))
    }

    pub fn subscribe(&self) -> AlertListener {
        self.stream.subscribe()
    }

    pub fn source_status(&self) -> Vec<SourceStatus> {
        self.sources
            .iter()
            .map(|slot| {
                let health = slot.health.lock().unwrap_or_else(|e| e.into_inner());
                let quota = slot.quota.lock().unwrap_or_else(|e| e.into_inner()).clone();
                SourceStatus::from_health(&slot.name, &health, quota)
            })
            .collect()
    }

    pub fn summary(&self) -> MonitorSummary {
        let markets = self.store.len();
        let statuses = self.source_status();
        MonitorSummary {
            mode: match self.config.monitor.mode {
                Mode::Live => "live",
                Mode::Simulated => "simulated",
            },
            events: self.store.events().len(),
            markets,
            alerts: self.alerts.len(),
            unread_alerts: self.alerts.unread_count(),
            listeners: self.stream.listener_count(),
            sources: statuses.len(),
            sources_down: statuses.iter().filter(|s| s.down).count(),
            last_update: self.store.last_updated(),
            status: if markets > 0 { "OK" } else { "No Data" },
        }
    }

    /// Forced first refresh at startup. Fails only when sources are configured
    /// and none of them returned data.
    pub async fn warm_up(&self) -> Result<CycleReport> {
        let report = self.force_refresh().await;
        if report.sources_ok == 0 && !self.sources.is_empty() {
            anyhow::bail!("no source returned data on warm-up ({} failed)", report.sources_failed);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::RawPrice;
    use async_trait::async_trait;

    struct StaticFeed {
        name: &'static str,
        quotes: Vec<RawQuote>,
    }

    #[async_trait]
    impl SourceAdapter for StaticFeed {
        fn name(&self) -> &str {
            self.name
        }
        async fn fetch(&mut self) -> Result<Vec<RawQuote>> {
            Ok(self.quotes.clone())
        }
    }

    struct FailingFeed;

    #[async_trait]
    impl SourceAdapter for FailingFeed {
        fn name(&self) -> &str {
            "broken"
        }
        async fn fetch(&mut self) -> Result<Vec<RawQuote>> {
            anyhow::bail!("HTTP 503")
        }
    }

    struct StalledFeed;

    #[async_trait]
    impl SourceAdapter for StalledFeed {
        fn name(&self) -> &str {
            "stalled"
        }
        async fn fetch(&mut self) -> Result<Vec<RawQuote>> {
            std::future::pending().await
        }
    }

    fn quote(selection: &str, price: f64) -> RawQuote {
        RawQuote {
            source: "static".to_string(),
            provider_event_id: "1".to_string(),
            competition: "EPL".to_string(),
            home_team: "Arsenal".to_string(),
            away_team: "Chelsea".to_string(),
            commence_time: None,
            bookmaker: "pinnacle".to_string(),
            market: "h2h".to_string(),
            line: None,
            selection: selection.to_string(),
            price: RawPrice::Number(price),
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.monitor.cache_ttl_s = 0;
        config.monitor.health_window = 2;
        config
    }

    #[tokio::test]
    async fn test_cycle_with_failing_source_still_updates() {
        let monitor = OddsMonitor::with_sources(
            config(),
            vec![
                Box::new(StaticFeed { name: "static", quotes: vec![quote("Arsenal", 1.92), quote("Draw", 3.5)] }),
                Box::new(FailingFeed),
            ],
        );
        let report = monitor.refresh_cycle().await;
        assert_eq!(report.sources_ok, 1);
        assert_eq!(report.sources_failed, 1);
        assert_eq!(report.markets_updated, 1);
        assert!(report.alerts.is_empty());

        let view = monitor.get_odds_snapshot("ARSENAL-CHELSEA").unwrap();
        assert_eq!(view.markets.len(), 1);
        assert_eq!(view.markets[0].current["1"], 1.92);
        assert_eq!(view.sources_seen, vec!["static"]);
        assert_eq!(view.per_source_quotes.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_source_times_out_without_blocking_others() {
        let monitor = OddsMonitor::with_sources(
            config(),
            vec![
                Box::new(StaticFeed { name: "static", quotes: vec![quote("Arsenal", 1.92), quote("Draw", 3.5)] }),
                Box::new(StalledFeed),
            ],
        );
        let report = monitor.refresh_cycle().await;
        assert_eq!(report.sources_ok, 1);
        assert_eq!(report.sources_failed, 1);
        assert_eq!(report.markets_updated, 1);
        assert_eq!(monitor.get_odds_snapshot("ARSENAL-CHELSEA").unwrap().markets[0].current["1"], 1.92);

        let status = monitor.source_status();
        let stalled = status.iter().find(|s| s.name == "stalled").unwrap();
        assert!(stalled.last_error.as_deref().is_some_and(|e| e.contains("timed out")));
        let fine = status.iter().find(|s| s.name == "static").unwrap();
        assert!(fine.last_error.is_none());
    }

    fn fixture(kickoff: DateTime<Utc>, home: f64) -> Vec<RawQuote> {
        let at = Some(kickoff.to_rfc3339());
        let mut quotes = vec![quote("Arsenal", home), quote("Draw", 3.4), quote("Chelsea", 3.8)];
        quotes.iter_mut().for_each(|q| q.commence_time = at.clone());
        quotes
    }

    /// Serves `first` once, then `rest` forever.
    struct SwitchFeed {
        first: Option<Vec<RawQuote>>,
        rest: Vec<RawQuote>,
    }

    #[async_trait]
    impl SourceAdapter for SwitchFeed {
        fn name(&self) -> &str {
            "static"
        }
        async fn fetch(&mut self) -> Result<Vec<RawQuote>> {
            Ok(self.first.take().unwrap_or_else(|| self.rest.clone()))
        }
    }

    #[tokio::test]
    async fn test_started_matches_are_filtered_out() {
        let past = Utc::now() - chrono::Duration::hours(1);
        let monitor = OddsMonitor::with_sources(
            config(),
            vec![Box::new(StaticFeed { name: "static", quotes: fixture(past, 1.92) })],
        );
        let report = monitor.refresh_cycle().await;
        assert_eq!(report.raw_quotes, 3);
        assert_eq!(report.normalized, 0);
        assert!(monitor.get_odds_snapshot("ARSENAL-CHELSEA").is_none());

        let mut cfg = config();
        cfg.monitor.upcoming_only = false;
        let monitor = OddsMonitor::with_sources(
            cfg,
            vec![Box::new(StaticFeed { name: "static", quotes: fixture(past, 1.92) })],
        );
        assert_eq!(monitor.refresh_cycle().await.normalized, 3);
        assert_eq!(monitor.top_markets(10).len(), 1);
    }

    #[tokio::test]
    async fn test_competition_scope_drops_other_leagues() {
        let mut cfg = config();
        cfg.competitions.allow = vec!["Serie A".to_string()];
        let monitor = OddsMonitor::with_sources(
            cfg,
            vec![Box::new(StaticFeed { name: "static", quotes: vec![quote("Draw", 3.5)] })],
        );
        let report = monitor.refresh_cycle().await;
        assert_eq!(report.normalized, 0);
        assert_eq!(monitor.summary().markets, 0);
    }

    #[tokio::test]
    async fn test_rematch_gets_fresh_opening() {
        let first_leg = Utc::now() + chrono::Duration::hours(2);
        let second_leg = first_leg + chrono::Duration::days(90);
        let monitor = OddsMonitor::with_sources(
            config(),
            vec![Box::new(SwitchFeed { first: Some(fixture(first_leg, 1.92)), rest: fixture(second_leg, 2.60) })],
        );
        monitor.refresh_cycle().await;
        let report = monitor.refresh_cycle().await;
        // A 35% "move" across two different fixtures is not a move.
        assert!(report.alerts.is_empty());
        let view = monitor.get_odds_snapshot("ARSENAL-CHELSEA").unwrap();
        assert_eq!(view.markets[0].opening["1"], 2.60);
        assert_eq!(view.event.unwrap().commence_time.unwrap().timestamp(), second_leg.timestamp());
    }

    #[tokio::test]
    async fn test_held_move_alerts_once() {
        let kickoff = Utc::now() + chrono::Duration::hours(2);
        let monitor = OddsMonitor::with_sources(
            config(),
            vec![Box::new(SwitchFeed { first: Some(fixture(kickoff, 2.00)), rest: fixture(kickoff, 1.80) })],
        );
        monitor.refresh_cycle().await;
        assert_eq!(monitor.refresh_cycle().await.alerts.len(), 1);
        for _ in 0..3 {
            assert!(monitor.refresh_cycle().await.alerts.is_empty());
        }
        assert_eq!(monitor.get_alerts(&AlertFilter::default()).len(), 1);

        let view = monitor.get_odds_snapshot("ARSENAL-CHELSEA").unwrap();
        assert_eq!(view.markets[0].movement_label.as_deref(), Some("Home↑"));
        assert!(view.markets[0].money_flow.is_some_and(|f| f > 0.0));
    }

    #[tokio::test]
    async fn test_top_movers_skip_started_events() {
        let kickoff = Utc::now() + chrono::Duration::hours(2);
        let monitor = OddsMonitor::with_sources(
            config(),
            vec![Box::new(SwitchFeed { first: Some(fixture(kickoff, 2.00)), rest: fixture(kickoff, 1.70) })],
        );
        monitor.refresh_cycle().await;
        monitor.refresh_cycle().await;
        assert_eq!(monitor.get_top_movers(10).len(), 1);
        assert_eq!(monitor.top_markets(10).len(), 1);

        // Same fixture, now kicked off: the known event is left out.
        monitor.store().clear();
        monitor.store().register_event(Event {
            event_id: "ARSENAL-CHELSEA".to_string(),
            competition: "EPL".to_string(),
            home_team: "Arsenal".to_string(),
            away_team: "Chelsea".to_string(),
            commence_time: Some(Utc::now() - chrono::Duration::minutes(5)),
        });
        assert!(monitor.get_top_movers(10).is_empty());
        assert!(monitor.top_markets(10).is_empty());
    }

    #[tokio::test]
    async fn test_finished_events_are_evicted() {
        let mut cfg = config();
        cfg.monitor.upcoming_only = false;
        cfg.monitor.kickoff_grace_s = 3600;
        let long_ago = Utc::now() - chrono::Duration::hours(5);
        let monitor = OddsMonitor::with_sources(
            cfg,
            vec![Box::new(StaticFeed { name: "static", quotes: fixture(long_ago, 1.92) })],
        );
        let report = monitor.refresh_cycle().await;
        assert_eq!(report.markets_updated, 1);
        assert_eq!(monitor.summary().markets, 0);
        assert!(monitor.events().is_empty());
    }

    #[tokio::test]
    async fn test_source_marked_down_after_window() {
        let monitor = OddsMonitor::with_sources(config(), vec![Box::new(FailingFeed)]);
        monitor.refresh_cycle().await;
        assert!(!monitor.source_status()[0].down);
        monitor.refresh_cycle().await;
        let status = &monitor.source_status()[0];
        assert!(status.down);
        assert_eq!(status.last_error.as_deref(), Some("HTTP 503"));
        assert_eq!(monitor.summary().sources_down, 1);
    }

    #[tokio::test]
    async fn test_summary_status() {
        let monitor = OddsMonitor::with_sources(config(), vec![]);
        assert_eq!(monitor.summary().status, "No Data");
        let monitor = OddsMonitor::with_sources(
            config(),
            vec![Box::new(StaticFeed { name: "static", quotes: vec![quote("Draw", 3.5)] })],
        );
        monitor.refresh_cycle().await;
        let summary = monitor.summary();
        assert_eq!(summary.status, "OK");
        assert_eq!(summary.markets, 1);
        assert_eq!(summary.events, 1);
        assert_eq!(summary.mode, "live");
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_fetch() {
        let mut cfg = config();
        cfg.monitor.cache_ttl_s = 60;
        let monitor = OddsMonitor::with_sources(
            cfg,
            vec![Box::new(StaticFeed { name: "static", quotes: vec![quote("Draw", 3.5)] })],
        );
        assert!(!monitor.refresh_cycle().await.skipped_fresh);
        assert!(monitor.refresh_cycle().await.skipped_fresh);
        assert!(!monitor.force_refresh().await.skipped_fresh);
    }

    #[tokio::test]
    async fn test_goal_matrix_for_unknown_event() {
        let monitor = OddsMonitor::with_sources(config(), vec![]);
        assert!(monitor.goal_matrix_for_event("NOPE-NOPE", None).is_none());
        assert!(monitor.get_odds_snapshot("NOPE-NOPE").is_none());
    }

    #[tokio::test]
    async fn test_warm_up_fails_when_every_source_fails() {
        let monitor = OddsMonitor::with_sources(config(), vec![Box::new(FailingFeed)]);
        assert!(monitor.warm_up().await.is_err());
        let monitor = OddsMonitor::with_sources(config(), vec![]);
        assert!(monitor.warm_up().await.is_ok());
    }
}
