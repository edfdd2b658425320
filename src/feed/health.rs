use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Rolling record of the last N fetch outcomes for one source.
///
/// A source is considered down once the window is full and every call in it
/// failed; a single success clears that state. Health is reported only, it
/// never stops the pipeline from polling.
#[derive(Debug)]
pub struct SourceHealth {
    outcomes: VecDeque<bool>,
    window_size: usize,
    last_success: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_quote_count: usize,
}

impl SourceHealth {
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            outcomes: VecDeque::with_capacity(window_size),
            window_size,
            last_success: None,
            last_error: None,
            last_quote_count: 0,
        }
    }

    fn push(&mut self, ok: bool) {
        if self.outcomes.len() >= self.window_size {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(ok);
    }

    pub fn record_success(&mut self, quote_count: usize, at: DateTime<Utc>) {
        self.push(true);
        self.last_success = Some(at);
        self.last_quote_count = quote_count;
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.push(false);
        self.last_error = Some(error.into());
    }

    pub fn is_down(&self) -> bool {
        self.outcomes.len() >= self.window_size && self.outcomes.iter().all(|ok| !ok)
    }

    /// Consecutive failures at the end of the window.
    pub fn consecutive_failures(&self) -> usize {
        self.outcomes.iter().rev().take_while(|ok| !**ok).count()
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_quote_count(&self) -> usize {
        self.last_quote_count
    }
}

/// Point-in-time view of one source for status reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStatus {
    pub name: String,
    pub down: bool,
    pub consecutive_failures: usize,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_quote_count: usize,
    pub quota: Option<super::types::ApiQuota>,
}

impl SourceStatus {
    pub fn from_health(name: &str, health: &SourceHealth, quota: Option<super::types::ApiQuota>) -> Self {
        Self {
            name: name.to_string(),
            down: health.is_down(),
            consecutive_failures: health.consecutive_failures(),
            last_success: health.last_success(),
            last_error: health.last_error().map(str::to_string),
            last_quote_count: health.last_quote_count(),
            quota,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_source_is_not_down() {
        let health = SourceHealth::new(3);
        assert!(!health.is_down());
        assert_eq!(health.consecutive_failures(), 0);
    }

    #[test]
    fn test_down_only_when_window_full_of_failures() {
        let mut health = SourceHealth::new(3);
        health.record_failure("timeout");
        health.record_failure("timeout");
        assert!(!health.is_down());
        health.record_failure("HTTP 503");
        assert!(health.is_down());
        assert_eq!(health.last_error(), Some("HTTP 503"));
    }

    #[test]
    fn test_success_clears_down() {
        let mut health = SourceHealth::new(2);
        health.record_failure("x");
        health.record_failure("x");
        assert!(health.is_down());
        health.record_success(12, Utc::now());
        assert!(!health.is_down());
        assert_eq!(health.consecutive_failures(), 0);
        assert_eq!(health.last_quote_count(), 12);
    }

    #[test]
    fn test_success_ages_out_of_window() {
        let mut health = SourceHealth::new(2);
        health.record_success(1, Utc::now());
        health.record_failure("a");
        assert!(!health.is_down());
        health.record_failure("b");
        assert!(health.is_down());
        assert!(health.last_success().is_some());
    }

    #[test]
    fn test_zero_window_treated_as_one() {
        let mut health = SourceHealth::new(0);
        health.record_failure("a");
        assert!(health.is_down());
    }

    #[test]
    fn test_status_snapshot() {
        let mut health = SourceHealth::new(3);
        health.record_failure("boom");
        let status = SourceStatus::from_health("opap", &health, None);
        assert_eq!(status.name, "opap");
        assert!(!status.down);
        assert_eq!(status.consecutive_failures, 1);
        assert_eq!(status.last_error.as_deref(), Some("boom"));
    }
}
