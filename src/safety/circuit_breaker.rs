//! Investigation circuit breaker
//!
//! Budgets an investigation is never allowed to exceed, enforced against the
//! append-only event log before every probe. Once a check trips for a given
//! log it stays tripped: appending events only ever grows the counts.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::investigation::state::{Event, EventType};

/// Per-investigation budgets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_max_total_queries")]
    pub max_total_queries: usize,
    #[serde(default = "default_max_queries_per_hypothesis")]
    pub max_queries_per_hypothesis: usize,
    #[serde(default = "default_max_retries_per_hypothesis")]
    pub max_retries_per_hypothesis: usize,
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: usize,
    #[serde(default = "default_max_duration_seconds")]
    pub max_duration_seconds: u64,
}

fn default_max_total_queries() -> usize {
    50
}
fn default_max_queries_per_hypothesis() -> usize {
    5
}
fn default_max_retries_per_hypothesis() -> usize {
    2
}
fn default_max_consecutive_failures() -> usize {
    3
}
fn default_max_duration_seconds() -> u64 {
    600
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_total_queries: default_max_total_queries(),
            max_queries_per_hypothesis: default_max_queries_per_hypothesis(),
            max_retries_per_hypothesis: default_max_retries_per_hypothesis(),
            max_consecutive_failures: default_max_consecutive_failures(),
            max_duration_seconds: default_max_duration_seconds(),
        }
    }
}

/// Which budget tripped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripReason {
    TotalQueries,
    HypothesisQueries,
    HypothesisRetries,
    ConsecutiveFailures,
    Duration,
    DuplicateQuery,
}

impl TripReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TotalQueries => "total_queries",
            Self::HypothesisQueries => "hypothesis_queries",
            Self::HypothesisRetries => "hypothesis_retries",
            Self::ConsecutiveFailures => "consecutive_failures",
            Self::Duration => "duration",
            Self::DuplicateQuery => "duplicate",
        }
    }

    /// Global reasons end the whole investigation; the rest only abandon
    /// the current hypothesis.
    pub fn is_global(&self) -> bool {
        matches!(self, Self::TotalQueries | Self::Duration)
    }
}

/// A budget was exceeded
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CircuitBreakerTripped {
    pub reason: TripReason,
    pub message: String,
}

impl CircuitBreakerTripped {
    fn new(reason: TripReason, message: impl Into<String>) -> Self {
        Self { reason, message: message.into() }
    }
}

/// Inspects the event log and raises before a budget-violating probe runs.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    pub config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self { config }
    }

    /// Check every budget against the log. `hypothesis_id` scopes the
    /// per-hypothesis budgets; without it only global limits apply.
    pub fn check(
        &self,
        events: &[Event],
        hypothesis_id: Option<&str>,
    ) -> Result<(), CircuitBreakerTripped> {
        self.check_total_queries(events)?;
        self.check_duration(events)?;
        self.check_consecutive_failures(events)?;

        if let Some(h) = hypothesis_id {
            self.check_hypothesis_queries(events, h)?;
            self.check_hypothesis_retries(events, h)?;
            self.check_log_duplicates(events)?;
        }

        Ok(())
    }

    /// Reject a candidate probe whose normalized SQL was already submitted.
    /// Called after query generation, before the probe is recorded or run.
    pub fn check_candidate(
        &self,
        events: &[Event],
        hypothesis_id: &str,
        candidate_sql: &str,
    ) -> Result<(), CircuitBreakerTripped> {
        self.check(events, Some(hypothesis_id))?;

        let normalized = normalize_sql(candidate_sql);
        let duplicate = submitted_queries(events).any(|q| normalize_sql(q) == normalized);
        if duplicate {
            return Err(CircuitBreakerTripped::new(
                TripReason::DuplicateQuery,
                format!("Duplicate query detected for hypothesis {hypothesis_id}"),
            ));
        }
        Ok(())
    }

    fn check_total_queries(&self, events: &[Event]) -> Result<(), CircuitBreakerTripped> {
        let total = events
            .iter()
            .filter(|e| e.event_type == EventType::QuerySubmitted)
            .count();
        if total >= self.config.max_total_queries {
            return Err(CircuitBreakerTripped::new(
                TripReason::TotalQueries,
                format!("Total query limit reached: {total}/{}", self.config.max_total_queries),
            ));
        }
        Ok(())
    }

    fn check_hypothesis_queries(
        &self,
        events: &[Event],
        hypothesis_id: &str,
    ) -> Result<(), CircuitBreakerTripped> {
        let count = events
            .iter()
            .filter(|e| e.event_type == EventType::QuerySubmitted)
            .filter(|e| e.hypothesis_id() == Some(hypothesis_id))
            .count();
        if count >= self.config.max_queries_per_hypothesis {
            return Err(CircuitBreakerTripped::new(
                TripReason::HypothesisQueries,
                format!(
                    "Hypothesis query limit reached for {hypothesis_id}: {count}/{}",
                    self.config.max_queries_per_hypothesis
                ),
            ));
        }
        Ok(())
    }

    fn check_hypothesis_retries(
        &self,
        events: &[Event],
        hypothesis_id: &str,
    ) -> Result<(), CircuitBreakerTripped> {
        let count = events
            .iter()
            .filter(|e| e.event_type == EventType::ReflexionAttempted)
            .filter(|e| e.hypothesis_id() == Some(hypothesis_id))
            .count();
        if count >= self.config.max_retries_per_hypothesis {
            return Err(CircuitBreakerTripped::new(
                TripReason::HypothesisRetries,
                format!(
                    "Hypothesis retry limit reached for {hypothesis_id}: {count}/{}",
                    self.config.max_retries_per_hypothesis
                ),
            ));
        }
        Ok(())
    }

    fn check_consecutive_failures(&self, events: &[Event]) -> Result<(), CircuitBreakerTripped> {
        let mut streak = 0usize;
        for event in events.iter().rev() {
            match event.event_type {
                EventType::QueryFailed => streak += 1,
                EventType::QuerySucceeded => break,
                _ => {}
            }
        }
        if streak >= self.config.max_consecutive_failures {
            return Err(CircuitBreakerTripped::new(
                TripReason::ConsecutiveFailures,
                format!(
                    "Consecutive failure limit reached: {streak}/{}",
                    self.config.max_consecutive_failures
                ),
            ));
        }
        Ok(())
    }

    fn check_duration(&self, events: &[Event]) -> Result<(), CircuitBreakerTripped> {
        let started = events
            .iter()
            .find(|e| e.event_type == EventType::InvestigationStarted)
            .map(|e| e.timestamp);
        if let Some(started_at) = started {
            let elapsed = (Utc::now() - started_at).num_seconds().max(0) as u64;
            if elapsed >= self.config.max_duration_seconds {
                return Err(CircuitBreakerTripped::new(
                    TripReason::Duration,
                    format!(
                        "Investigation duration limit reached: {elapsed}s/{}s",
                        self.config.max_duration_seconds
                    ),
                ));
            }
        }
        Ok(())
    }

    fn check_log_duplicates(&self, events: &[Event]) -> Result<(), CircuitBreakerTripped> {
        let mut seen = std::collections::HashSet::new();
        for query in submitted_queries(events) {
            if !seen.insert(normalize_sql(query)) {
                return Err(CircuitBreakerTripped::new(
                    TripReason::DuplicateQuery,
                    "Duplicate query detected in event log".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn submitted_queries(events: &[Event]) -> impl Iterator<Item = &str> {
    events
        .iter()
        .filter(|e| e.event_type == EventType::QuerySubmitted)
        .filter_map(|e| e.data.get("query").and_then(|v| v.as_str()))
}

/// Case- and whitespace-insensitive SQL identity used for duplicate detection
fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::investigation::state::Event;
    use serde_json::json;

    fn strict() -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            max_total_queries: 3,
            max_queries_per_hypothesis: 2,
            max_retries_per_hypothesis: 1,
            max_consecutive_failures: 2,
            max_duration_seconds: 600,
        })
    }

    fn submitted(h: &str, q: &str) -> Event {
        Event::now(EventType::QuerySubmitted, json!({"hypothesis_id": h, "query": q}))
    }

    #[test]
    fn default_config_values() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.max_total_queries, 50);
        assert_eq!(config.max_queries_per_hypothesis, 5);
        assert_eq!(config.max_retries_per_hypothesis, 2);
        assert_eq!(config.max_consecutive_failures, 3);
        assert_eq!(config.max_duration_seconds, 600);
    }

    #[test]
    fn passes_with_no_events() {
        strict().check(&[], Some("h001")).unwrap();
    }

    #[test]
    fn trips_on_total_queries() {
        let events: Vec<Event> = (0..3)
            .map(|i| submitted(&format!("h{i:03}"), &format!("SELECT {i}")))
            .collect();
        let err = strict().check(&events, Some("h004")).unwrap_err();
        assert_eq!(err.reason, TripReason::TotalQueries);
        assert!(err.message.contains("Total query limit reached"));
    }

    #[test]
    fn trips_on_hypothesis_queries() {
        let events = vec![submitted("h001", "SELECT 1"), submitted("h001", "SELECT 2")];
        let err = strict().check(&events, Some("h001")).unwrap_err();
        assert_eq!(err.reason, TripReason::HypothesisQueries);
        assert!(err.message.contains("Hypothesis query limit reached"));
    }

    #[test]
    fn trips_on_hypothesis_retries() {
        let events = vec![Event::now(
            EventType::ReflexionAttempted,
            json!({"hypothesis_id": "h001"}),
        )];
        let err = strict().check(&events, Some("h001")).unwrap_err();
        assert_eq!(err.reason, TripReason::HypothesisRetries);
        assert!(err.message.contains("Hypothesis retry limit reached"));
    }

    #[test]
    fn trips_on_consecutive_failures() {
        let events = vec![
            Event::now(EventType::QueryFailed, json!({})),
            Event::now(EventType::QueryFailed, json!({})),
        ];
        let err = strict().check(&events, None).unwrap_err();
        assert_eq!(err.reason, TripReason::ConsecutiveFailures);
        assert!(err.message.contains("Consecutive failure limit reached"));
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let events = vec![
            Event::now(EventType::QueryFailed, json!({})),
            Event::now(EventType::QuerySucceeded, json!({})),
            Event::now(EventType::QueryFailed, json!({})),
        ];
        strict().check(&events, None).unwrap();
    }

    #[test]
    fn trips_on_duplicate_in_log() {
        let breaker = CircuitBreaker::default();
        let events = vec![submitted("h001", "SELECT 1"), submitted("h001", "SELECT 1")];
        let err = breaker.check(&events, Some("h001")).unwrap_err();
        assert_eq!(err.reason, TripReason::DuplicateQuery);
    }

    #[test]
    fn duplicate_detection_normalizes_case_and_whitespace() {
        let breaker = CircuitBreaker::default();
        let events = vec![submitted("h001", "SELECT * FROM t LIMIT 1")];
        let err = breaker
            .check_candidate(&events, "h001", "select *   from T limit 1")
            .unwrap_err();
        assert_eq!(err.reason, TripReason::DuplicateQuery);
    }

    #[test]
    fn different_queries_pass() {
        let breaker = CircuitBreaker::default();
        let events = vec![submitted("h001", "SELECT 1"), submitted("h001", "SELECT 2")];
        breaker.check(&events, Some("h001")).unwrap();
        breaker.check_candidate(&events, "h001", "SELECT 3").unwrap();
    }

    #[test]
    fn other_hypothesis_budgets_do_not_leak() {
        let events = vec![submitted("h001", "SELECT 1"), submitted("h001", "SELECT 2")];
        strict().check(&events, Some("h002")).unwrap();
    }

    #[test]
    fn without_hypothesis_only_global_limits_apply() {
        let breaker = CircuitBreaker::default();
        let events = vec![Event::now(EventType::QueryFailed, json!({}))];
        breaker.check(&events, None).unwrap();
    }

    #[test]
    fn monotone_once_tripped_stays_tripped() {
        let breaker = strict();
        let mut events = vec![submitted("h001", "SELECT 1"), submitted("h001", "SELECT 2")];
        assert!(breaker.check(&events, Some("h001")).is_err());
        // Appending more events can never un-trip the breaker.
        events.push(Event::now(EventType::QuerySucceeded, json!({})));
        events.push(submitted("h002", "SELECT 9"));
        assert!(breaker.check(&events, Some("h001")).is_err());
    }
}
