//! Investigation state
//!
//! An append-only event log plus views derived by scanning it. The log is
//! the single source of truth: status, budget counters and resumability all
//! come from the events, never from separate mutable fields. Mutators return
//! a new value and leave the original untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AnomalyAlert, InvestigationContext};

/// Fixed enumeration of everything that can happen during an investigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    InvestigationStarted,
    ContextGathered,
    HypothesisGenerated,
    QuerySubmitted,
    QuerySucceeded,
    QueryFailed,
    ReflexionAttempted,
    EvidenceRecorded,
    HypothesisAbandoned,
    SynthesisStarted,
    SynthesisCompleted,
    InvestigationFailed,
    CircuitBreakerTripped,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvestigationStarted => "investigation_started",
            Self::ContextGathered => "context_gathered",
            Self::HypothesisGenerated => "hypothesis_generated",
            Self::QuerySubmitted => "query_submitted",
            Self::QuerySucceeded => "query_succeeded",
            Self::QueryFailed => "query_failed",
            Self::ReflexionAttempted => "reflexion_attempted",
            Self::EvidenceRecorded => "evidence_recorded",
            Self::HypothesisAbandoned => "hypothesis_abandoned",
            Self::SynthesisStarted => "synthesis_started",
            Self::SynthesisCompleted => "synthesis_completed",
            Self::InvestigationFailed => "investigation_failed",
            Self::CircuitBreakerTripped => "circuit_breaker_tripped",
        }
    }

    /// Terminal events end the event stream for subscribers
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SynthesisCompleted | Self::InvestigationFailed)
    }
}

/// One entry in the append-only log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic position in the log, assigned at append time
    #[serde(default)]
    pub seq: u64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Event {
    /// Build an event stamped with the current time. `data` must be a JSON
    /// object; anything else becomes an empty map.
    pub fn now(event_type: EventType, data: serde_json::Value) -> Self {
        let data = match data {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self { seq: 0, event_type, timestamp: Utc::now(), data }
    }

    pub fn hypothesis_id(&self) -> Option<&str> {
        self.data.get("hypothesis_id").and_then(|v| v.as_str())
    }

    pub fn query(&self) -> Option<&str> {
        self.data.get("query").and_then(|v| v.as_str())
    }
}

/// Derived status of an investigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationStatus {
    Pending,
    InProgress,
    Completed,
    Inconclusive,
    Failed,
}

impl InvestigationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Inconclusive => "inconclusive",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::InProgress)
    }
}

/// State of one investigation. Exclusively owned by the orchestrator for the
/// investigation's lifetime; everyone else sees snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationState {
    pub id: String,
    pub tenant_id: String,
    pub alert: AnomalyAlert,
    #[serde(default)]
    pub events: Vec<Event>,
    /// Set once by the context phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<InvestigationContext>,
}

impl InvestigationState {
    pub fn new(id: impl Into<String>, tenant_id: impl Into<String>, alert: AnomalyAlert) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            alert,
            events: Vec::new(),
            context: None,
        }
    }

    /// Append an event, assigning the next sequence number. Returns the new
    /// state; `self` is unchanged.
    #[must_use]
    pub fn append_event(&self, mut event: Event) -> Self {
        let mut next = self.clone();
        event.seq = next.events.len() as u64;
        next.events.push(event);
        next
    }

    /// Attach the gathered context. Returns the new state; `self` is unchanged.
    #[must_use]
    pub fn with_context(&self, context: InvestigationContext) -> Self {
        let mut next = self.clone();
        next.context = Some(context);
        next
    }

    /// Derive the status from the log alone.
    ///
    /// `synthesis_completed` wins over everything except an explicit
    /// failure; a synthesis without accepted evidence or without a root
    /// cause is inconclusive.
    pub fn status(&self) -> InvestigationStatus {
        if self.has_event(EventType::InvestigationFailed) {
            return InvestigationStatus::Failed;
        }
        if let Some(synthesis) = self
            .events
            .iter()
            .rev()
            .find(|e| e.event_type == EventType::SynthesisCompleted)
        {
            let root_cause_found = synthesis
                .data
                .get("root_cause_found")
                .and_then(|v| v.as_bool())
                .unwrap_or(true);
            let has_evidence = self.has_event(EventType::EvidenceRecorded);
            return if root_cause_found && has_evidence {
                InvestigationStatus::Completed
            } else {
                InvestigationStatus::Inconclusive
            };
        }
        if self.events.is_empty() {
            InvestigationStatus::Pending
        } else {
            InvestigationStatus::InProgress
        }
    }

    fn has_event(&self, event_type: EventType) -> bool {
        self.events.iter().any(|e| e.event_type == event_type)
    }

    /// Total `query_submitted` count
    pub fn get_query_count(&self) -> usize {
        self.count(EventType::QuerySubmitted, None)
    }

    /// `query_submitted` count for one hypothesis
    pub fn get_hypothesis_query_count(&self, hypothesis_id: &str) -> usize {
        self.count(EventType::QuerySubmitted, Some(hypothesis_id))
    }

    /// `reflexion_attempted` count for one hypothesis
    pub fn get_retry_count(&self, hypothesis_id: &str) -> usize {
        self.count(EventType::ReflexionAttempted, Some(hypothesis_id))
    }

    fn count(&self, event_type: EventType, hypothesis_id: Option<&str>) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .filter(|e| hypothesis_id.is_none() || e.hypothesis_id() == hypothesis_id)
            .count()
    }

    /// Length of the trailing run of `query_failed` events not broken by a
    /// `query_succeeded`
    pub fn get_consecutive_failures(&self) -> usize {
        let mut streak = 0;
        for event in self.events.iter().rev() {
            match event.event_type {
                EventType::QueryFailed => streak += 1,
                EventType::QuerySucceeded => break,
                _ => {}
            }
        }
        streak
    }

    /// All queries submitted for a hypothesis, in order
    pub fn get_all_queries(&self, hypothesis_id: &str) -> Vec<String> {
        self.queries_of(EventType::QuerySubmitted, hypothesis_id)
    }

    /// All failed queries for a hypothesis, in order
    pub fn get_failed_queries(&self, hypothesis_id: &str) -> Vec<String> {
        self.queries_of(EventType::QueryFailed, hypothesis_id)
    }

    fn queries_of(&self, event_type: EventType, hypothesis_id: &str) -> Vec<String> {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .filter(|e| e.hypothesis_id() == Some(hypothesis_id))
            .filter_map(|e| e.query().map(str::to_string))
            .collect()
    }

    /// Events strictly after `last_seq`, for restartable streaming
    pub fn events_since(&self, last_seq: Option<u64>) -> &[Event] {
        match last_seq {
            None => &self.events,
            Some(seq) => {
                let start = self
                    .events
                    .iter()
                    .position(|e| e.seq > seq)
                    .unwrap_or(self.events.len());
                &self.events[start..]
            }
        }
    }

    /// Elapsed seconds since the `investigation_started` event
    pub fn elapsed_seconds(&self) -> f64 {
        self.events
            .iter()
            .find(|e| e.event_type == EventType::InvestigationStarted)
            .map(|e| (Utc::now() - e.timestamp).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
            .max(0.0)
    }
}
