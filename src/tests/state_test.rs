//! Investigation state: status derivation, derived counters, value
//! semantics of the append-only log.

use serde_json::json;

use crate::investigation::state::{Event, EventType, InvestigationState, InvestigationStatus};
use crate::tests::common::sample_alert;

fn state() -> InvestigationState {
    InvestigationState::new("inv-001", "tenant-1", sample_alert())
}

fn event(event_type: EventType, data: serde_json::Value) -> Event {
    Event::now(event_type, data)
}

#[test]
fn new_state_is_pending() {
    let state = state();
    assert_eq!(state.status(), InvestigationStatus::Pending);
    assert!(state.events.is_empty());
}

#[test]
fn work_events_mean_in_progress() {
    let state = state().append_event(event(EventType::HypothesisGenerated, json!({})));
    assert_eq!(state.status(), InvestigationStatus::InProgress);
}

#[test]
fn synthesis_with_evidence_is_completed() {
    let state = state()
        .append_event(event(EventType::EvidenceRecorded, json!({"hypothesis_id": "h001"})))
        .append_event(event(EventType::SynthesisCompleted, json!({"root_cause_found": true})));
    assert_eq!(state.status(), InvestigationStatus::Completed);
}

#[test]
fn synthesis_without_evidence_is_inconclusive() {
    let state = state()
        .append_event(event(EventType::SynthesisCompleted, json!({"root_cause_found": true})));
    assert_eq!(state.status(), InvestigationStatus::Inconclusive);
}

#[test]
fn synthesis_without_root_cause_is_inconclusive() {
    let state = state()
        .append_event(event(EventType::EvidenceRecorded, json!({"hypothesis_id": "h001"})))
        .append_event(event(EventType::SynthesisCompleted, json!({"root_cause_found": false})));
    assert_eq!(state.status(), InvestigationStatus::Inconclusive);
}

#[test]
fn failure_event_wins() {
    let state = state()
        .append_event(event(EventType::SynthesisCompleted, json!({"root_cause_found": true})))
        .append_event(event(EventType::InvestigationFailed, json!({"error": "boom"})));
    assert_eq!(state.status(), InvestigationStatus::Failed);
}

#[test]
fn status_truth_table_over_event_combinations() {
    // (has synthesis, has failure, has work) -> expected status
    let cases = [
        (false, false, false, InvestigationStatus::Pending),
        (false, false, true, InvestigationStatus::InProgress),
        (true, false, true, InvestigationStatus::Completed),
        (true, true, true, InvestigationStatus::Failed),
        (false, true, true, InvestigationStatus::Failed),
        (false, true, false, InvestigationStatus::Failed),
    ];

    for (has_synthesis, has_failure, has_work, expected) in cases {
        let mut s = state();
        if has_work {
            s = s.append_event(event(EventType::QuerySubmitted, json!({"hypothesis_id": "h001", "query": "SELECT 1"})));
            s = s.append_event(event(EventType::EvidenceRecorded, json!({"hypothesis_id": "h001"})));
        }
        if has_synthesis {
            s = s.append_event(event(EventType::SynthesisCompleted, json!({"root_cause_found": true})));
        }
        if has_failure {
            s = s.append_event(event(EventType::InvestigationFailed, json!({})));
        }
        assert_eq!(
            s.status(),
            expected,
            "synthesis={has_synthesis} failure={has_failure} work={has_work}"
        );
    }
}

#[test]
fn retry_counts_are_per_hypothesis() {
    let state = state()
        .append_event(event(EventType::ReflexionAttempted, json!({"hypothesis_id": "h001"})))
        .append_event(event(EventType::ReflexionAttempted, json!({"hypothesis_id": "h001"})))
        .append_event(event(EventType::ReflexionAttempted, json!({"hypothesis_id": "h002"})));

    assert_eq!(state.get_retry_count("h001"), 2);
    assert_eq!(state.get_retry_count("h002"), 1);
    assert_eq!(state.get_retry_count("h003"), 0);
}

#[test]
fn query_counts_total_and_per_hypothesis() {
    let state = state()
        .append_event(event(EventType::QuerySubmitted, json!({"hypothesis_id": "h001", "query": "SELECT 1"})))
        .append_event(event(EventType::QuerySubmitted, json!({"hypothesis_id": "h001", "query": "SELECT 2"})))
        .append_event(event(EventType::QuerySubmitted, json!({"hypothesis_id": "h002", "query": "SELECT 3"})));

    assert_eq!(state.get_query_count(), 3);
    assert_eq!(state.get_hypothesis_query_count("h001"), 2);
    assert_eq!(state.get_hypothesis_query_count("h002"), 1);
}

#[test]
fn queries_and_failures_are_listed_in_order() {
    let state = state()
        .append_event(event(EventType::QuerySubmitted, json!({"hypothesis_id": "h001", "query": "SELECT 1"})))
        .append_event(event(EventType::QuerySubmitted, json!({"hypothesis_id": "h001", "query": "SELECT 2"})))
        .append_event(event(EventType::QueryFailed, json!({"hypothesis_id": "h001", "query": "SELECT invalid"})));

    assert_eq!(state.get_all_queries("h001"), vec!["SELECT 1", "SELECT 2"]);
    assert_eq!(state.get_failed_queries("h001"), vec!["SELECT invalid"]);
}

#[test]
fn consecutive_failures_count_the_trailing_run() {
    let state = state()
        .append_event(event(EventType::QuerySucceeded, json!({})))
        .append_event(event(EventType::QueryFailed, json!({})))
        .append_event(event(EventType::QueryFailed, json!({})))
        .append_event(event(EventType::QueryFailed, json!({})));
    assert_eq!(state.get_consecutive_failures(), 3);
}

#[test]
fn success_resets_consecutive_failures() {
    let state = state()
        .append_event(event(EventType::QueryFailed, json!({})))
        .append_event(event(EventType::QueryFailed, json!({})))
        .append_event(event(EventType::QuerySucceeded, json!({})))
        .append_event(event(EventType::QueryFailed, json!({})));
    assert_eq!(state.get_consecutive_failures(), 1);
}

#[test]
fn append_event_returns_a_new_value() {
    let original = state();
    let appended = original.append_event(event(EventType::InvestigationStarted, json!({})));

    assert_eq!(appended.events.len(), 1);
    assert!(original.events.is_empty());
    assert_eq!(appended.id, original.id);
}

#[test]
fn sequence_numbers_are_monotonic() {
    let mut s = state();
    for _ in 0..5 {
        s = s.append_event(event(EventType::QuerySubmitted, json!({"hypothesis_id": "h001", "query": "q"})));
    }
    let seqs: Vec<u64> = s.events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3, 4]);

    for pair in s.events.windows(2) {
        assert!(pair[1].timestamp >= pair[0].timestamp);
    }
}

#[test]
fn with_context_preserves_the_original() {
    use crate::models::InvestigationContext;
    use crate::tests::common::sample_schema;

    let original = state();
    let updated = original.with_context(InvestigationContext::new(sample_schema()));

    assert!(updated.context.is_some());
    assert!(original.context.is_none());
}

#[test]
fn events_since_supports_restartable_reads() {
    let mut s = state();
    for _ in 0..4 {
        s = s.append_event(event(EventType::QuerySubmitted, json!({"hypothesis_id": "h001", "query": "q"})));
    }

    assert_eq!(s.events_since(None).len(), 4);
    assert_eq!(s.events_since(Some(1)).len(), 2);
    assert_eq!(s.events_since(Some(3)).len(), 0);
    assert_eq!(s.events_since(Some(1))[0].seq, 2);
}
