//! Service facade and durable store: non-blocking starts, state
//! snapshots, restartable event reads, and persistence round-trips.

use std::sync::Arc;
use std::time::Duration;

use crate::investigation::state::{EventType, InvestigationStatus};
use crate::investigation::{
    InvestigationOrchestrator, InvestigationService, OrchestratorConfig, SqliteEventStore,
};
use crate::models::{FindingStatus, HypothesisCategory};
use crate::safety::{CircuitBreaker, CircuitBreakerConfig};
use crate::services::context::{ContextEngine, ContextEngineConfig};
use crate::services::datasource::mock::MockSqlAdapter;
use crate::services::datasource::SqlAdapter;
use crate::tests::common::{arc, hypothesis, sample_alert, sample_schema, ScriptedJudge, ScriptedLlmClient};

fn scripted_orchestrator() -> InvestigationOrchestrator {
    let adapter: Arc<dyn SqlAdapter> = arc(
        MockSqlAdapter::new(sample_schema())
            .with_row("COUNT(*) AS cnt", serde_json::json!({"cnt": 500})),
    );
    let llm = arc(ScriptedLlmClient::new(vec![hypothesis(
        "h001",
        HypothesisCategory::UpstreamDependency,
        "Upstream ETL failure",
    )]));
    let judge = arc(ScriptedJudge::passing());
    let engine = ContextEngine::new(Arc::clone(&adapter), None, ContextEngineConfig::default());

    InvestigationOrchestrator::new(
        adapter,
        llm,
        judge,
        Arc::new(engine),
        CircuitBreaker::new(CircuitBreakerConfig::default()),
        OrchestratorConfig::default(),
    )
}

async fn wait_for_terminal(service: &InvestigationService, id: &str) -> InvestigationStatus {
    for _ in 0..100 {
        if let Some(state) = service.get_state(id) {
            let status = state.status();
            if status.is_terminal() {
                return status;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("investigation {id} never reached a terminal state");
}

#[tokio::test]
async fn start_runs_to_completion_without_blocking() {
    let service = InvestigationService::new(scripted_orchestrator(), None);

    let id = service
        .start_investigation("tenant-1", sample_alert())
        .unwrap();
    // The call returned immediately; the state is already visible.
    assert!(service.get_state(&id).is_some());

    let status = wait_for_terminal(&service, &id).await;
    assert_eq!(status, InvestigationStatus::Completed);

    let finding = service.get_finding(&id).expect("terminal run has a finding");
    assert_eq!(finding.status, FindingStatus::Completed);
    assert_eq!(finding.investigation_id, id);
}

#[tokio::test]
async fn events_stream_is_restartable_by_sequence() {
    let service = InvestigationService::new(scripted_orchestrator(), None);
    let id = service
        .start_investigation("tenant-1", sample_alert())
        .unwrap();
    wait_for_terminal(&service, &id).await;

    let all = service.events_since(&id, None);
    assert!(all.len() >= 4);
    assert_eq!(all[0].event_type, EventType::InvestigationStarted);
    assert!(all.iter().any(|e| e.event_type == EventType::SynthesisCompleted));

    // Re-reading from a checkpoint yields exactly the tail.
    let tail = service.events_since(&id, Some(all[1].seq));
    assert_eq!(tail.len(), all.len() - 2);
    assert_eq!(tail[0].seq, all[2].seq);
}

#[tokio::test]
async fn subscribers_receive_live_events() {
    let service = InvestigationService::new(scripted_orchestrator(), None);
    let id = service
        .start_investigation("tenant-1", sample_alert())
        .unwrap();
    let mut receiver = service.subscribe(&id).expect("channel exists after start");

    let mut saw_terminal = false;
    for _ in 0..200 {
        match tokio::time::timeout(Duration::from_millis(100), receiver.recv()).await {
            Ok(Ok(event)) => {
                if event.event_type.is_terminal() {
                    saw_terminal = true;
                    break;
                }
            }
            Ok(Err(_)) | Err(_) => break,
        }
    }
    assert!(saw_terminal, "stream should end with a terminal event");
}

#[tokio::test]
async fn cancel_is_cooperative_and_unknown_ids_report_false() {
    let service = InvestigationService::new(scripted_orchestrator(), None);
    assert!(!service.cancel("inv-nope"));

    let id = service
        .start_investigation("tenant-1", sample_alert())
        .unwrap();
    assert!(service.cancel(&id));
    // Whatever the race outcome, the run still terminates.
    let status = wait_for_terminal(&service, &id).await;
    assert!(status.is_terminal());
}

#[tokio::test]
async fn negative_deviation_is_rejected() {
    let service = InvestigationService::new(scripted_orchestrator(), None);
    let mut alert = sample_alert();
    alert.deviation_pct = -1.0;
    assert!(service.start_investigation("tenant-1", alert).is_err());
}

#[tokio::test]
async fn store_round_trips_events_and_findings() {
    let store = SqliteEventStore::open("sqlite::memory:").await.unwrap();

    let state = crate::investigation::state::InvestigationState::new(
        "inv-042",
        "tenant-1",
        sample_alert(),
    )
    .append_event(crate::investigation::state::Event::now(
        EventType::InvestigationStarted,
        serde_json::json!({"dataset_id": "public.orders"}),
    ))
    .append_event(crate::investigation::state::Event::now(
        EventType::QuerySubmitted,
        serde_json::json!({"hypothesis_id": "h001", "query": "SELECT 1 LIMIT 1"}),
    ));

    for event in &state.events {
        store.append_event(&state.id, event).await.unwrap();
    }

    let loaded = store.load_events("inv-042").await.unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].event_type, EventType::InvestigationStarted);
    assert_eq!(loaded[1].seq, 1);
    assert_eq!(loaded[1].query(), Some("SELECT 1 LIMIT 1"));

    let finding = crate::models::Finding {
        investigation_id: "inv-042".to_string(),
        status: FindingStatus::Completed,
        root_cause: Some("upstream load failure".to_string()),
        confidence: 0.9,
        causal_chain: vec!["a".to_string(), "b".to_string()],
        estimated_onset: None,
        affected_scope: None,
        supporting_evidence: vec!["h001-e000".to_string()],
        recommendations: vec!["re-run the load".to_string()],
        duration_seconds: 1.5,
    };
    store.save_finding(&finding).await.unwrap();

    let loaded = store.load_finding("inv-042").await.unwrap().unwrap();
    assert_eq!(loaded, finding);
    assert!(store.load_finding("inv-missing").await.unwrap().is_none());
}

#[tokio::test]
async fn service_persists_through_the_store() {
    let store = SqliteEventStore::open("sqlite::memory:").await.unwrap();
    let service = InvestigationService::new(scripted_orchestrator(), Some(store));

    let id = service
        .start_investigation("tenant-1", sample_alert())
        .unwrap();
    wait_for_terminal(&service, &id).await;
    // The snapshot flips terminal before the last append commits.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let persisted = service.load_persisted_events(&id).await.unwrap();
    assert!(!persisted.is_empty());
    assert_eq!(persisted[0].event_type, EventType::InvestigationStarted);
    // The persisted log matches the in-memory one event for event.
    let live = service.events_since(&id, None);
    assert_eq!(persisted.len(), live.len());
}
