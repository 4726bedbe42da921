//! Investigation service
//!
//! The facade collaborators call: start an investigation (non-blocking,
//! runs on the pool), snapshot its state, stream its events, cancel it.
//! Live state lives in a concurrent map; events and findings flow through
//! an optional durable store.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::models::{AnomalyAlert, Finding};
use crate::utils::error::{InvestigationError, InvestigationResult};

use super::orchestrator::{
    CancellationToken, EventSink, InvestigationOrchestrator,
};
use super::state::{Event, InvestigationState};
use super::store::SqliteEventStore;

const EVENT_CHANNEL_CAPACITY: usize = 256;

struct LiveInvestigation {
    state: InvestigationState,
    cancel: CancellationToken,
    finding: Option<Finding>,
}

/// Runs investigations on the tokio pool and exposes their state
pub struct InvestigationService {
    orchestrator: Arc<InvestigationOrchestrator>,
    investigations: Arc<DashMap<String, LiveInvestigation>>,
    channels: Arc<DashMap<String, broadcast::Sender<Event>>>,
    store: Option<Arc<SqliteEventStore>>,
}

/// Sink wiring orchestrator events into the live map, the broadcast
/// channel, and the durable store
struct ServiceSink {
    investigations: Arc<DashMap<String, LiveInvestigation>>,
    channels: Arc<DashMap<String, broadcast::Sender<Event>>>,
    store: Option<Arc<SqliteEventStore>>,
}

#[async_trait::async_trait]
impl EventSink for ServiceSink {
    async fn emit(&self, state: &InvestigationState, event: &Event) {
        if let Some(mut live) = self.investigations.get_mut(&state.id) {
            live.state = state.clone();
        }
        if let Some(sender) = self.channels.get(&state.id) {
            // Nobody listening is fine; the log is the source of truth.
            let _ = sender.send(event.clone());
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.append_event(&state.id, event).await {
                tracing::error!(id = %state.id, "event persistence failed: {}", e);
            }
        }
    }
}

impl InvestigationService {
    pub fn new(orchestrator: InvestigationOrchestrator, store: Option<SqliteEventStore>) -> Arc<Self> {
        let investigations = Arc::new(DashMap::new());
        let channels = Arc::new(DashMap::new());
        let store = store.map(Arc::new);

        let sink = Arc::new(ServiceSink {
            investigations: Arc::clone(&investigations),
            channels: Arc::clone(&channels),
            store: store.clone(),
        });

        Arc::new(Self {
            orchestrator: Arc::new(orchestrator.with_sink(sink)),
            investigations,
            channels,
            store,
        })
    }

    /// Start an investigation; returns immediately with its id.
    pub fn start_investigation(
        self: &Arc<Self>,
        tenant_id: &str,
        alert: AnomalyAlert,
    ) -> InvestigationResult<String> {
        if alert.deviation_pct < 0.0 {
            return Err(InvestigationError::fatal("deviation_pct must be non-negative"));
        }

        let investigation_id = format!("inv-{}", uuid::Uuid::new_v4());
        let state = InvestigationState::new(&investigation_id, tenant_id, alert);
        let cancel = CancellationToken::new();

        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        self.channels.insert(investigation_id.clone(), sender);
        self.investigations.insert(
            investigation_id.clone(),
            LiveInvestigation { state: state.clone(), cancel: cancel.clone(), finding: None },
        );

        let service = Arc::clone(self);
        let id = investigation_id.clone();
        tokio::spawn(async move {
            let (final_state, outcome) =
                service.orchestrator.run_investigation(state, cancel).await;

            let finding = match outcome {
                Ok(finding) => Some(finding),
                Err(_) => Some(Finding::failed(&id, final_state.elapsed_seconds())),
            };

            if let (Some(store), Some(finding)) = (&service.store, &finding) {
                if let Err(e) = store.save_finding(finding).await {
                    tracing::error!(id = %id, "finding persistence failed: {}", e);
                }
            }

            if let Some(mut live) = service.investigations.get_mut(&id) {
                live.state = final_state;
                live.finding = finding;
            }
        });

        Ok(investigation_id)
    }

    /// Snapshot of the current state, if the investigation is known
    pub fn get_state(&self, investigation_id: &str) -> Option<InvestigationState> {
        self.investigations
            .get(investigation_id)
            .map(|live| live.state.clone())
    }

    /// The terminal finding, once the investigation has one
    pub fn get_finding(&self, investigation_id: &str) -> Option<Finding> {
        self.investigations
            .get(investigation_id)
            .and_then(|live| live.finding.clone())
    }

    /// Events already recorded after `last_seq`, for restartable reads
    pub fn events_since(&self, investigation_id: &str, last_seq: Option<u64>) -> Vec<Event> {
        self.investigations
            .get(investigation_id)
            .map(|live| live.state.events_since(last_seq).to_vec())
            .unwrap_or_default()
    }

    /// Subscribe to new events. Combine with `events_since` to catch up,
    /// then read the channel until a terminal event arrives.
    pub fn subscribe(&self, investigation_id: &str) -> Option<broadcast::Receiver<Event>> {
        self.channels
            .get(investigation_id)
            .map(|sender| sender.subscribe())
    }

    /// Request cooperative cancellation; the run aborts at its next
    /// suspension point.
    pub fn cancel(&self, investigation_id: &str) -> bool {
        match self.investigations.get(investigation_id) {
            Some(live) => {
                live.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Reload an investigation's events from the durable store
    pub async fn load_persisted_events(
        &self,
        investigation_id: &str,
    ) -> InvestigationResult<Vec<Event>> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };
        store
            .load_events(investigation_id)
            .await
            .map_err(|e| InvestigationError::fatal(format!("event load failed: {e}")))
    }
}
