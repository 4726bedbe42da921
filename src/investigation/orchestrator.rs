//! Investigation orchestrator
//!
//! Drives one investigation through gather -> hypothesize -> probe ->
//! interpret -> reflect -> synthesize. Every probe passes the safety
//! validator; every step consults the circuit breaker; every state change
//! is an event appended to the log and mirrored to the sink.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::models::{Evidence, Finding, FindingStatus, Hypothesis, InvestigationContext};
use crate::safety::{prepare_query, CircuitBreaker};
use crate::services::context::ContextEngine;
use crate::services::datasource::SqlAdapter;
use crate::services::llm::{
    HypothesisSetAssessment, LlmClient, QualityJudge, SynthesisResponse,
};
use crate::utils::error::{InvestigationError, InvestigationResult};

use super::state::{Event, EventType, InvestigationState};

/// Orchestrator tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_hypotheses")]
    pub max_hypotheses: usize,
    /// Probes one hypothesis may issue; the breaker holds its own ceiling
    #[serde(default = "default_max_queries_per_hypothesis")]
    pub max_queries_per_hypothesis: usize,
    #[serde(default = "default_max_retries_per_hypothesis")]
    pub max_retries_per_hypothesis: usize,
    #[serde(default = "default_query_timeout_seconds")]
    pub query_timeout_seconds: u64,
    /// Evidence at or above this confidence ends the hypothesis early
    #[serde(default = "default_high_confidence_threshold")]
    pub high_confidence_threshold: f64,
    /// Row ceiling injected into probes without a LIMIT
    #[serde(default = "default_row_limit")]
    pub row_limit: u64,
}

fn default_max_hypotheses() -> usize {
    5
}
fn default_max_queries_per_hypothesis() -> usize {
    3
}
fn default_max_retries_per_hypothesis() -> usize {
    2
}
fn default_query_timeout_seconds() -> u64 {
    30
}
fn default_high_confidence_threshold() -> f64 {
    0.85
}
fn default_row_limit() -> u64 {
    10_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_hypotheses: default_max_hypotheses(),
            max_queries_per_hypothesis: default_max_queries_per_hypothesis(),
            max_retries_per_hypothesis: default_max_retries_per_hypothesis(),
            query_timeout_seconds: default_query_timeout_seconds(),
            high_confidence_threshold: default_high_confidence_threshold(),
            row_limit: default_row_limit(),
        }
    }
}

/// Cooperative cancellation, checked before every suspension point
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Receives every appended event; fan-out point for persistence and
/// live subscribers.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, state: &InvestigationState, event: &Event);
}

/// Sink that drops everything; the default for embedded runs
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn emit(&self, _state: &InvestigationState, _event: &Event) {}
}

/// Outcome of one hypothesis loop iteration boundary
enum HypothesisOutcome {
    Finished,
    GlobalBudgetExhausted,
}

/// The hypothesis-test-interpret-reflect state machine
pub struct InvestigationOrchestrator {
    adapter: Arc<dyn SqlAdapter>,
    llm: Arc<dyn LlmClient>,
    judge: Arc<dyn QualityJudge>,
    context_engine: Arc<ContextEngine>,
    circuit_breaker: CircuitBreaker,
    config: OrchestratorConfig,
    sink: Arc<dyn EventSink>,
}

impl InvestigationOrchestrator {
    pub fn new(
        adapter: Arc<dyn SqlAdapter>,
        llm: Arc<dyn LlmClient>,
        judge: Arc<dyn QualityJudge>,
        context_engine: Arc<ContextEngine>,
        circuit_breaker: CircuitBreaker,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            adapter,
            llm,
            judge,
            context_engine,
            circuit_breaker,
            config,
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run one investigation to a terminal state. Always returns the final
    /// state; the finding is an error only for pre-hypothesis faults.
    pub async fn run_investigation(
        &self,
        state: InvestigationState,
        cancel: CancellationToken,
    ) -> (InvestigationState, InvestigationResult<Finding>) {
        let investigation_id = state.id.clone();
        tracing::info!(id = %investigation_id, dataset = %state.alert.dataset_id, "investigation starting");

        let started_data = json!({
            "dataset_id": state.alert.dataset_id,
            "anomaly_type": state.alert.anomaly_type.as_str(),
        });
        let state = self.emit(state, EventType::InvestigationStarted, started_data).await;

        match self.run_inner(state, &cancel).await {
            Ok((state, finding)) => {
                tracing::info!(
                    id = %investigation_id,
                    status = finding.status.as_str(),
                    confidence = finding.confidence,
                    "investigation finished"
                );
                (state, Ok(finding))
            }
            Err((state, error)) => {
                tracing::warn!(id = %investigation_id, error = %error, "investigation failed");
                let state = self
                    .emit(state, EventType::InvestigationFailed, json!({
                        "error": error.to_string(),
                        "kind": error.kind(),
                    }))
                    .await;
                (state, Err(error))
            }
        }
    }

    async fn run_inner(
        &self,
        state: InvestigationState,
        cancel: &CancellationToken,
    ) -> Result<(InvestigationState, Finding), (InvestigationState, InvestigationError)> {
        // Context gathering; any failure here fails the investigation.
        let mut state = state;
        self.checkpoint(&state, cancel).map_err(|e| (state.clone(), e))?;

        let context = match self.context_engine.gather(&state.alert).await {
            Ok(context) => context,
            Err(e) => return Err((state, e)),
        };
        if context.schema.is_empty() {
            let error = InvestigationError::schema_discovery(format!(
                "no usable tables for {}",
                state.alert.dataset_id
            ));
            return Err((state, error));
        }

        state = state.with_context(context.clone());
        state = self
            .emit(state, EventType::ContextGathered, json!({
                "table_count": context.schema.table_count(),
                "correlations": context.correlations.len(),
                "upstream_anomalies": context.upstream_anomalies.len(),
                "has_lineage": context.lineage.is_some(),
                "has_pattern": context.pattern.is_some(),
            }))
            .await;

        // Hypotheses; a model failure here is fatal, there is nothing to probe.
        self.checkpoint(&state, cancel).map_err(|e| (state.clone(), e))?;
        let hypotheses = match self
            .llm
            .generate_hypotheses(&state.alert, &context, self.config.max_hypotheses)
            .await
        {
            Ok(hypotheses) => hypotheses,
            Err(e) => return Err((state, e.into())),
        };

        for hypothesis in &hypotheses {
            state = self
                .emit(state, EventType::HypothesisGenerated, json!({
                    "hypothesis_id": hypothesis.id,
                    "title": hypothesis.title,
                    "category": hypothesis.category.as_str(),
                }))
                .await;
        }

        // Probe each hypothesis under the budgets.
        let mut evidence: Vec<Evidence> = Vec::new();
        let mut assessments = Vec::new();

        for hypothesis in hypotheses.iter().take(self.config.max_hypotheses) {
            self.checkpoint(&state, cancel).map_err(|e| (state.clone(), e))?;

            let (next_state, outcome) = self
                .investigate_hypothesis(state, &context, hypothesis, &mut evidence, &mut assessments, cancel)
                .await?;
            state = next_state;

            if matches!(outcome, HypothesisOutcome::GlobalBudgetExhausted) {
                tracing::info!("global budget exhausted, moving to synthesis");
                break;
            }
        }

        // Synthesis boundary: whatever evidence exists gets synthesized.
        self.checkpoint(&state, cancel).map_err(|e| (state.clone(), e))?;
        state = self
            .emit(state, EventType::SynthesisStarted, json!({
                "evidence_count": evidence.len(),
            }))
            .await;

        let (state, synthesis) = self.synthesize(state, &context, &evidence).await?;

        let set_assessment = HypothesisSetAssessment::new(assessments);
        let root_cause_found = synthesis.root_cause.is_some() && !evidence.is_empty();
        let duration = state.elapsed_seconds();

        let finding = Finding {
            investigation_id: state.id.clone(),
            status: if root_cause_found {
                FindingStatus::Completed
            } else {
                FindingStatus::Inconclusive
            },
            root_cause: synthesis.root_cause,
            confidence: synthesis.confidence,
            causal_chain: synthesis.causal_chain,
            estimated_onset: synthesis.estimated_onset,
            affected_scope: synthesis.affected_scope,
            supporting_evidence: if synthesis.supporting_evidence.is_empty() {
                evidence
                    .iter()
                    .enumerate()
                    .map(|(index, item)| item.evidence_id(index))
                    .collect()
            } else {
                synthesis.supporting_evidence
            },
            recommendations: synthesis.recommendations,
            duration_seconds: duration,
        };

        let state = self
            .emit(state, EventType::SynthesisCompleted, json!({
                "root_cause_found": root_cause_found,
                "confidence": finding.confidence,
                "discrimination_score": set_assessment.discrimination_score(),
                "adjusted_composite": set_assessment.adjusted_composite(),
                "finding": serde_json::to_value(&finding).unwrap_or(serde_json::Value::Null),
            }))
            .await;

        Ok((state, finding))
    }

    /// Probe one hypothesis until it yields high-confidence evidence, runs
    /// out of budget, or is abandoned.
    async fn investigate_hypothesis(
        &self,
        mut state: InvestigationState,
        context: &InvestigationContext,
        hypothesis: &Hypothesis,
        evidence: &mut Vec<Evidence>,
        assessments: &mut Vec<crate::services::llm::QualityAssessment>,
        cancel: &CancellationToken,
    ) -> Result<(InvestigationState, HypothesisOutcome), (InvestigationState, InvestigationError)>
    {
        let h = hypothesis.id.as_str();
        let mut critique: Option<String> = None;
        tracing::info!(hypothesis = h, title = %hypothesis.title, "investigating hypothesis");

        loop {
            self.checkpoint(&state, cancel).map_err(|e| (state.clone(), e))?;

            if state.get_hypothesis_query_count(h) >= self.config.max_queries_per_hypothesis {
                tracing::debug!(hypothesis = h, "orchestrator per-hypothesis query budget spent");
                return Ok((state, HypothesisOutcome::Finished));
            }

            if let Err(trip) = self.circuit_breaker.check(&state.events, Some(h)) {
                let global = trip.reason.is_global();
                state = self
                    .emit(state, EventType::CircuitBreakerTripped, json!({
                        "hypothesis_id": h,
                        "reason": trip.reason.as_str(),
                        "message": trip.message,
                    }))
                    .await;
                let outcome = if global {
                    HypothesisOutcome::GlobalBudgetExhausted
                } else {
                    state = self.abandon(state, h, trip.reason.as_str()).await;
                    HypothesisOutcome::Finished
                };
                return Ok((state, outcome));
            }

            // Draft the next probe, conditioned on history and critique.
            let draft = match self
                .llm
                .generate_query(
                    &state.alert,
                    context,
                    hypothesis,
                    &state.get_all_queries(h),
                    &state.get_failed_queries(h),
                    critique.as_deref(),
                )
                .await
            {
                Ok(sql) => sql,
                Err(e) => {
                    tracing::warn!(hypothesis = h, "query generation failed: {}", e);
                    state = self.abandon(state, h, "llm_error").await;
                    return Ok((state, HypothesisOutcome::Finished));
                }
            };

            // Safety gate; a rejection is a failed probe, not a crash.
            let sql = match prepare_query(&draft, self.config.row_limit) {
                Ok(sql) => sql,
                Err(e) => {
                    tracing::warn!(hypothesis = h, "probe rejected by validator: {}", e);
                    state = self
                        .emit(state, EventType::QueryFailed, json!({
                            "hypothesis_id": h,
                            "query": draft,
                            "reason": "invalid_query",
                            "message": e.to_string(),
                        }))
                        .await;
                    continue;
                }
            };

            // Duplicate probes trip the breaker before execution.
            if let Err(trip) = self.circuit_breaker.check_candidate(&state.events, h, &sql) {
                state = self
                    .emit(state, EventType::CircuitBreakerTripped, json!({
                        "hypothesis_id": h,
                        "reason": trip.reason.as_str(),
                        "message": trip.message,
                    }))
                    .await;
                let outcome = if trip.reason.is_global() {
                    HypothesisOutcome::GlobalBudgetExhausted
                } else {
                    state = self.abandon(state, h, trip.reason.as_str()).await;
                    HypothesisOutcome::Finished
                };
                return Ok((state, outcome));
            }

            state = self
                .emit(state, EventType::QuerySubmitted, json!({
                    "hypothesis_id": h,
                    "query": sql.clone(),
                }))
                .await;

            self.checkpoint(&state, cancel).map_err(|e| (state.clone(), e))?;
            let result = match self
                .adapter
                .execute_query(&sql, &[], self.config.query_timeout_seconds, Some(self.config.row_limit))
                .await
            {
                Ok(result) => {
                    state = self
                        .emit(state, EventType::QuerySucceeded, json!({
                            "hypothesis_id": h,
                            "query": sql.clone(),
                            "row_count": result.row_count,
                        }))
                        .await;
                    result
                }
                Err(e) => {
                    tracing::warn!(hypothesis = h, code = e.code.as_str(), "probe failed: {}", e);
                    let retryable = e.retryable;
                    state = self
                        .emit(state, EventType::QueryFailed, json!({
                            "hypothesis_id": h,
                            "query": sql.clone(),
                            "reason": e.code.as_str(),
                            "retryable": retryable,
                        }))
                        .await;
                    if retryable {
                        continue;
                    }
                    state = self.abandon(state, h, e.code.as_str()).await;
                    return Ok((state, HypothesisOutcome::Finished));
                }
            };

            // Interpret, then let the judge gate the interpretation.
            self.checkpoint(&state, cancel).map_err(|e| (state.clone(), e))?;
            let interpreted = match self
                .llm
                .interpret_evidence(&state.alert, hypothesis, &sql, &result)
                .await
            {
                Ok(interpreted) => interpreted,
                Err(e) => {
                    tracing::warn!(hypothesis = h, "interpretation failed: {}", e);
                    if state.get_retry_count(h) < self.config.max_retries_per_hypothesis {
                        critique = Some(format!("previous interpretation failed to parse: {e}"));
                        state = self
                            .emit(state, EventType::ReflexionAttempted, json!({
                                "hypothesis_id": h,
                                "reason": "interpretation_error",
                            }))
                            .await;
                        continue;
                    }
                    state = self.abandon(state, h, "interpretation_error").await;
                    return Ok((state, HypothesisOutcome::Finished));
                }
            };

            let verdict = match self
                .judge
                .validate_interpretation(&interpreted, &hypothesis.title, &sql)
                .await
            {
                Ok(verdict) => Some(verdict),
                Err(e) => {
                    // A broken judge must not sink otherwise good evidence.
                    tracing::warn!(hypothesis = h, "judge unavailable, accepting evidence: {}", e);
                    None
                }
            };

            let passed = verdict.as_ref().map(|v| v.passed).unwrap_or(true);
            if let Some(v) = &verdict {
                assessments.push(v.assessment.clone());
            }

            if passed {
                let confidence = interpreted.confidence;
                state = self
                    .emit(state, EventType::EvidenceRecorded, json!({
                        "hypothesis_id": h,
                        "confidence": confidence,
                        "supports_hypothesis": interpreted.supports_hypothesis,
                    }))
                    .await;
                evidence.push(interpreted);

                if confidence >= self.config.high_confidence_threshold {
                    tracing::debug!(hypothesis = h, confidence, "high confidence, stopping early");
                    return Ok((state, HypothesisOutcome::Finished));
                }
                critique = None;
                continue;
            }

            // Judge failed the interpretation: one bounded reflexion round.
            if state.get_retry_count(h) < self.config.max_retries_per_hypothesis {
                critique = verdict.map(|v| v.assessment.improvement_suggestion);
                state = self
                    .emit(state, EventType::ReflexionAttempted, json!({
                        "hypothesis_id": h,
                        "reason": "judge_rejected",
                    }))
                    .await;
                continue;
            }

            tracing::debug!(hypothesis = h, "reflexion budget spent, moving on");
            return Ok((state, HypothesisOutcome::Finished));
        }
    }

    /// Synthesize with one judge-critiqued retry at most
    async fn synthesize(
        &self,
        state: InvestigationState,
        context: &InvestigationContext,
        evidence: &[Evidence],
    ) -> Result<(InvestigationState, SynthesisResponse), (InvestigationState, InvestigationError)>
    {
        let first = match self
            .llm
            .synthesize_findings(&state.alert, context, evidence, None)
            .await
        {
            Ok(synthesis) => synthesis,
            Err(e) if e.is_retryable() => {
                tracing::warn!("synthesis failed, retrying once: {}", e);
                match self
                    .llm
                    .synthesize_findings(&state.alert, context, evidence, None)
                    .await
                {
                    Ok(synthesis) => synthesis,
                    Err(e) => return Err((state, e.into())),
                }
            }
            Err(e) => return Err((state, e.into())),
        };

        let verdict = self
            .judge
            .validate_synthesis(&first, &state.alert.summary())
            .await;

        match verdict {
            Ok(v) if !v.passed => {
                tracing::info!(
                    composite = v.assessment.composite_score(),
                    "synthesis below quality bar, re-synthesizing with critique"
                );
                match self
                    .llm
                    .synthesize_findings(
                        &state.alert,
                        context,
                        evidence,
                        Some(&v.assessment.improvement_suggestion),
                    )
                    .await
                {
                    Ok(second) => Ok((state, second)),
                    // The first synthesis stands if the retry breaks.
                    Err(e) => {
                        tracing::warn!("re-synthesis failed, keeping first: {}", e);
                        Ok((state, first))
                    }
                }
            }
            Ok(_) => Ok((state, first)),
            Err(e) => {
                tracing::warn!("synthesis judge unavailable: {}", e);
                Ok((state, first))
            }
        }
    }

    async fn abandon(
        &self,
        state: InvestigationState,
        hypothesis_id: &str,
        reason: &str,
    ) -> InvestigationState {
        self.emit(state, EventType::HypothesisAbandoned, json!({
            "hypothesis_id": hypothesis_id,
            "reason": reason,
        }))
        .await
    }

    async fn emit(
        &self,
        state: InvestigationState,
        event_type: EventType,
        data: serde_json::Value,
    ) -> InvestigationState {
        let next = state.append_event(Event::now(event_type, data));
        if let Some(event) = next.events.last() {
            self.sink.emit(&next, event).await;
        }
        next
    }

    fn checkpoint(
        &self,
        _state: &InvestigationState,
        cancel: &CancellationToken,
    ) -> InvestigationResult<()> {
        if cancel.is_cancelled() {
            return Err(InvestigationError::Cancelled);
        }
        Ok(())
    }

    /// The adapter in use, for callers that need direct access
    pub fn adapter(&self) -> &Arc<dyn SqlAdapter> {
        &self.adapter
    }
}
