//! Shared test fixtures: scripted LLM client, scripted judge, and
//! ready-made alerts and schemas.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::models::{
    AnomalyAlert, AnomalyType, Evidence, Hypothesis, HypothesisCategory, InvestigationContext,
    MetricSpec, QueryResult, SchemaResponse, Severity, SupportVerdict,
};
use crate::services::llm::{
    InterpretationResponse, LlmClient, LlmError, QualityAssessment, QualityJudge,
    SynthesisResponse, ValidationResult,
};

/// The canonical alert: row_count on public.orders halved on 2024-01-15
pub fn sample_alert() -> AnomalyAlert {
    AnomalyAlert::new(
        "public.orders",
        MetricSpec::new(AnomalyType::RowCount),
        1000.0,
        500.0,
        50.0,
        NaiveDate::from_ymd_opt(2024, 1, 15).expect("valid date"),
        Severity::High,
    )
}

/// orders + users + payments schema used across the scenario tests
pub fn sample_schema() -> SchemaResponse {
    crate::services::datasource::mock::MockSqlAdapter::schema_of(&[
        (
            "public.orders",
            &[
                ("id", "integer"),
                ("user_id", "integer"),
                ("total", "numeric"),
                ("status", "varchar"),
                ("created_at", "timestamp"),
            ],
        ),
        (
            "public.users",
            &[("id", "integer"), ("email", "varchar"), ("created_at", "timestamp")],
        ),
    ])
}

pub fn hypothesis(id: &str, category: HypothesisCategory, title: &str) -> Hypothesis {
    Hypothesis {
        id: id.to_string(),
        title: title.to_string(),
        category,
        reasoning: "test reasoning".to_string(),
        suggested_query: "SELECT 1 LIMIT 100".to_string(),
    }
}

// ============================================================================
// Scripted LLM client
// ============================================================================

/// LLM client with scripted outputs and call accounting
pub struct ScriptedLlmClient {
    pub hypotheses: Vec<Hypothesis>,
    /// Queries handed out in order; the last one repeats when exhausted
    queries: Mutex<VecDeque<String>>,
    fallback_query: String,
    pub interpretation: Mutex<InterpretationResponse>,
    pub synthesis: Mutex<SynthesisResponse>,
    pub hypotheses_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    pub interpret_calls: AtomicUsize,
    pub synthesize_calls: AtomicUsize,
}

impl ScriptedLlmClient {
    pub fn new(hypotheses: Vec<Hypothesis>) -> Self {
        Self {
            hypotheses,
            queries: Mutex::new(VecDeque::new()),
            fallback_query: "SELECT COUNT(*) AS cnt FROM public.orders LIMIT 100".to_string(),
            interpretation: Mutex::new(InterpretationResponse {
                interpretation: "The row count confirms a 50% reduction.".to_string(),
                causal_chain: vec![
                    "upstream load failed".to_string(),
                    "rows missing".to_string(),
                    "count halved".to_string(),
                ],
                confidence: 0.9,
                key_findings: vec!["count=500 on 2024-01-15".to_string()],
                supports_hypothesis: Some(true),
            }),
            synthesis: Mutex::new(SynthesisResponse {
                root_cause: Some(
                    "Upstream ETL job for users failed, halving the orders load".to_string(),
                ),
                confidence: 0.9,
                causal_chain: vec!["ETL failure".to_string(), "orders halved".to_string()],
                estimated_onset: Some("2024-01-15T03:00:00Z".to_string()),
                affected_scope: Some("public.orders on 2024-01-15".to_string()),
                supporting_evidence: Vec::new(),
                recommendations: vec!["Re-run the users load for 2024-01-15".to_string()],
            }),
            hypotheses_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
            interpret_calls: AtomicUsize::new(0),
            synthesize_calls: AtomicUsize::new(0),
        }
    }

    /// Replace the query script
    pub fn with_queries(self, queries: &[&str]) -> Self {
        if let Ok(mut q) = self.queries.lock() {
            *q = queries.iter().map(|s| s.to_string()).collect();
        }
        self
    }

    /// Set the interpretation confidence for every probe
    pub fn with_confidence(self, confidence: f64) -> Self {
        if let Ok(mut i) = self.interpretation.lock() {
            i.confidence = confidence;
        }
        self
    }

    pub fn with_empty_synthesis(self) -> Self {
        if let Ok(mut s) = self.synthesis.lock() {
            s.root_cause = None;
            s.confidence = 0.0;
            s.recommendations = vec!["Unable to determine root cause".to_string()];
        }
        self
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn generate_hypotheses(
        &self,
        _alert: &AnomalyAlert,
        _context: &InvestigationContext,
        max_hypotheses: usize,
    ) -> Result<Vec<Hypothesis>, LlmError> {
        self.hypotheses_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.hypotheses.iter().take(max_hypotheses).cloned().collect())
    }

    async fn generate_query(
        &self,
        _alert: &AnomalyAlert,
        _context: &InvestigationContext,
        _hypothesis: &Hypothesis,
        _prior_queries: &[String],
        _prior_failures: &[String],
        _critique: Option<&str>,
    ) -> Result<String, LlmError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let mut queries = self
            .queries
            .lock()
            .map_err(|_| LlmError::ApiError("poisoned".to_string()))?;
        match queries.len() {
            0 => Ok(self.fallback_query.clone()),
            1 => Ok(queries.front().cloned().unwrap_or_else(|| self.fallback_query.clone())),
            _ => Ok(queries.pop_front().unwrap_or_else(|| self.fallback_query.clone())),
        }
    }

    async fn interpret_evidence(
        &self,
        _alert: &AnomalyAlert,
        hypothesis: &Hypothesis,
        query: &str,
        result: &QueryResult,
    ) -> Result<Evidence, LlmError> {
        self.interpret_calls.fetch_add(1, Ordering::SeqCst);
        let template = self
            .interpretation
            .lock()
            .map_err(|_| LlmError::ApiError("poisoned".to_string()))?
            .clone();
        Ok(Evidence {
            hypothesis_id: hypothesis.id.clone(),
            query: query.to_string(),
            result_summary: result.to_summary(5),
            row_count: result.row_count,
            supports_hypothesis: SupportVerdict::from_optional(template.supports_hypothesis),
            confidence: template.confidence,
            interpretation: template.interpretation,
            causal_chain: template.causal_chain,
            key_findings: template.key_findings,
        })
    }

    async fn synthesize_findings(
        &self,
        _alert: &AnomalyAlert,
        _context: &InvestigationContext,
        _evidence: &[Evidence],
        _critique: Option<&str>,
    ) -> Result<SynthesisResponse, LlmError> {
        self.synthesize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .synthesis
            .lock()
            .map_err(|_| LlmError::ApiError("poisoned".to_string()))?
            .clone())
    }
}

// ============================================================================
// Scripted judge
// ============================================================================

pub fn passing_assessment() -> QualityAssessment {
    QualityAssessment {
        causal_depth: 0.8,
        specificity: 0.7,
        actionability: 0.6,
        lowest_dimension: "actionability".to_string(),
        improvement_suggestion: "name the exact job and the command to re-run it".to_string(),
    }
}

pub fn failing_assessment() -> QualityAssessment {
    QualityAssessment {
        causal_depth: 0.2,
        specificity: 0.3,
        actionability: 0.2,
        lowest_dimension: "causal_depth".to_string(),
        improvement_suggestion: "explain the mechanism linking cause and symptom".to_string(),
    }
}

/// Judge with an optional script of verdicts; defaults to passing
pub struct ScriptedJudge {
    script: Mutex<VecDeque<ValidationResult>>,
    pub interpretation_calls: AtomicUsize,
    pub synthesis_calls: AtomicUsize,
}

impl ScriptedJudge {
    pub fn passing() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            interpretation_calls: AtomicUsize::new(0),
            synthesis_calls: AtomicUsize::new(0),
        }
    }

    /// Fail the first `n` interpretation validations, then pass
    pub fn failing_first(n: usize) -> Self {
        let judge = Self::passing();
        if let Ok(mut script) = judge.script.lock() {
            for _ in 0..n {
                script.push_back(ValidationResult {
                    passed: false,
                    assessment: failing_assessment(),
                });
            }
        }
        judge
    }

    fn next_verdict(&self) -> ValidationResult {
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or(ValidationResult { passed: true, assessment: passing_assessment() })
    }
}

#[async_trait]
impl QualityJudge for ScriptedJudge {
    async fn validate_interpretation(
        &self,
        _evidence: &Evidence,
        _hypothesis_title: &str,
        _query: &str,
    ) -> Result<ValidationResult, LlmError> {
        self.interpretation_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.next_verdict())
    }

    async fn validate_synthesis(
        &self,
        _synthesis: &SynthesisResponse,
        _alert_summary: &str,
    ) -> Result<ValidationResult, LlmError> {
        self.synthesis_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.next_verdict())
    }
}

/// Shorthand for Arc-wrapping fixture pieces
pub fn arc<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
