//! Quality judge
//!
//! LLM-as-judge scoring of interpretations and syntheses on three fixed
//! dimensions: causal depth (50%), specificity (30%), actionability (20%).
//! A set-level assessment detects sycophantic confirmation: low variance
//! across the hypothesis set, or every interpretation scoring high, cuts
//! the adjusted score.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::Evidence;

use super::models::{parse_structured, LlmError, LlmProvider, SynthesisResponse};

/// Default pass threshold for the composite score
pub const DEFAULT_PASS_THRESHOLD: f64 = 0.6;

/// Dimensional quality scores from the judge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// Does the causal chain explain WHY, 0..=1
    pub causal_depth: f64,
    /// Are there concrete data points, 0..=1
    pub specificity: f64,
    /// Can someone act on the recommendations, 0..=1
    pub actionability: f64,
    /// Which dimension scored lowest
    pub lowest_dimension: String,
    /// How to improve the lowest dimension (at least 20 chars)
    pub improvement_suggestion: String,
}

impl QualityAssessment {
    /// Weighted composite used for pass/fail decisions
    pub fn composite_score(&self) -> f64 {
        self.causal_depth * 0.5 + self.specificity * 0.3 + self.actionability * 0.2
    }
}

/// Result of one validation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub assessment: QualityAssessment,
}

impl ValidationResult {
    /// Dimensional scores flattened for training pipelines
    pub fn training_signals(&self) -> serde_json::Value {
        serde_json::json!({
            "causal_depth": self.assessment.causal_depth,
            "specificity": self.assessment.specificity,
            "actionability": self.assessment.actionability,
            "composite": self.assessment.composite_score(),
        })
    }
}

/// Assessment of interpretation quality across the whole hypothesis set.
///
/// A good investigation discriminates: some hypotheses supported, others
/// refuted. Uniformly high scores mean the model is confirming rather
/// than testing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HypothesisSetAssessment {
    pub interpretations: Vec<QualityAssessment>,
}

impl HypothesisSetAssessment {
    pub fn new(interpretations: Vec<QualityAssessment>) -> Self {
        Self { interpretations }
    }

    /// Variance-based discrimination, clamped to [0, 1]; a variance of
    /// 0.1 or more across composites counts as fully discriminating.
    pub fn discrimination_score(&self) -> f64 {
        if self.interpretations.len() < 2 {
            return 1.0;
        }
        let composites: Vec<f64> =
            self.interpretations.iter().map(|i| i.composite_score()).collect();
        let mean = composites.iter().sum::<f64>() / composites.len() as f64;
        // Sample variance, matching a statistics-library default.
        let variance = composites.iter().map(|c| (c - mean).powi(2)).sum::<f64>()
            / (composites.len() - 1) as f64;
        (variance / 0.1).min(1.0)
    }

    /// 0.5 when every composite exceeds 0.7, else 1.0
    pub fn all_supporting_penalty(&self) -> f64 {
        if self.interpretations.is_empty() {
            return 1.0;
        }
        let high = self
            .interpretations
            .iter()
            .filter(|i| i.composite_score() > 0.7)
            .count();
        if high == self.interpretations.len() {
            0.5
        } else {
            1.0
        }
    }

    /// Mean composite, discounted for non-discrimination and uniform support
    pub fn adjusted_composite(&self) -> f64 {
        if self.interpretations.is_empty() {
            return 0.0;
        }
        let mean = self
            .interpretations
            .iter()
            .map(|i| i.composite_score())
            .sum::<f64>()
            / self.interpretations.len() as f64;
        mean * self.discrimination_score() * self.all_supporting_penalty()
    }
}

/// Quality gate the orchestrator consults after every interpretation and
/// after synthesis
#[async_trait]
pub trait QualityJudge: Send + Sync {
    async fn validate_interpretation(
        &self,
        evidence: &Evidence,
        hypothesis_title: &str,
        query: &str,
    ) -> Result<ValidationResult, LlmError>;

    async fn validate_synthesis(
        &self,
        synthesis: &SynthesisResponse,
        alert_summary: &str,
    ) -> Result<ValidationResult, LlmError>;
}

const JUDGE_SYSTEM_PROMPT: &str = r#"You evaluate root cause analysis quality on three dimensions.

## Causal Depth (50% weight)
Evaluate the causal_chain field:
- 0.0-0.2: Empty or just restates symptom ("NULLs exist")
- 0.3-0.4: Names a cause but no mechanism ("upstream issue")
- 0.5-0.6: Cause + effect but missing intermediate steps
- 0.7-0.8: Full chain but vague on timing/mechanism
- 0.9-1.0: Complete chain with timing ("ETL timeout at 03:14 -> stale table -> JOIN NULLs")

## Specificity (30% weight)
Evaluate key_findings and supporting_evidence:
- 0.0-0.2: No concrete data
- 0.3-0.4: Vague quantities ("many rows")
- 0.5-0.6: Some numbers but no timestamps
- 0.7-0.8: Numbers + timestamps OR entity names
- 0.9-1.0: Timestamps + counts + specific table/column names

## Actionability (20% weight)
Evaluate recommendations:
- 0.0-0.2: "Investigate the issue"
- 0.3-0.4: "Check the ETL job"
- 0.5-0.6: "Check the stg_users ETL job logs"
- 0.7-0.8: "Check CloudWatch for stg_users job failures around 03:14 UTC"
- 0.9-1.0: "Run: airflow trigger_dag stg_users --conf '{\"backfill\": true}'"

Be calibrated: most responses score 0.4-0.7. Reserve 0.9+ for exceptional quality.

Always identify the lowest_dimension and provide a specific improvement_suggestion
(at least 20 characters) that explains how to improve that dimension.

Respond with a JSON object:
{"causal_depth": 0.6, "specificity": 0.5, "actionability": 0.4,
 "lowest_dimension": "actionability", "improvement_suggestion": "..."}"#;

/// Judge backed by an OpenAI-compatible model
pub struct LlmJudge {
    http_client: Client,
    provider: LlmProvider,
    pass_threshold: f64,
}

impl LlmJudge {
    pub fn new(provider: LlmProvider, pass_threshold: f64) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| LlmError::ApiError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http_client, provider, pass_threshold })
    }

    async fn score(&self, prompt: String) -> Result<ValidationResult, LlmError> {
        if self.provider.api_key.is_empty() {
            return Err(LlmError::NotConfigured);
        }

        let url = format!("{}/chat/completions", self.provider.api_base.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.provider.model_name,
            "messages": [
                {"role": "system", "content": JUDGE_SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "max_tokens": 1024,
            "temperature": 0.0,
            "response_format": {"type": "json_object"},
        });

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.provider.api_key))
            .timeout(Duration::from_secs(self.provider.timeout_seconds))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.provider.timeout_seconds)
                } else {
                    LlmError::ApiError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::ApiError(format!("judge API error {status}: {text}")));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::ParseError("Empty judge response".to_string()))?;

        let assessment: QualityAssessment = parse_structured(content)?;
        Ok(ValidationResult {
            passed: assessment.composite_score() >= self.pass_threshold,
            assessment,
        })
    }
}

#[async_trait]
impl QualityJudge for LlmJudge {
    async fn validate_interpretation(
        &self,
        evidence: &Evidence,
        hypothesis_title: &str,
        query: &str,
    ) -> Result<ValidationResult, LlmError> {
        let prompt = format!(
            "Evaluate this interpretation:\n\n\
             HYPOTHESIS TESTED: {hypothesis_title}\n\
             QUERY RUN: {query}\n\n\
             RESPONSE:\n\
             - interpretation: {}\n\
             - causal_chain: {:?}\n\
             - confidence: {}\n\
             - key_findings: {:?}\n\
             - supports_hypothesis: {:?}\n\n\
             Score each dimension and identify what needs improvement.",
            evidence.interpretation,
            evidence.causal_chain,
            evidence.confidence,
            evidence.key_findings,
            evidence.supports_hypothesis,
        );
        self.score(prompt).await
    }

    async fn validate_synthesis(
        &self,
        synthesis: &SynthesisResponse,
        alert_summary: &str,
    ) -> Result<ValidationResult, LlmError> {
        let prompt = format!(
            "Evaluate this root cause analysis:\n\n\
             ORIGINAL ANOMALY: {alert_summary}\n\n\
             RESPONSE:\n\
             - root_cause: {:?}\n\
             - confidence: {}\n\
             - causal_chain: {}\n\
             - estimated_onset: {:?}\n\
             - affected_scope: {:?}\n\
             - supporting_evidence: {:?}\n\
             - recommendations: {:?}\n\n\
             Score each dimension and identify what needs improvement.",
            synthesis.root_cause,
            synthesis.confidence,
            synthesis.causal_chain.join(" -> "),
            synthesis.estimated_onset,
            synthesis.affected_scope,
            synthesis.supporting_evidence,
            synthesis.recommendations,
        );
        self.score(prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(cd: f64, sp: f64, act: f64) -> QualityAssessment {
        QualityAssessment {
            causal_depth: cd,
            specificity: sp,
            actionability: act,
            lowest_dimension: "actionability".to_string(),
            improvement_suggestion: "add a concrete command to run".to_string(),
        }
    }

    #[test]
    fn composite_is_weighted() {
        let a = assessment(1.0, 0.0, 0.0);
        assert!((a.composite_score() - 0.5).abs() < 1e-9);
        let b = assessment(0.8, 0.6, 0.4);
        assert!((b.composite_score() - (0.4 + 0.18 + 0.08)).abs() < 1e-9);
    }

    #[test]
    fn uniform_scores_have_zero_discrimination() {
        let set = HypothesisSetAssessment::new(vec![
            assessment(0.8, 0.8, 0.8),
            assessment(0.8, 0.8, 0.8),
            assessment(0.8, 0.8, 0.8),
            assessment(0.8, 0.8, 0.8),
        ]);
        assert!(set.discrimination_score() < 1e-9);
        assert!(set.adjusted_composite() < 1e-9);
    }

    #[test]
    fn varied_scores_discriminate_fully() {
        // Composites 0.9, 0.4, 0.2: sample variance 0.13, clamped to 1.0.
        let set = HypothesisSetAssessment::new(vec![
            assessment(0.9, 0.9, 0.9),
            assessment(0.4, 0.4, 0.4),
            assessment(0.2, 0.2, 0.2),
        ]);
        assert!((set.discrimination_score() - 1.0).abs() < 1e-9);
        assert!((set.all_supporting_penalty() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn all_high_scores_are_penalized() {
        let set = HypothesisSetAssessment::new(vec![
            assessment(0.9, 0.9, 0.9),
            assessment(0.8, 0.8, 0.8),
        ]);
        assert!((set.all_supporting_penalty() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn single_interpretation_is_not_penalized_for_variance() {
        let set = HypothesisSetAssessment::new(vec![assessment(0.6, 0.6, 0.6)]);
        assert!((set.discrimination_score() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_set_scores_zero() {
        let set = HypothesisSetAssessment::default();
        assert_eq!(set.adjusted_composite(), 0.0);
        assert_eq!(set.all_supporting_penalty(), 1.0);
    }
}
