//! LLM client
//!
//! The four typed operations the orchestrator needs, over any
//! OpenAI-compatible chat-completions API (OpenAI, Azure OpenAI, DeepSeek,
//! local gateways). The trait is what the core depends on; swap the
//! implementation for a different vendor without touching the orchestrator.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::{
    AnomalyAlert, Evidence, Hypothesis, HypothesisCategory, InvestigationContext, QueryResult,
    SupportVerdict,
};

use super::models::{
    extract_sql, parse_structured, HypothesisDraft, InterpretationResponse, LlmError, LlmProvider,
    SynthesisResponse,
};
use super::prompts;

/// Structured operations the orchestrator calls
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate up to `max_hypotheses` candidate explanations
    async fn generate_hypotheses(
        &self,
        alert: &AnomalyAlert,
        context: &InvestigationContext,
        max_hypotheses: usize,
    ) -> Result<Vec<Hypothesis>, LlmError>;

    /// Draft the next probe for a hypothesis, conditioned on what already
    /// ran, what failed, and an optional judge critique
    async fn generate_query(
        &self,
        alert: &AnomalyAlert,
        context: &InvestigationContext,
        hypothesis: &Hypothesis,
        prior_queries: &[String],
        prior_failures: &[String],
        critique: Option<&str>,
    ) -> Result<String, LlmError>;

    /// Interpret a probe result as evidence for or against the hypothesis
    async fn interpret_evidence(
        &self,
        alert: &AnomalyAlert,
        hypothesis: &Hypothesis,
        query: &str,
        result: &QueryResult,
    ) -> Result<Evidence, LlmError>;

    /// Synthesize all accepted evidence into a root-cause conclusion
    async fn synthesize_findings(
        &self,
        alert: &AnomalyAlert,
        context: &InvestigationContext,
        evidence: &[Evidence],
        critique: Option<&str>,
    ) -> Result<SynthesisResponse, LlmError>;
}

/// Client for OpenAI-compatible chat-completions APIs
pub struct OpenAiCompatClient {
    http_client: Client,
    provider: LlmProvider,
}

impl OpenAiCompatClient {
    pub fn new(provider: LlmProvider) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| LlmError::ApiError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http_client, provider })
    }

    /// One chat-completion round trip with a JSON response format
    async fn chat_completion(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        json_mode: bool,
    ) -> Result<String, LlmError> {
        if self.provider.api_key.is_empty() {
            return Err(LlmError::NotConfigured);
        }

        let chat_request = ChatCompletionRequest {
            model: self.provider.model_name.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: system_prompt.to_string() },
                ChatMessage { role: "user".to_string(), content: user_prompt.to_string() },
            ],
            max_tokens: Some(self.provider.max_tokens),
            temperature: Some(self.provider.temperature),
            response_format: json_mode
                .then(|| ResponseFormat { r#type: "json_object".to_string() }),
        };

        let url = format!("{}/chat/completions", self.provider.api_base.trim_end_matches('/'));
        tracing::debug!("calling LLM API: {} with model {}", url, self.provider.model_name);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.provider.api_key))
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(self.provider.timeout_seconds))
            .json(&chat_request)
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
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(LlmError::RateLimited(retry_after));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::ApiError(format!("API error {status}: {error_text}")));
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        if let Some(usage) = &chat_response.usage {
            tracing::debug!(
                "LLM usage: {} prompt + {} completion tokens",
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::ParseError("Empty response from LLM".to_string()))
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn generate_hypotheses(
        &self,
        alert: &AnomalyAlert,
        context: &InvestigationContext,
        max_hypotheses: usize,
    ) -> Result<Vec<Hypothesis>, LlmError> {
        let content = self
            .chat_completion(
                &prompts::hypotheses_system_prompt(max_hypotheses),
                &prompts::hypotheses_user_prompt(alert, context),
                true,
            )
            .await?;

        let drafts = parse_hypothesis_drafts(&content)?;
        Ok(drafts
            .into_iter()
            .take(max_hypotheses)
            .enumerate()
            .map(|(index, draft)| Hypothesis {
                id: if draft.id.is_empty() {
                    format!("h{:03}", index + 1)
                } else {
                    draft.id
                },
                title: draft.title,
                category: HypothesisCategory::parse_category(&draft.category),
                reasoning: draft.reasoning,
                suggested_query: draft.suggested_query,
            })
            .collect())
    }

    async fn generate_query(
        &self,
        alert: &AnomalyAlert,
        context: &InvestigationContext,
        hypothesis: &Hypothesis,
        prior_queries: &[String],
        prior_failures: &[String],
        critique: Option<&str>,
    ) -> Result<String, LlmError> {
        let content = self
            .chat_completion(
                &prompts::query_system_prompt(),
                &prompts::query_user_prompt(
                    alert,
                    context,
                    hypothesis,
                    prior_queries,
                    prior_failures,
                    critique,
                ),
                false,
            )
            .await?;

        let sql = extract_sql(&content);
        if sql.is_empty() {
            return Err(LlmError::ParseError("Model returned no SQL".to_string()));
        }
        Ok(sql)
    }

    async fn interpret_evidence(
        &self,
        alert: &AnomalyAlert,
        hypothesis: &Hypothesis,
        query: &str,
        result: &QueryResult,
    ) -> Result<Evidence, LlmError> {
        let content = self
            .chat_completion(
                &prompts::interpret_system_prompt(),
                &prompts::interpret_user_prompt(alert, hypothesis, query, result),
                true,
            )
            .await?;

        let response: InterpretationResponse = parse_structured(&content)?;
        Ok(Evidence {
            hypothesis_id: hypothesis.id.clone(),
            query: query.to_string(),
            result_summary: result.to_summary(5),
            row_count: result.row_count,
            supports_hypothesis: SupportVerdict::from_optional(response.supports_hypothesis),
            confidence: response.confidence.clamp(0.0, 1.0),
            interpretation: response.interpretation,
            causal_chain: response.causal_chain,
            key_findings: response.key_findings,
        })
    }

    async fn synthesize_findings(
        &self,
        alert: &AnomalyAlert,
        context: &InvestigationContext,
        evidence: &[Evidence],
        critique: Option<&str>,
    ) -> Result<SynthesisResponse, LlmError> {
        let content = self
            .chat_completion(
                &prompts::synthesize_system_prompt(),
                &prompts::synthesize_user_prompt(alert, context, evidence, critique),
                true,
            )
            .await?;

        let mut response: SynthesisResponse = parse_structured(&content)?;
        response.confidence = response.confidence.clamp(0.0, 1.0);
        Ok(response)
    }
}

/// Accept `{"hypotheses": [...]}` and a bare `[...]` alike
fn parse_hypothesis_drafts(content: &str) -> Result<Vec<HypothesisDraft>, LlmError> {
    #[derive(Deserialize)]
    struct Wrapper {
        hypotheses: Vec<HypothesisDraft>,
    }

    if let Ok(wrapper) = parse_structured::<Wrapper>(content) {
        return Ok(wrapper.hypotheses);
    }
    parse_structured::<Vec<HypothesisDraft>>(content)
}

// ============================================================================
// OpenAI API request/response types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: i64,
    completion_tokens: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drafts_parse_from_wrapper_and_bare_list() {
        let wrapped = r#"{"hypotheses": [{"id": "h1", "title": "T", "category": "data_quality", "reasoning": "R", "suggested_query": "SELECT 1"}]}"#;
        let drafts = parse_hypothesis_drafts(wrapped).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].id, "h1");

        let fenced_list = "```json\n[{\"id\": \"h1\", \"title\": \"T\", \"category\": \"upstream_dependency\", \"reasoning\": \"R\", \"suggested_query\": \"SELECT 1\"}]\n```";
        let drafts = parse_hypothesis_drafts(fenced_list).unwrap();
        assert_eq!(drafts[0].category, "upstream_dependency");
    }

    #[test]
    fn drafts_fail_without_json() {
        assert!(parse_hypothesis_drafts("no json here at all").is_err());
    }

    #[test]
    fn invalid_category_coerces_to_data_quality() {
        assert_eq!(
            HypothesisCategory::parse_category("invalid_cat"),
            HypothesisCategory::DataQuality
        );
    }
}
