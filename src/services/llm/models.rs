//! LLM data models
//!
//! Provider settings, the typed response shapes of the four structured
//! operations, and the error taxonomy for model calls.

use serde::{Deserialize, Serialize};

/// LLM call errors
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("No LLM provider configured")]
    NotConfigured,

    #[error("LLM API error: {0}")]
    ApiError(String),

    #[error("LLM response parsing error: {0}")]
    ParseError(String),

    #[error("LLM timeout after {0}s")]
    Timeout(u64),

    #[error("LLM rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::RateLimited(_) | Self::ApiError(_))
    }
}

/// Provider connection settings for OpenAI-compatible APIs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProvider {
    /// API base, e.g. `https://api.openai.com/v1`
    pub api_base: String,
    pub model_name: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f64 {
    0.3
}
fn default_timeout() -> u64 {
    60
}

impl LlmProvider {
    pub fn new(
        api_base: impl Into<String>,
        model_name: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            api_base: api_base.into(),
            model_name: model_name.into(),
            api_key: api_key.into(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
        }
    }
}

// ============================================================================
// Structured response shapes
// ============================================================================

/// Raw hypothesis record as the model emits it; category still a string
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypothesisDraft {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub suggested_query: String,
}

/// Interpretation of one probe result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpretationResponse {
    pub interpretation: String,
    #[serde(default)]
    pub causal_chain: Vec<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub key_findings: Vec<String>,
    /// None when the model could not decide either way
    #[serde(default)]
    pub supports_hypothesis: Option<bool>,
}

fn default_confidence() -> f64 {
    0.5
}

/// Synthesis of all evidence into a root cause
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResponse {
    #[serde(default)]
    pub root_cause: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub causal_chain: Vec<String>,
    #[serde(default)]
    pub estimated_onset: Option<String>,
    #[serde(default)]
    pub affected_scope: Option<String>,
    #[serde(default)]
    pub supporting_evidence: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

// ============================================================================
// Free-text JSON extraction
// ============================================================================

/// Pull a JSON payload out of model text: a ```json fence, a bare fence,
/// or the first top-level `{...}` / `[...]` span.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim());
        }
    }
    if let Some(start) = text.find("```") {
        let rest = &text[start + 3..];
        if let Some(end) = rest.find("```") {
            let candidate = rest[..end].trim();
            if candidate.starts_with('{') || candidate.starts_with('[') {
                return Some(candidate);
            }
        }
    }

    // Bare JSON: widest span between the first opener and last closer.
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if end > start {
                return Some(text[start..=end].trim());
            }
        }
    }
    None
}

/// Parse a typed value out of model text, accepting fenced or bare JSON
pub fn parse_structured<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    // Strict parse first: JSON-mode responses are already bare objects.
    if let Ok(value) = serde_json::from_str::<T>(text.trim()) {
        return Ok(value);
    }
    let payload = extract_json(text)
        .ok_or_else(|| LlmError::ParseError("No JSON found in response".to_string()))?;
    serde_json::from_str(payload)
        .map_err(|e| LlmError::ParseError(format!("Failed to parse LLM response: {e}")))
}

/// Pull a SQL statement out of model text: a ```sql fence, a bare fence,
/// or the raw text itself.
pub fn extract_sql(text: &str) -> String {
    if let Some(start) = text.find("```sql") {
        let rest = &text[start + 6..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim().to_string();
        }
    }
    if let Some(start) = text.find("```") {
        let rest = &text[start + 3..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim().to_string();
        }
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\ndone";
        assert_eq!(extract_json(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn extracts_bare_json() {
        let text = "prefix [{\"a\": 1}] suffix";
        assert_eq!(extract_json(text), Some("[{\"a\": 1}]"));
    }

    #[test]
    fn no_json_is_none() {
        assert_eq!(extract_json("just prose"), None);
    }

    #[test]
    fn parse_structured_accepts_both_shapes() {
        let fenced: InterpretationResponse = parse_structured(
            "```json\n{\"interpretation\": \"x\", \"confidence\": 0.8, \"supports_hypothesis\": true}\n```",
        )
        .unwrap();
        assert!(fenced.supports_hypothesis.unwrap());

        let bare: InterpretationResponse = parse_structured(
            "{\"interpretation\": \"y\", \"confidence\": 0.2, \"supports_hypothesis\": false}",
        )
        .unwrap();
        assert!(!bare.supports_hypothesis.unwrap());
    }

    #[test]
    fn extract_sql_prefers_sql_fence() {
        let text = "Query:\n```sql\nSELECT * FROM users LIMIT 10\n```";
        assert_eq!(extract_sql(text), "SELECT * FROM users LIMIT 10");
        assert_eq!(extract_sql("```\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(extract_sql("SELECT id FROM t LIMIT 5"), "SELECT id FROM t LIMIT 5");
    }

    #[test]
    fn retryability() {
        assert!(LlmError::Timeout(10).is_retryable());
        assert!(LlmError::RateLimited(60).is_retryable());
        assert!(!LlmError::ParseError("x".to_string()).is_retryable());
    }
}
