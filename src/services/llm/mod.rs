//! LLM layer
//!
//! Typed, structured model calls behind vendor-neutral traits: the four
//! investigation operations (`LlmClient`) and the quality gate
//! (`QualityJudge`). The shipped implementations speak any
//! OpenAI-compatible chat-completions API.

pub mod client;
pub mod judge;
pub mod models;
pub mod prompts;

pub use client::{LlmClient, OpenAiCompatClient};
pub use judge::{
    HypothesisSetAssessment, LlmJudge, QualityAssessment, QualityJudge, ValidationResult,
    DEFAULT_PASS_THRESHOLD,
};
pub use models::{
    extract_json, extract_sql, parse_structured, HypothesisDraft, InterpretationResponse, LlmError,
    LlmProvider, SynthesisResponse,
};
