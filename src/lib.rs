//! Dataprobe
//!
//! Autonomous root-cause investigation of data-quality anomalies. Given an
//! anomaly alert, the core gathers schema and lineage context, asks a model
//! for candidate hypotheses, probes each one with validated read-only SQL
//! under strict budgets, scores every interpretation with a quality judge,
//! and synthesizes the evidence into a single finding.
//!
//! Transports, tenancy and credential storage live outside this crate; the
//! integration surface is [`InvestigationService`] plus the adapter and
//! lineage registries.

pub mod config;
pub mod investigation;
pub mod models;
pub mod safety;
pub mod services;
pub mod utils;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::Config;
pub use investigation::{
    CancellationToken, InvestigationOrchestrator, InvestigationService, InvestigationState,
    InvestigationStatus, OrchestratorConfig, SqliteEventStore,
};
pub use models::{AnomalyAlert, Evidence, Finding, FindingStatus, Hypothesis, HypothesisCategory};
pub use safety::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerTripped};
pub use services::context::ContextEngine;
pub use services::datasource::{adapter_registry, DataSourceAdapter, SqlAdapter};
pub use services::lineage::{lineage_registry, CompositeLineageAdapter, LineageAdapter};
pub use services::llm::{LlmClient, QualityJudge};
pub use utils::error::{InvestigationError, InvestigationResult};
