//! Investigation error taxonomy
//!
//! The outer error type joining the subsystem errors. What matters at this
//! level is the KIND of failure, because the orchestrator's reaction
//! differs: validation is never retried, retryable adapter errors consume
//! retry budget, breaker trips end a hypothesis or the investigation, and
//! anything fatal fails the run.

use thiserror::Error;

use crate::safety::{CircuitBreakerTripped, QueryValidationError};
use crate::services::datasource::AdapterError;
use crate::services::lineage::LineageError;
use crate::services::llm::LlmError;

/// Top-level error for investigation runs
#[derive(Debug, Error)]
pub enum InvestigationError {
    /// Bad SQL shape or identifier; never retried
    #[error(transparent)]
    Validation(#[from] QueryValidationError),

    /// Data-source failure; retryability is on the error itself
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// A budget tripped
    #[error(transparent)]
    CircuitBreaker(#[from] CircuitBreakerTripped),

    /// Model call failure
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Lineage provider failure during context gathering
    #[error(transparent)]
    Lineage(#[from] LineageError),

    /// The alert's dataset could not be located in the source schema
    #[error("Schema discovery failed: {0}")]
    SchemaDiscovery(String),

    /// Cooperative cancellation was requested
    #[error("Investigation cancelled")]
    Cancelled,

    /// Anything unhandled; the investigation fails
    #[error("Internal error: {0}")]
    Fatal(String),
}

impl InvestigationError {
    pub fn schema_discovery(message: impl Into<String>) -> Self {
        Self::SchemaDiscovery(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Short machine-readable kind for event payloads
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_query",
            Self::Adapter(_) => "adapter_error",
            Self::CircuitBreaker(_) => "circuit_breaker",
            Self::Llm(_) => "llm_error",
            Self::Lineage(_) => "lineage_error",
            Self::SchemaDiscovery(_) => "schema_discovery",
            Self::Cancelled => "cancelled",
            Self::Fatal(_) => "internal",
        }
    }
}

pub type InvestigationResult<T> = Result<T, InvestigationError>;
