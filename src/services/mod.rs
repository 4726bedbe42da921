//! Service layer
//!
//! The pluggable adapter layers (data sources and lineage), the context
//! engine that combines them, and the LLM layer.

pub mod context;
pub mod datasource;
pub mod lineage;
pub mod llm;

pub use context::{ContextEngine, ContextEngineConfig};
pub use datasource::{
    adapter_registry, AdapterError, ApiAdapter, DataSourceAdapter, DocumentAdapter, ErrorCode,
    FileAdapter, SqlAdapter,
};
pub use lineage::{
    lineage_registry, CompositeLineageAdapter, LineageAdapter, LineageError,
    OpenLineageAdapter, SqlLineageParser, StaticSqlLineageAdapter,
};
pub use llm::{
    LlmClient, LlmError, LlmJudge, LlmProvider, OpenAiCompatClient, QualityJudge,
};
