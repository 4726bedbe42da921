//! Domain data model
//!
//! All types exchanged between the orchestrator, the adapter layers, the
//! context engine and the LLM client. Everything here is plain data:
//! construction-time frozen, serde-serializable, no I/O.

pub mod alert;
pub mod context;
pub mod datasource;
pub mod investigation;
pub mod lineage;

pub use alert::{AnomalyAlert, AnomalyType, MetricSpec, Severity};
pub use context::{Correlation, InvestigationContext, PatternType, TimeSeriesPattern, UpstreamAnomaly};
pub use datasource::{
    AdapterCapabilities, Catalog, Column, ColumnStats, ConfigField, ConfigFieldType, ConfigSchema,
    ConnectionTestResult, EnumOption, FieldGroup, NormalizedType, QueryLanguage, QueryResult,
    ResultColumn, SchemaFilter, SchemaInfo, SchemaResponse, SourceCategory, SourceType,
    SourceTypeDefinition, Table, TableType,
};
pub use investigation::{
    Evidence, Finding, FindingStatus, Hypothesis, HypothesisCategory, SupportVerdict,
};
pub use lineage::{
    ColumnLineage, Dataset, DatasetId, DatasetType, Job, JobRun, JobType, LineageCapabilities,
    LineageEdge, LineageGraph, LineageProviderInfo, LineageProviderType, RunStatus,
};
