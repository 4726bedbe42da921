//! Lineage adapter layer
//!
//! The same pattern as the data-source layer, over lineage providers:
//! a uniform dataset/job/run/graph contract, a registry, and a composite
//! that merges several providers by priority. Operations a provider does
//! not support return empty values, never errors, so callers can ask
//! freely and merge what comes back.

pub mod composite;
pub mod graph;
pub mod openlineage;
pub mod registry;
pub mod sql_parser;
pub mod static_sql;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    ColumnLineage, Dataset, DatasetId, Job, JobRun, LineageCapabilities, LineageGraph,
    LineageProviderInfo,
};

pub use composite::CompositeLineageAdapter;
pub use graph::merge_graphs;
pub use openlineage::OpenLineageAdapter;
pub use registry::{lineage_registry, LineageRegistry};
pub use sql_parser::{ParsedLineage, SqlLineageParser};
pub use static_sql::StaticSqlLineageAdapter;

/// Error from a lineage provider
#[derive(Debug, Error)]
pub enum LineageError {
    #[error("lineage provider request failed: {0}")]
    Http(String),

    #[error("lineage provider returned an unreadable response: {0}")]
    Parse(String),

    #[error("invalid lineage provider config: {0}")]
    Config(String),
}

pub type LineageResult<T> = Result<T, LineageError>;

/// Contract implemented by every lineage provider.
///
/// Default bodies return empty so a provider only implements the
/// operations its capabilities declare.
#[async_trait]
pub trait LineageAdapter: Send + Sync {
    fn capabilities(&self) -> LineageCapabilities;

    fn provider_info(&self) -> LineageProviderInfo;

    async fn get_dataset(&self, _dataset_id: &DatasetId) -> LineageResult<Option<Dataset>> {
        Ok(None)
    }

    async fn get_upstream(
        &self,
        _dataset_id: &DatasetId,
        _depth: usize,
    ) -> LineageResult<Vec<Dataset>> {
        Ok(Vec::new())
    }

    async fn get_downstream(
        &self,
        _dataset_id: &DatasetId,
        _depth: usize,
    ) -> LineageResult<Vec<Dataset>> {
        Ok(Vec::new())
    }

    async fn get_lineage_graph(
        &self,
        dataset_id: &DatasetId,
        _upstream_depth: usize,
        _downstream_depth: usize,
    ) -> LineageResult<LineageGraph> {
        Ok(LineageGraph::new(dataset_id.clone()))
    }

    async fn get_column_lineage(
        &self,
        _dataset_id: &DatasetId,
        _column_name: &str,
    ) -> LineageResult<Vec<ColumnLineage>> {
        Ok(Vec::new())
    }

    async fn get_producing_job(&self, _dataset_id: &DatasetId) -> LineageResult<Option<Job>> {
        Ok(None)
    }

    async fn get_consuming_jobs(&self, _dataset_id: &DatasetId) -> LineageResult<Vec<Job>> {
        Ok(Vec::new())
    }

    async fn get_recent_runs(&self, _job_id: &str, _limit: usize) -> LineageResult<Vec<JobRun>> {
        Ok(Vec::new())
    }

    async fn search_datasets(&self, _query: &str, _limit: usize) -> LineageResult<Vec<Dataset>> {
        Ok(Vec::new())
    }

    async fn list_datasets(
        &self,
        _platform: Option<&str>,
        _database: Option<&str>,
        _schema: Option<&str>,
        _limit: usize,
    ) -> LineageResult<Vec<Dataset>> {
        Ok(Vec::new())
    }
}
