//! Composite lineage: priority precedence, deduplicated unions, and
//! failing providers never masking working ones.

use async_trait::async_trait;
use std::sync::Arc;

use crate::models::{
    Dataset, DatasetId, LineageCapabilities, LineageGraph, LineageProviderInfo,
    LineageProviderType,
};
use crate::services::lineage::{
    CompositeLineageAdapter, LineageAdapter, LineageError, LineageResult,
};

/// Provider returning a fixed upstream list, tagging datasets with its name
struct FixedUpstreamProvider {
    name: &'static str,
    upstream: Vec<&'static str>,
    fail: bool,
}

impl FixedUpstreamProvider {
    fn new(name: &'static str, upstream: Vec<&'static str>) -> Self {
        Self { name, upstream, fail: false }
    }

    fn failing(name: &'static str) -> Self {
        Self { name, upstream: Vec::new(), fail: true }
    }
}

#[async_trait]
impl LineageAdapter for FixedUpstreamProvider {
    fn capabilities(&self) -> LineageCapabilities {
        LineageCapabilities::default()
    }

    fn provider_info(&self) -> LineageProviderInfo {
        LineageProviderInfo {
            provider: LineageProviderType::StaticSql,
            display_name: self.name.to_string(),
            description: "test provider".to_string(),
            capabilities: LineageCapabilities::default(),
        }
    }

    async fn get_upstream(
        &self,
        _dataset_id: &DatasetId,
        _depth: usize,
    ) -> LineageResult<Vec<Dataset>> {
        if self.fail {
            return Err(LineageError::Http("provider down".to_string()));
        }
        Ok(self
            .upstream
            .iter()
            .map(|name| {
                let mut dataset = Dataset::from_id(DatasetId::new("pg", *name));
                dataset.description = Some(self.name.to_string());
                dataset
            })
            .collect())
    }

    async fn get_lineage_graph(
        &self,
        dataset_id: &DatasetId,
        _upstream_depth: usize,
        _downstream_depth: usize,
    ) -> LineageResult<LineageGraph> {
        if self.fail {
            return Err(LineageError::Http("provider down".to_string()));
        }
        let mut graph = LineageGraph::new(dataset_id.clone());
        for name in &self.upstream {
            let id = DatasetId::new("pg", *name);
            let mut dataset = Dataset::from_id(id.clone());
            dataset.description = Some(self.name.to_string());
            graph.datasets.insert(id.to_string(), dataset);
            graph
                .edges
                .push(crate::models::LineageEdge::new(id, dataset_id.clone()));
        }
        Ok(graph)
    }
}

fn root() -> DatasetId {
    DatasetId::new("pg", "orders")
}

#[tokio::test]
async fn precedence_merges_with_higher_priority_winning() {
    // Provider A (priority 10): upstream [X, Y]; provider B (priority 1): [Y, Z].
    let composite = CompositeLineageAdapter::new(vec![
        (
            Arc::new(FixedUpstreamProvider::new("A", vec!["X", "Y"])) as Arc<dyn LineageAdapter>,
            10,
        ),
        (
            Arc::new(FixedUpstreamProvider::new("B", vec!["Y", "Z"])) as Arc<dyn LineageAdapter>,
            1,
        ),
    ]);

    let upstream = composite.get_upstream(&root(), 1).await.unwrap();
    let names: Vec<&str> = upstream.iter().map(|d| d.name.as_str()).collect();

    assert_eq!(names, vec!["X", "Y", "Z"]);
    let y = upstream.iter().find(|d| d.name == "Y").unwrap();
    assert_eq!(y.description.as_deref(), Some("A"));
}

#[tokio::test]
async fn priority_order_is_independent_of_construction_order() {
    // Same providers, registered low-priority first.
    let composite = CompositeLineageAdapter::new(vec![
        (
            Arc::new(FixedUpstreamProvider::new("B", vec!["Y", "Z"])) as Arc<dyn LineageAdapter>,
            1,
        ),
        (
            Arc::new(FixedUpstreamProvider::new("A", vec!["X", "Y"])) as Arc<dyn LineageAdapter>,
            10,
        ),
    ]);

    let upstream = composite.get_upstream(&root(), 1).await.unwrap();
    let y = upstream.iter().find(|d| d.name == "Y").unwrap();
    assert_eq!(y.description.as_deref(), Some("A"));
}

#[tokio::test]
async fn failing_provider_does_not_mask_the_working_one() {
    let composite = CompositeLineageAdapter::new(vec![
        (Arc::new(FixedUpstreamProvider::failing("down")) as Arc<dyn LineageAdapter>, 10),
        (
            Arc::new(FixedUpstreamProvider::new("up", vec!["X"])) as Arc<dyn LineageAdapter>,
            1,
        ),
    ]);

    let upstream = composite.get_upstream(&root(), 1).await.unwrap();
    assert_eq!(upstream.len(), 1);
    assert_eq!(upstream[0].name, "X");
}

#[tokio::test]
async fn graphs_merge_as_unions() {
    let composite = CompositeLineageAdapter::new(vec![
        (
            Arc::new(FixedUpstreamProvider::new("A", vec!["X", "Y"])) as Arc<dyn LineageAdapter>,
            10,
        ),
        (
            Arc::new(FixedUpstreamProvider::new("B", vec!["Y", "Z"])) as Arc<dyn LineageAdapter>,
            1,
        ),
    ]);

    let graph = composite.get_lineage_graph(&root(), 3, 3).await.unwrap();

    assert_eq!(graph.datasets.len(), 3);
    // Y's representation comes from the higher-priority graph.
    let y = graph.datasets.get("pg://Y").unwrap();
    assert_eq!(y.description.as_deref(), Some("A"));
    // One edge per distinct source, no duplicate Y edge.
    assert_eq!(graph.edges.len(), 3);
}

#[tokio::test]
async fn unsupported_operations_return_empty() {
    let composite = CompositeLineageAdapter::new(vec![(
        Arc::new(FixedUpstreamProvider::new("A", vec!["X"])) as Arc<dyn LineageAdapter>,
        1,
    )]);

    assert!(composite.get_dataset(&root()).await.unwrap().is_none());
    assert!(composite.get_column_lineage(&root(), "id").await.unwrap().is_empty());
    assert!(composite.get_producing_job(&root()).await.unwrap().is_none());
    assert!(composite.get_recent_runs("job-1", 10).await.unwrap().is_empty());
}
