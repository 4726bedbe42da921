//! Static SQL lineage provider
//!
//! Builds lineage from a fixed set of SQL definitions (dbt-style models,
//! view DDL, scheduled INSERTs) instead of a live catalog. Each definition
//! is parsed once at construction; lookups afterwards are in-memory.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::models::{
    ColumnLineage, Dataset, DatasetId, Job, JobType, LineageCapabilities, LineageEdge,
    LineageGraph, LineageProviderInfo, LineageProviderType,
};

use super::sql_parser::SqlLineageParser;
use super::{LineageAdapter, LineageResult};

/// One named SQL definition feeding the provider
#[derive(Debug, Clone)]
pub struct SqlDefinition {
    pub name: String,
    pub sql: String,
}

/// Lineage provider over parsed SQL definitions
pub struct StaticSqlLineageAdapter {
    platform: String,
    /// target dataset name -> (inputs, producing job)
    producers: HashMap<String, (Vec<String>, Job)>,
    /// column lineage keyed by (target dataset, column)
    columns: HashMap<(String, String), Vec<(String, String)>>,
}

impl StaticSqlLineageAdapter {
    pub fn new(platform: impl Into<String>, definitions: Vec<SqlDefinition>) -> Self {
        let platform = platform.into();
        let parser = SqlLineageParser::new();
        let mut producers = HashMap::new();
        let mut columns = HashMap::new();

        for definition in definitions {
            let parsed = parser.parse(&definition.sql);
            for output in &parsed.outputs {
                let job = Job {
                    id: format!("sql:{}", definition.name),
                    name: definition.name.clone(),
                    job_type: JobType::SqlQuery,
                    inputs: parsed
                        .inputs
                        .iter()
                        .map(|i| DatasetId::new(platform.clone(), i.clone()))
                        .collect(),
                    outputs: vec![DatasetId::new(platform.clone(), output.clone())],
                    schedule: None,
                    owners: Vec::new(),
                    extra: serde_json::Map::new(),
                };
                producers.insert(output.clone(), (parsed.inputs.clone(), job));

                for (column, sources) in &parsed.column_lineage {
                    columns.insert((output.clone(), column.clone()), sources.clone());
                }
            }
        }

        Self { platform, producers, columns }
    }

    fn dataset(&self, name: &str) -> Dataset {
        Dataset::from_id(DatasetId::new(self.platform.clone(), name))
    }
}

#[async_trait]
impl LineageAdapter for StaticSqlLineageAdapter {
    fn capabilities(&self) -> LineageCapabilities {
        LineageCapabilities {
            supports_column_lineage: true,
            supports_job_runs: false,
            supports_freshness: false,
            supports_search: true,
            supports_owners: false,
            supports_tags: false,
            max_upstream_depth: None,
            max_downstream_depth: None,
            is_realtime: false,
        }
    }

    fn provider_info(&self) -> LineageProviderInfo {
        LineageProviderInfo {
            provider: LineageProviderType::StaticSql,
            display_name: "Static SQL".to_string(),
            description: "Lineage parsed from SQL definitions".to_string(),
            capabilities: self.capabilities(),
        }
    }

    async fn get_dataset(&self, dataset_id: &DatasetId) -> LineageResult<Option<Dataset>> {
        let known = self.producers.contains_key(&dataset_id.name)
            || self
                .producers
                .values()
                .any(|(inputs, _)| inputs.contains(&dataset_id.name));
        Ok(known.then(|| self.dataset(&dataset_id.name)))
    }

    async fn get_upstream(
        &self,
        dataset_id: &DatasetId,
        depth: usize,
    ) -> LineageResult<Vec<Dataset>> {
        let graph = self.get_lineage_graph(dataset_id, depth, 0).await?;
        Ok(graph.upstream(dataset_id, depth).into_iter().cloned().collect())
    }

    async fn get_downstream(
        &self,
        dataset_id: &DatasetId,
        depth: usize,
    ) -> LineageResult<Vec<Dataset>> {
        let graph = self.get_lineage_graph(dataset_id, 0, depth).await?;
        Ok(graph.downstream(dataset_id, depth).into_iter().cloned().collect())
    }

    async fn get_lineage_graph(
        &self,
        dataset_id: &DatasetId,
        _upstream_depth: usize,
        _downstream_depth: usize,
    ) -> LineageResult<LineageGraph> {
        // The definition set is small; materialize every edge and let the
        // graph's depth-bounded traversals do the scoping.
        let mut graph = LineageGraph::new(dataset_id.clone());

        for (output, (inputs, job)) in &self.producers {
            let target = DatasetId::new(self.platform.clone(), output.clone());
            graph
                .datasets
                .entry(target.to_string())
                .or_insert_with(|| self.dataset(output));
            graph.jobs.insert(job.id.clone(), job.clone());

            for input in inputs {
                let source = DatasetId::new(self.platform.clone(), input.clone());
                graph
                    .datasets
                    .entry(source.to_string())
                    .or_insert_with(|| self.dataset(input));
                let mut edge = LineageEdge::new(source, target.clone());
                edge.job = Some(job.clone());
                graph.edges.push(edge);
            }
        }

        Ok(graph)
    }

    async fn get_column_lineage(
        &self,
        dataset_id: &DatasetId,
        column_name: &str,
    ) -> LineageResult<Vec<ColumnLineage>> {
        let key = (dataset_id.name.clone(), column_name.to_string());
        let Some(sources) = self.columns.get(&key) else {
            return Ok(Vec::new());
        };
        Ok(sources
            .iter()
            .map(|(table, column)| ColumnLineage {
                target_dataset: dataset_id.clone(),
                target_column: column_name.to_string(),
                source_dataset: DatasetId::new(self.platform.clone(), table.clone()),
                source_column: column.clone(),
                transformation: None,
                confidence: 0.8,
            })
            .collect())
    }

    async fn get_producing_job(&self, dataset_id: &DatasetId) -> LineageResult<Option<Job>> {
        Ok(self.producers.get(&dataset_id.name).map(|(_, job)| job.clone()))
    }

    async fn get_consuming_jobs(&self, dataset_id: &DatasetId) -> LineageResult<Vec<Job>> {
        Ok(self
            .producers
            .values()
            .filter(|(inputs, _)| inputs.contains(&dataset_id.name))
            .map(|(_, job)| job.clone())
            .collect())
    }

    async fn search_datasets(&self, query: &str, limit: usize) -> LineageResult<Vec<Dataset>> {
        let needle = query.to_lowercase();
        let mut names: Vec<&String> = self
            .producers
            .iter()
            .flat_map(|(output, (inputs, _))| std::iter::once(output).chain(inputs.iter()))
            .filter(|name| name.to_lowercase().contains(&needle))
            .collect();
        names.sort();
        names.dedup();
        Ok(names.into_iter().take(limit).map(|n| self.dataset(n)).collect())
    }

    async fn list_datasets(
        &self,
        platform: Option<&str>,
        _database: Option<&str>,
        _schema: Option<&str>,
        limit: usize,
    ) -> LineageResult<Vec<Dataset>> {
        if platform.is_some_and(|p| p != self.platform) {
            return Ok(Vec::new());
        }
        let mut names: Vec<&String> = self
            .producers
            .iter()
            .flat_map(|(output, (inputs, _))| std::iter::once(output).chain(inputs.iter()))
            .collect();
        names.sort();
        names.dedup();
        Ok(names.into_iter().take(limit).map(|n| self.dataset(n)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> StaticSqlLineageAdapter {
        StaticSqlLineageAdapter::new(
            "postgres",
            vec![
                SqlDefinition {
                    name: "build_orders".to_string(),
                    sql: "CREATE TABLE public.orders AS SELECT * FROM public.users u \
                          JOIN public.payments p ON u.id = p.user_id"
                        .to_string(),
                },
                SqlDefinition {
                    name: "build_summary".to_string(),
                    sql: "INSERT INTO public.order_summary SELECT * FROM public.orders".to_string(),
                },
            ],
        )
    }

    #[tokio::test]
    async fn upstream_follows_parsed_inputs() {
        let id = DatasetId::new("postgres", "public.orders");
        let upstream = provider().get_upstream(&id, 1).await.unwrap();
        let names: Vec<&str> = upstream.iter().map(|d| d.qualified_name.as_str()).collect();
        assert!(names.contains(&"public.users"));
        assert!(names.contains(&"public.payments"));
    }

    #[tokio::test]
    async fn downstream_and_consumers() {
        let id = DatasetId::new("postgres", "public.orders");
        let p = provider();
        let downstream = p.get_downstream(&id, 1).await.unwrap();
        assert_eq!(downstream[0].qualified_name, "public.order_summary");
        let consumers = p.get_consuming_jobs(&id).await.unwrap();
        assert_eq!(consumers.len(), 1);
        assert_eq!(consumers[0].name, "build_summary");
    }

    #[tokio::test]
    async fn producing_job_found() {
        let id = DatasetId::new("postgres", "public.orders");
        let job = provider().get_producing_job(&id).await.unwrap().unwrap();
        assert_eq!(job.name, "build_orders");
        assert_eq!(job.job_type, JobType::SqlQuery);
    }
}
