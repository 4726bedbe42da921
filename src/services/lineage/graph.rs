//! Lineage graph merging
//!
//! Union of datasets, jobs and edges across provider graphs, keyed by
//! stable id. Graphs arrive in priority order and the first writer wins,
//! so a higher-priority provider's representation of a dataset survives a
//! lower-priority duplicate.

use std::collections::HashSet;

use crate::models::LineageGraph;

/// Merge graphs in priority order (highest first). The root of the first
/// graph becomes the root of the merge.
pub fn merge_graphs(graphs: Vec<LineageGraph>) -> LineageGraph {
    let mut iter = graphs.into_iter();
    let mut merged = match iter.next() {
        Some(first) => first,
        None => return LineageGraph::new(crate::models::DatasetId::new("unknown", "")),
    };

    let mut edge_keys: HashSet<String> = merged
        .edges
        .iter()
        .map(|e| format!("{}->{}", e.source, e.target))
        .collect();

    for graph in iter {
        for (key, dataset) in graph.datasets {
            merged.datasets.entry(key).or_insert(dataset);
        }
        for (key, job) in graph.jobs {
            merged.jobs.entry(key).or_insert(job);
        }
        for edge in graph.edges {
            let key = format!("{}->{}", edge.source, edge.target);
            if edge_keys.insert(key) {
                merged.edges.push(edge);
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Dataset, DatasetId, LineageEdge, LineageGraph};

    fn graph_with(root: &str, datasets: &[(&str, &str)], edges: &[(&str, &str)]) -> LineageGraph {
        let mut graph = LineageGraph::new(DatasetId::new("pg", root));
        for (name, description) in datasets {
            let id = DatasetId::new("pg", *name);
            let mut ds = Dataset::from_id(id.clone());
            ds.description = Some(description.to_string());
            graph.datasets.insert(id.to_string(), ds);
        }
        for (source, target) in edges {
            graph.edges.push(LineageEdge::new(
                DatasetId::new("pg", *source),
                DatasetId::new("pg", *target),
            ));
        }
        graph
    }

    #[test]
    fn union_of_datasets_and_edges() {
        let a = graph_with("orders", &[("users", "from a")], &[("users", "orders")]);
        let b = graph_with("orders", &[("payments", "from b")], &[("payments", "orders")]);

        let merged = merge_graphs(vec![a, b]);

        assert_eq!(merged.datasets.len(), 2);
        assert_eq!(merged.edges.len(), 2);
    }

    #[test]
    fn first_graph_wins_on_conflicts() {
        let a = graph_with("orders", &[("users", "priority")], &[("users", "orders")]);
        let b = graph_with("orders", &[("users", "fallback")], &[("users", "orders")]);

        let merged = merge_graphs(vec![a, b]);

        assert_eq!(merged.datasets.len(), 1);
        assert_eq!(merged.edges.len(), 1);
        let users = merged.datasets.get("pg://users").unwrap();
        assert_eq!(users.description.as_deref(), Some("priority"));
    }

    #[test]
    fn traversal_terminates_on_cycles() {
        let graph = graph_with(
            "a",
            &[("a", ""), ("b", ""), ("c", "")],
            &[("a", "b"), ("b", "c"), ("c", "a")],
        );
        // Unbounded depth request over a 3-cycle must still terminate.
        let up = graph.upstream(&DatasetId::new("pg", "a"), 10);
        assert!(up.len() <= 3);
        let path = graph.find_path(&DatasetId::new("pg", "a"), &DatasetId::new("pg", "c"));
        assert_eq!(path.unwrap().len(), 2);
    }
}
