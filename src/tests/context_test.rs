//! Context engine: correlation probes, time-series pattern detection,
//! upstream anomaly checks, and safe identifier handling, all against a
//! scripted adapter.

use std::sync::Arc;

use crate::models::{NormalizedType, PatternType, QueryResult, ResultColumn};
use crate::services::context::{ContextEngine, ContextEngineConfig};
use crate::services::datasource::mock::MockSqlAdapter;
use crate::services::datasource::SqlAdapter;
use crate::tests::common::{arc, sample_alert, sample_schema};
use crate::utils::error::InvestigationError;

fn multi_row_result(rows: Vec<serde_json::Value>) -> QueryResult {
    let rows: Vec<serde_json::Map<String, serde_json::Value>> = rows
        .into_iter()
        .filter_map(|row| match row {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();
    QueryResult {
        columns: vec![
            ResultColumn { name: "date".to_string(), data_type: NormalizedType::String },
            ResultColumn { name: "total_count".to_string(), data_type: NormalizedType::Integer },
        ],
        row_count: rows.len() as u64,
        truncated: false,
        execution_time_ms: Some(2),
        rows,
    }
}

fn scripted_adapter() -> Arc<MockSqlAdapter> {
    arc(
        MockSqlAdapter::new(sample_schema())
            .with_row(
                "LEFT JOIN public.users",
                serde_json::json!({
                    "source_count": 100,
                    "matched_count": 60,
                    "unmatched_count": 40,
                    "unmatched_rate": 40.0,
                }),
            )
            .with_response(
                "GROUP BY DATE(created_at)",
                multi_row_result(vec![
                    serde_json::json!({"date": "2024-01-12", "total_count": 1000, "null_count": 0, "null_rate": 0.0}),
                    serde_json::json!({"date": "2024-01-13", "total_count": 1000, "null_count": 0, "null_rate": 0.0}),
                    serde_json::json!({"date": "2024-01-14", "total_count": 1000, "null_count": 0, "null_rate": 0.0}),
                    serde_json::json!({"date": "2024-01-15", "total_count": 400, "null_count": 0, "null_rate": 0.0}),
                ]),
            )
            .with_row(
                "FROM public.users WHERE DATE(created_at)",
                serde_json::json!({"total": 1000, "null_count": 80, "null_rate": 8.0}),
            ),
    )
}

#[tokio::test]
async fn gather_assembles_the_full_context() {
    let adapter = scripted_adapter();
    let engine = ContextEngine::new(
        Arc::clone(&adapter) as Arc<dyn SqlAdapter>,
        None,
        ContextEngineConfig::default(),
    );

    let context = engine.gather(&sample_alert()).await.unwrap();

    // Correlation: 40% unmatched joins to users.
    assert_eq!(context.correlations.len(), 1);
    let correlation = &context.correlations[0];
    assert_eq!(correlation.related_table, "public.users");
    assert_eq!(correlation.correlation_type, "missing_reference");
    assert!((correlation.strength - 0.4).abs() < 1e-9);
    // The evidence query is replayable by hand: literal date, no holes.
    assert!(correlation.evidence_query.contains("'2024-01-15'"));
    assert!(!correlation.evidence_query.contains('?'));

    // Time series: volume dropped to 400 against a 1000 baseline.
    let pattern = context.pattern.as_ref().unwrap();
    assert_eq!(pattern.pattern_type, PatternType::Drop);
    assert_eq!(pattern.start_date, "2024-01-15");
    assert!((pattern.severity - 0.6).abs() < 1e-9);

    // Upstream anomaly: 8% nulls in the join column on the anomaly date.
    assert_eq!(context.upstream_anomalies.len(), 1);
    assert_eq!(context.upstream_anomalies[0].table, "public.users");
    assert!((context.upstream_anomalies[0].null_rate - 8.0).abs() < 1e-9);

    // Everything renders into the prompt.
    let prompt = context.to_prompt_string();
    assert!(prompt.contains("public.orders"));
    assert!(prompt.contains("CROSS-TABLE CORRELATIONS"));
    assert!(prompt.contains("UPSTREAM ANOMALIES"));
}

#[tokio::test]
async fn quiet_sources_produce_an_empty_but_valid_context() {
    let adapter = arc(MockSqlAdapter::new(sample_schema()));
    let engine = ContextEngine::new(
        Arc::clone(&adapter) as Arc<dyn SqlAdapter>,
        None,
        ContextEngineConfig::default(),
    );

    let context = engine.gather(&sample_alert()).await.unwrap();

    assert!(context.correlations.is_empty());
    assert!(context.pattern.is_none());
    assert!(context.upstream_anomalies.is_empty());
    assert!(context.lineage.is_none());
}

#[tokio::test]
async fn unknown_dataset_is_a_schema_discovery_error() {
    let adapter = arc(MockSqlAdapter::new(MockSqlAdapter::schema_of(&[(
        "public.shipments",
        &[("id", "integer")],
    )])));
    let engine = ContextEngine::new(
        Arc::clone(&adapter) as Arc<dyn SqlAdapter>,
        None,
        ContextEngineConfig::default(),
    );

    let err = engine.gather(&sample_alert()).await.unwrap_err();
    assert!(matches!(err, InvestigationError::SchemaDiscovery(_)));
}

#[tokio::test]
async fn hostile_metric_column_never_reaches_the_adapter() {
    let adapter = scripted_adapter();
    let engine = ContextEngine::new(
        Arc::clone(&adapter) as Arc<dyn SqlAdapter>,
        None,
        ContextEngineConfig::default(),
    );

    let mut alert = sample_alert();
    alert.metric_spec.column = Some("user_id; DROP TABLE public.orders".to_string());

    // Gathering still succeeds; the poisoned probe is skipped.
    let context = engine.gather(&alert).await.unwrap();
    assert!(context.pattern.is_none());
    for query in adapter.executed_queries() {
        assert!(!query.to_uppercase().contains("DROP"), "{query}");
    }
}
