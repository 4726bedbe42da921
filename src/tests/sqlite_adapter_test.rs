//! SQLite adapter against a seeded in-memory database: discovery,
//! execution with bound parameters, statistics, and error mapping.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::models::{NormalizedType, SourceType, TableType};
use crate::services::datasource::sqlite::SqliteAdapter;
use crate::services::datasource::{DataSourceAdapter, ErrorCode, SqlAdapter};

async fn seeded_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    sqlx::query(
        "CREATE TABLE orders (
            id INTEGER PRIMARY KEY,
            user_id INTEGER,
            total REAL,
            status TEXT NOT NULL,
            created_at TEXT
        )",
    )
    .execute(&pool)
    .await
    .unwrap();

    sqlx::query("CREATE VIEW order_totals AS SELECT user_id, SUM(total) AS sum_total FROM orders GROUP BY user_id")
        .execute(&pool)
        .await
        .unwrap();

    for (id, user_id, total, status, created_at) in [
        (1, Some(10), 25.0, "paid", "2024-01-14"),
        (2, Some(10), 40.0, "paid", "2024-01-15"),
        (3, Some(11), 15.5, "pending", "2024-01-15"),
        (4, None, 99.0, "paid", "2024-01-15"),
    ] {
        sqlx::query("INSERT INTO orders (id, user_id, total, status, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(id)
            .bind(user_id)
            .bind(total)
            .bind(status)
            .bind(created_at)
            .execute(&pool)
            .await
            .unwrap();
    }

    pool
}

async fn adapter() -> SqliteAdapter {
    SqliteAdapter::from_pool(seeded_pool().await, "sqlite://memory-test")
}

#[tokio::test]
async fn schema_discovery_covers_tables_views_and_columns() {
    let adapter = adapter().await;
    let schema = adapter.get_schema(None).await.unwrap();

    assert_eq!(schema.source_type, SourceType::Sqlite);
    assert_eq!(schema.table_count(), 2);

    let orders = schema.find_table("orders").unwrap();
    assert_eq!(orders.table_type, TableType::Table);
    let id = orders.column("id").unwrap();
    assert_eq!(id.data_type, NormalizedType::Integer);
    assert!(id.is_primary_key);
    let status = orders.column("status").unwrap();
    assert_eq!(status.data_type, NormalizedType::String);
    assert!(!status.nullable);
    assert_eq!(orders.column("total").unwrap().data_type, NormalizedType::Float);

    let view = schema.find_table("order_totals").unwrap();
    assert_eq!(view.table_type, TableType::View);
}

#[tokio::test]
async fn schema_filter_excludes_views_and_matches_patterns() {
    let adapter = adapter().await;

    let filter = crate::models::SchemaFilter {
        include_views: false,
        ..crate::models::SchemaFilter::default()
    };
    let schema = adapter.get_schema(Some(&filter)).await.unwrap();
    assert_eq!(schema.table_count(), 1);

    let filter = crate::models::SchemaFilter::for_table("public.orders");
    let schema = adapter.get_schema(Some(&filter)).await.unwrap();
    // Qualified patterns match on the trailing segment.
    assert!(schema.find_table("orders").is_some());
}

#[tokio::test]
async fn execute_query_binds_parameters() {
    let adapter = adapter().await;
    let result = adapter
        .execute_query(
            "SELECT COUNT(*) AS cnt FROM orders WHERE created_at = ? AND status = ?",
            &[serde_json::json!("2024-01-15"), serde_json::json!("paid")],
            30,
            None,
        )
        .await
        .unwrap();

    assert_eq!(result.row_count, 1);
    assert_eq!(result.first_row_f64("cnt"), Some(2.0));
    assert!(result.execution_time_ms.is_some());
}

#[tokio::test]
async fn result_limit_marks_truncation() {
    let adapter = adapter().await;
    let result = adapter
        .execute_query("SELECT id FROM orders ORDER BY id", &[], 30, Some(2))
        .await
        .unwrap();

    assert!(result.truncated);
    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.columns[0].name, "id");
    assert_eq!(result.columns[0].data_type, NormalizedType::Integer);
}

#[tokio::test]
async fn count_preview_and_stats() {
    let adapter = adapter().await;

    assert_eq!(adapter.count_rows("orders").await.unwrap(), 4);

    let preview = adapter.preview("orders", 3).await.unwrap();
    assert_eq!(preview.rows.len(), 3);

    let stats = adapter
        .get_column_stats("orders", &["user_id".to_string(), "total".to_string()])
        .await
        .unwrap();
    let user_id = &stats["user_id"];
    assert_eq!(user_id.null_count, 1);
    assert!((user_id.null_rate - 0.25).abs() < 1e-9);
    assert_eq!(user_id.distinct_count, Some(2));
    let total = &stats["total"];
    assert_eq!(total.null_count, 0);
    assert_eq!(total.min_value.as_deref(), Some("15.5"));
}

#[tokio::test]
async fn missing_table_maps_to_table_not_found() {
    let adapter = adapter().await;
    let err = adapter
        .execute_query("SELECT * FROM nope LIMIT 1", &[], 30, None)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::TableNotFound);
    assert!(!err.retryable);
}

#[tokio::test]
async fn syntax_errors_map_with_a_query_preview() {
    let adapter = adapter().await;
    let err = adapter
        .execute_query("SELEC broken", &[], 30, None)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::QuerySyntaxError);
    assert!(err.details.contains_key("query_preview"));
}

#[tokio::test]
async fn test_connection_reports_version_and_latency() {
    let adapter = adapter().await;
    let result = adapter.test_connection().await.unwrap();
    assert!(result.success);
    assert!(result.server_version.is_some());
    assert!(result.latency_ms.is_some());
}
