//! Adapter error taxonomy
//!
//! A closed set of error codes shared by every adapter, whatever the engine
//! underneath. Each error knows whether the operation may be retried and,
//! when the source told us, how long to wait first.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standardized error codes for all adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Connection
    ConnectionFailed,
    ConnectionTimeout,
    AuthenticationFailed,
    SslError,
    // Permissions
    AccessDenied,
    InsufficientPermissions,
    // Query
    QuerySyntaxError,
    QueryTimeout,
    QueryCancelled,
    ResourceExhausted,
    // Rate limiting
    RateLimited,
    // Schema
    TableNotFound,
    ColumnNotFound,
    SchemaFetchFailed,
    // Configuration
    InvalidConfig,
    MissingRequiredField,
    // Internal
    NotImplemented,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionFailed => "CONNECTION_FAILED",
            Self::ConnectionTimeout => "CONNECTION_TIMEOUT",
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::SslError => "SSL_ERROR",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            Self::QuerySyntaxError => "QUERY_SYNTAX_ERROR",
            Self::QueryTimeout => "QUERY_TIMEOUT",
            Self::QueryCancelled => "QUERY_CANCELLED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::RateLimited => "RATE_LIMITED",
            Self::TableNotFound => "TABLE_NOT_FOUND",
            Self::ColumnNotFound => "COLUMN_NOT_FOUND",
            Self::SchemaFetchFailed => "SCHEMA_FETCH_FAILED",
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Error from any data-source adapter.
///
/// Construct through the per-code helpers so retryability stays consistent
/// across adapters.
#[derive(Debug, Clone, Error)]
#[error("[{}] {message}", code.as_str())]
pub struct AdapterError {
    pub code: ErrorCode,
    pub message: String,
    /// Structured context (table name, query preview, position, ...)
    pub details: serde_json::Map<String, serde_json::Value>,
    pub retryable: bool,
    pub retry_after_seconds: Option<u64>,
}

impl AdapterError {
    fn new(code: ErrorCode, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code,
            message: message.into(),
            details: serde_json::Map::new(),
            retryable,
            retry_after_seconds: None,
        }
    }

    fn with_detail(mut self, key: &str, value: serde_json::Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConnectionFailed, message, true)
    }

    pub fn connection_timeout(timeout_seconds: u64) -> Self {
        Self::new(
            ErrorCode::ConnectionTimeout,
            format!("Connection timed out after {timeout_seconds}s"),
            true,
        )
        .with_detail("timeout_seconds", serde_json::json!(timeout_seconds))
    }

    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthenticationFailed, message, false)
    }

    pub fn ssl_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SslError, message, false)
    }

    pub fn access_denied(resource: &str) -> Self {
        Self::new(ErrorCode::AccessDenied, format!("Access denied: {resource}"), false)
            .with_detail("resource", serde_json::json!(resource))
    }

    pub fn insufficient_permissions(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InsufficientPermissions, message, false)
    }

    pub fn query_syntax(message: impl Into<String>, query: &str, position: Option<u64>) -> Self {
        let preview: String = query.chars().take(200).collect();
        let mut err = Self::new(ErrorCode::QuerySyntaxError, message, false)
            .with_detail("query_preview", serde_json::json!(preview));
        if let Some(pos) = position {
            err = err.with_detail("position", serde_json::json!(pos));
        }
        err
    }

    pub fn query_timeout(timeout_seconds: u64) -> Self {
        Self::new(
            ErrorCode::QueryTimeout,
            format!("Query timed out after {timeout_seconds}s"),
            true,
        )
        .with_detail("timeout_seconds", serde_json::json!(timeout_seconds))
    }

    pub fn query_cancelled() -> Self {
        Self::new(ErrorCode::QueryCancelled, "Query was cancelled", true)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorCode::ResourceExhausted, message, true);
        err.retry_after_seconds = Some(60);
        err
    }

    pub fn rate_limited(retry_after_seconds: u64) -> Self {
        let mut err = Self::new(
            ErrorCode::RateLimited,
            format!("Rate limit exceeded, retry after {retry_after_seconds}s"),
            true,
        );
        err.retry_after_seconds = Some(retry_after_seconds);
        err
    }

    pub fn table_not_found(table_name: &str) -> Self {
        Self::new(ErrorCode::TableNotFound, format!("Table not found: {table_name}"), false)
            .with_detail("table_name", serde_json::json!(table_name))
    }

    pub fn column_not_found(column_name: &str, table_name: Option<&str>) -> Self {
        let mut err = Self::new(
            ErrorCode::ColumnNotFound,
            format!("Column not found: {column_name}"),
            false,
        )
        .with_detail("column_name", serde_json::json!(column_name));
        if let Some(table) = table_name {
            err = err.with_detail("table_name", serde_json::json!(table));
        }
        err
    }

    pub fn schema_fetch_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SchemaFetchFailed, message, true)
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfig, message, false)
    }

    pub fn missing_required_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("Missing required field: {field}"),
            false,
        )
        .with_detail("field", serde_json::json!(field))
    }

    pub fn not_implemented(feature: &str, adapter_type: &str) -> Self {
        Self::new(
            ErrorCode::NotImplemented,
            format!("Feature not implemented for {adapter_type}: {feature}"),
            false,
        )
        .with_detail("feature", serde_json::json!(feature))
        .with_detail("adapter_type", serde_json::json!(adapter_type))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message, false)
    }

    /// JSON shape used by API layers and the event log
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
                "details": if self.details.is_empty() { serde_json::Value::Null } else { serde_json::Value::Object(self.details.clone()) },
                "retryable": self.retryable,
                "retry_after_seconds": self.retry_after_seconds,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_the_code() {
        assert!(AdapterError::connection_failed("x").retryable);
        assert!(AdapterError::query_timeout(30).retryable);
        assert!(AdapterError::rate_limited(10).retryable);
        assert!(AdapterError::schema_fetch_failed("x").retryable);
        assert!(!AdapterError::authentication_failed("x").retryable);
        assert!(!AdapterError::access_denied("t").retryable);
        assert!(!AdapterError::table_not_found("t").retryable);
        assert!(!AdapterError::not_implemented("f", "a").retryable);
    }

    #[test]
    fn resource_exhausted_suggests_sixty_seconds() {
        let err = AdapterError::resource_exhausted("pool full");
        assert_eq!(err.retry_after_seconds, Some(60));
    }

    #[test]
    fn query_syntax_keeps_a_bounded_preview() {
        let long_query = "SELECT ".repeat(100);
        let err = AdapterError::query_syntax("bad", &long_query, Some(12));
        let preview = err.details.get("query_preview").unwrap().as_str().unwrap();
        assert!(preview.chars().count() <= 200);
        assert_eq!(err.details.get("position").unwrap(), 12);
    }

    #[test]
    fn json_shape_carries_code_and_retryability() {
        let err = AdapterError::rate_limited(30);
        let json = err.to_json();
        assert_eq!(json["error"]["code"], "RATE_LIMITED");
        assert_eq!(json["error"]["retryable"], true);
        assert_eq!(json["error"]["retry_after_seconds"], 30);
    }
}
