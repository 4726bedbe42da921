//! SQL safety validator
//!
//! Every probe the orchestrator runs passes through here first. A query is
//! admitted only if it parses as exactly one SELECT statement (CTEs and
//! subqueries allowed) and carries a row limit. Matching is done on a real
//! parse, never on the raw text, so keywords inside strings, comments or
//! identifiers cannot trip or bypass the gate.

use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use thiserror::Error;

/// Default row ceiling injected when a query has no LIMIT
pub const DEFAULT_ROW_LIMIT: u64 = 10_000;

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    // Dotted chains of plain SQL identifiers; nothing else gets through.
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("identifier regex is valid")
});

/// Why a query was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    Empty,
    NotSelect,
    MissingLimit,
    ParseError,
    InvalidIdentifier,
}

/// Rejection from the safety validator. Never retried.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct QueryValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl QueryValidationError {
    fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

/// Admit a query iff it is a single read-only SELECT with a LIMIT.
///
/// The deny list (INSERT, UPDATE, DELETE, MERGE, DROP, TRUNCATE, ALTER,
/// CREATE, GRANT, REVOKE, EXEC, CALL, VACUUM, ANALYZE, COPY, ATTACH, ...)
/// falls out of the parse: any statement that is not `Statement::Query`
/// is rejected as not-SELECT, and anything the parser cannot read at all
/// is rejected as a parse error.
pub fn validate_query(sql: &str) -> Result<(), QueryValidationError> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(QueryValidationError::new(ValidationErrorKind::Empty, "Empty query"));
    }

    let statements = Parser::parse_sql(&GenericDialect {}, trimmed).map_err(|e| {
        QueryValidationError::new(ValidationErrorKind::ParseError, format!("Failed to parse SQL: {e}"))
    })?;

    if statements.is_empty() {
        return Err(QueryValidationError::new(ValidationErrorKind::Empty, "Empty query"));
    }
    if statements.len() > 1 {
        return Err(QueryValidationError::new(
            ValidationErrorKind::NotSelect,
            "Only SELECT statements allowed: multiple statements found",
        ));
    }

    let query = match &statements[0] {
        Statement::Query(query) => query,
        other => {
            return Err(QueryValidationError::new(
                ValidationErrorKind::NotSelect,
                format!("Only SELECT statements allowed, got: {}", statement_verb(other)),
            ));
        }
    };

    // The body must bottom out in SELECTs (set operations over selects are
    // fine, VALUES/INSERT-shaped bodies are not).
    if !body_is_select(&query.body) {
        return Err(QueryValidationError::new(
            ValidationErrorKind::NotSelect,
            "Only SELECT statements allowed",
        ));
    }

    if query.limit.is_none() && query.fetch.is_none() {
        return Err(QueryValidationError::new(
            ValidationErrorKind::MissingLimit,
            "Query must include a LIMIT clause",
        ));
    }

    Ok(())
}

fn body_is_select(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(_) => true,
        SetExpr::Query(inner) => body_is_select(&inner.body),
        SetExpr::SetOperation { left, right, .. } => body_is_select(left) && body_is_select(right),
        _ => false,
    }
}

fn statement_verb(statement: &Statement) -> &'static str {
    match statement {
        Statement::Insert { .. } => "INSERT",
        Statement::Update { .. } => "UPDATE",
        Statement::Delete { .. } => "DELETE",
        Statement::Merge { .. } => "MERGE",
        Statement::Drop { .. } => "DROP",
        Statement::Truncate { .. } => "TRUNCATE",
        Statement::AlterTable { .. } => "ALTER",
        Statement::CreateTable { .. } | Statement::CreateView { .. } => "CREATE",
        Statement::Grant { .. } => "GRANT",
        Statement::Revoke { .. } => "REVOKE",
        Statement::Copy { .. } => "COPY",
        Statement::Analyze { .. } => "ANALYZE",
        _ => "non-SELECT statement",
    }
}

/// Append `LIMIT n` when the query has none. The input must already have
/// passed `validate_query` up to the limit check.
pub fn add_limit_if_missing(sql: &str, limit: u64) -> String {
    let trimmed = sql.trim().trim_end_matches(';').trim_end();

    let has_limit = Parser::parse_sql(&GenericDialect {}, trimmed)
        .ok()
        .and_then(|statements| statements.into_iter().next())
        .map(|statement| match statement {
            Statement::Query(query) => query.limit.is_some() || query.fetch.is_some(),
            _ => false,
        })
        .unwrap_or(false);

    if has_limit {
        trimmed.to_string()
    } else {
        format!("{trimmed} LIMIT {limit}")
    }
}

/// Validate and bound a probe in one step; the orchestrator's entry point.
pub fn prepare_query(sql: &str, limit: u64) -> Result<String, QueryValidationError> {
    let bounded = add_limit_if_missing(sql, limit);
    validate_query(&bounded)?;
    Ok(bounded)
}

/// Admit only plain dotted identifiers; used when building dynamic FROM
/// clauses in correlation probes.
pub fn sanitize_identifier(name: &str) -> Result<&str, QueryValidationError> {
    if name.is_empty() {
        return Err(QueryValidationError::new(
            ValidationErrorKind::InvalidIdentifier,
            "Empty identifier",
        ));
    }
    if !IDENTIFIER_RE.is_match(name) {
        return Err(QueryValidationError::new(
            ValidationErrorKind::InvalidIdentifier,
            format!("Invalid identifier: {name}"),
        ));
    }
    Ok(name)
}
