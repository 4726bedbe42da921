//! SQL lineage parser
//!
//! Extracts table-level inputs and outputs from SQL statements (`CREATE
//! TABLE AS SELECT`, `CREATE VIEW`, `INSERT INTO`, `MERGE INTO ... USING`)
//! by parsing, with a regex fallback for SQL the parser cannot read.
//! Column-level lineage is best-effort: each output column expression maps
//! to the source column references it mentions.

use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::ast::{
    Expr, Join, ObjectName, Query, Select, SelectItem, SetExpr, Statement, TableFactor,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::collections::{BTreeSet, HashMap};

/// Result of parsing SQL for lineage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedLineage {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    /// Output column -> source `(table, column)` references
    pub column_lineage: HashMap<String, Vec<(String, String)>>,
}

/// Table-level lineage parser with a regex fallback
#[derive(Debug, Clone, Default)]
pub struct SqlLineageParser;

impl SqlLineageParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse one or more SQL statements and extract lineage
    pub fn parse(&self, sql: &str) -> ParsedLineage {
        match Parser::parse_sql(&GenericDialect {}, sql) {
            Ok(statements) => self.parse_statements(&statements),
            Err(e) => {
                tracing::debug!("sql parse failed, using regex fallback: {}", e);
                parse_with_regex(sql)
            }
        }
    }

    fn parse_statements(&self, statements: &[Statement]) -> ParsedLineage {
        let mut inputs: BTreeSet<String> = BTreeSet::new();
        let mut outputs: BTreeSet<String> = BTreeSet::new();
        let mut column_lineage = HashMap::new();

        for statement in statements {
            match statement {
                Statement::CreateTable { name, query, .. } => {
                    outputs.insert(object_name(name));
                    if let Some(query) = query {
                        collect_query_tables(query, &mut inputs);
                        collect_column_lineage(query, &mut column_lineage);
                    }
                }
                Statement::CreateView { name, query, .. } => {
                    outputs.insert(object_name(name));
                    collect_query_tables(query, &mut inputs);
                    collect_column_lineage(query, &mut column_lineage);
                }
                Statement::Insert { table_name, source, .. } => {
                    outputs.insert(object_name(table_name));
                    collect_query_tables(source, &mut inputs);
                    collect_column_lineage(source, &mut column_lineage);
                }
                Statement::Merge { table, source, .. } => {
                    collect_factor_tables(table, &mut outputs);
                    collect_factor_tables(source, &mut inputs);
                }
                Statement::Query(query) => {
                    collect_query_tables(query, &mut inputs);
                }
                _ => {}
            }
        }

        ParsedLineage {
            inputs: inputs.difference(&outputs).cloned().collect(),
            outputs: outputs.into_iter().collect(),
            column_lineage,
        }
    }
}

fn object_name(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|ident| ident.value.clone())
        .collect::<Vec<_>>()
        .join(".")
}

fn collect_query_tables(query: &Query, tables: &mut BTreeSet<String>) {
    // CTE names are aliases, not source tables; record them, recurse into
    // their bodies, then drop them from the collected set.
    let mut cte_names = Vec::new();
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            cte_names.push(cte.alias.name.value.clone());
            collect_query_tables(&cte.query, tables);
        }
    }

    collect_body_tables(&query.body, tables);

    for name in cte_names {
        tables.remove(&name);
    }
}

fn collect_body_tables(body: &SetExpr, tables: &mut BTreeSet<String>) {
    match body {
        SetExpr::Select(select) => collect_select_tables(select, tables),
        SetExpr::Query(query) => collect_query_tables(query, tables),
        SetExpr::SetOperation { left, right, .. } => {
            collect_body_tables(left, tables);
            collect_body_tables(right, tables);
        }
        _ => {}
    }
}

fn collect_select_tables(select: &Select, tables: &mut BTreeSet<String>) {
    for from in &select.from {
        collect_factor_tables(&from.relation, tables);
        for join in &from.joins {
            let Join { relation, .. } = join;
            collect_factor_tables(relation, tables);
        }
    }
}

fn collect_factor_tables(factor: &TableFactor, tables: &mut BTreeSet<String>) {
    match factor {
        TableFactor::Table { name, .. } => {
            tables.insert(object_name(name));
        }
        TableFactor::Derived { subquery, .. } => collect_query_tables(subquery, tables),
        TableFactor::NestedJoin { table_with_joins, .. } => {
            collect_factor_tables(&table_with_joins.relation, tables);
            for join in &table_with_joins.joins {
                collect_factor_tables(&join.relation, tables);
            }
        }
        _ => {}
    }
}

/// Best-effort column lineage over the top-level SELECT projection
fn collect_column_lineage(query: &Query, lineage: &mut HashMap<String, Vec<(String, String)>>) {
    let select = match query.body.as_ref() {
        SetExpr::Select(select) => select,
        _ => return,
    };

    // When exactly one source table is in scope, bare identifiers resolve to it.
    let mut from_tables = BTreeSet::new();
    collect_select_tables(select, &mut from_tables);
    let sole_table = if from_tables.len() == 1 {
        from_tables.iter().next().cloned()
    } else {
        None
    };

    for item in &select.projection {
        let (name, expr) = match item {
            SelectItem::UnnamedExpr(expr) => (expr_output_name(expr), expr),
            SelectItem::ExprWithAlias { expr, alias } => (Some(alias.value.clone()), expr),
            _ => continue,
        };
        let Some(name) = name else { continue };

        let mut sources = Vec::new();
        collect_column_refs(expr, sole_table.as_deref(), &mut sources);
        if !sources.is_empty() {
            lineage.insert(name, sources);
        }
    }
}

fn expr_output_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.clone()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.clone()),
        _ => None,
    }
}

fn collect_column_refs(expr: &Expr, sole_table: Option<&str>, out: &mut Vec<(String, String)>) {
    match expr {
        Expr::Identifier(ident) => {
            if let Some(table) = sole_table {
                out.push((table.to_string(), ident.value.clone()));
            }
        }
        Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
            let column = parts[parts.len() - 1].value.clone();
            let table = parts[..parts.len() - 1]
                .iter()
                .map(|i| i.value.clone())
                .collect::<Vec<_>>()
                .join(".");
            out.push((table, column));
        }
        Expr::BinaryOp { left, right, .. } => {
            collect_column_refs(left, sole_table, out);
            collect_column_refs(right, sole_table, out);
        }
        Expr::Function(function) => {
            for arg in &function.args {
                if let sqlparser::ast::FunctionArg::Unnamed(
                    sqlparser::ast::FunctionArgExpr::Expr(inner),
                ) = arg
                {
                    collect_column_refs(inner, sole_table, out);
                }
            }
        }
        Expr::Cast { expr, .. } | Expr::Nested(expr) => collect_column_refs(expr, sole_table, out),
        _ => {}
    }
}

// ============================================================================
// Regex fallback
// ============================================================================

static CREATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)CREATE\s+(?:OR\s+REPLACE\s+)?(?:TEMP(?:ORARY)?\s+)?(?:TABLE|VIEW)\s+(?:IF\s+NOT\s+EXISTS\s+)?([A-Za-z_][A-Za-z0-9_.]*)",
    )
    .expect("static regex")
});
static INSERT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)INSERT\s+(?:OVERWRITE\s+)?(?:INTO\s+)?([A-Za-z_][A-Za-z0-9_.]*)")
        .expect("static regex")
});
static MERGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)MERGE\s+INTO\s+([A-Za-z_][A-Za-z0-9_.]*)").expect("static regex"));
static FROM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)FROM\s+([A-Za-z_][A-Za-z0-9_.]*)").expect("static regex"));
static JOIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)JOIN\s+([A-Za-z_][A-Za-z0-9_.]*)").expect("static regex"));
static USING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)USING\s+([A-Za-z_][A-Za-z0-9_.]*)").expect("static regex"));

/// Fallback extraction for SQL the parser rejects. Handles the same
/// statement shapes, less robustly.
pub fn parse_with_regex(sql: &str) -> ParsedLineage {
    let normalized: String = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut inputs: BTreeSet<String> = BTreeSet::new();
    let mut outputs: BTreeSet<String> = BTreeSet::new();

    for caps in CREATE_RE.captures_iter(&normalized) {
        outputs.insert(caps[1].to_string());
    }
    for caps in INSERT_RE.captures_iter(&normalized) {
        outputs.insert(caps[1].to_string());
    }
    for caps in MERGE_RE.captures_iter(&normalized) {
        outputs.insert(caps[1].to_string());
    }
    for caps in FROM_RE.captures_iter(&normalized) {
        let table = caps[1].to_string();
        if !matches!(table.to_uppercase().as_str(), "SELECT" | "WHERE" | "GROUP" | "ORDER" | "HAVING")
        {
            inputs.insert(table);
        }
    }
    for caps in JOIN_RE.captures_iter(&normalized) {
        inputs.insert(caps[1].to_string());
    }
    for caps in USING_RE.captures_iter(&normalized) {
        inputs.insert(caps[1].to_string());
    }

    ParsedLineage {
        inputs: inputs.difference(&outputs).cloned().collect(),
        outputs: outputs.into_iter().collect(),
        column_lineage: HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctas_inputs_and_outputs() {
        let parsed = SqlLineageParser::new()
            .parse("CREATE TABLE analytics.daily AS SELECT * FROM raw.events e JOIN raw.users u ON e.user_id = u.id");
        assert_eq!(parsed.outputs, vec!["analytics.daily"]);
        assert!(parsed.inputs.contains(&"raw.events".to_string()));
        assert!(parsed.inputs.contains(&"raw.users".to_string()));
    }

    #[test]
    fn insert_into_select() {
        let parsed = SqlLineageParser::new()
            .parse("INSERT INTO warehouse.orders SELECT * FROM staging.orders");
        assert_eq!(parsed.outputs, vec!["warehouse.orders"]);
        assert_eq!(parsed.inputs, vec!["staging.orders"]);
    }

    #[test]
    fn merge_using() {
        let parsed = SqlLineageParser::new().parse(
            "MERGE INTO dim.users t USING staging.users s ON t.id = s.id \
             WHEN MATCHED THEN UPDATE SET t.email = s.email",
        );
        assert_eq!(parsed.outputs, vec!["dim.users"]);
        assert_eq!(parsed.inputs, vec!["staging.users"]);
    }

    #[test]
    fn cte_names_are_not_inputs() {
        let parsed = SqlLineageParser::new().parse(
            "CREATE VIEW v AS WITH recent AS (SELECT * FROM raw.events) SELECT * FROM recent",
        );
        assert_eq!(parsed.outputs, vec!["v"]);
        assert_eq!(parsed.inputs, vec!["raw.events"]);
    }

    #[test]
    fn output_removed_from_inputs() {
        let parsed = SqlLineageParser::new()
            .parse("INSERT INTO t SELECT * FROM t");
        assert_eq!(parsed.outputs, vec!["t"]);
        assert!(parsed.inputs.is_empty());
    }

    #[test]
    fn column_lineage_on_single_table() {
        let parsed = SqlLineageParser::new()
            .parse("CREATE TABLE out AS SELECT id, total AS amount FROM raw.orders");
        assert_eq!(
            parsed.column_lineage.get("id"),
            Some(&vec![("raw.orders".to_string(), "id".to_string())])
        );
        assert_eq!(
            parsed.column_lineage.get("amount"),
            Some(&vec![("raw.orders".to_string(), "total".to_string())])
        );
    }

    #[test]
    fn regex_fallback_handles_the_same_shapes() {
        let parsed = parse_with_regex(
            "CREATE TABLE a.b AS SELECT * FROM c.d JOIN e.f ON 1=1",
        );
        assert_eq!(parsed.outputs, vec!["a.b"]);
        assert!(parsed.inputs.contains(&"c.d".to_string()));
        assert!(parsed.inputs.contains(&"e.f".to_string()));
    }
}
