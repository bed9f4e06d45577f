// ABOUTME: Database client seam used by the event aggregator
// ABOUTME: Runs compiled SQL with text-bound values and returns rows as JSON maps

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::sql::CompiledQuery;

/// One result row keyed by column name.
pub type Row = Map<String, Value>;

/// Executes parameterized SQL against the source database.
///
/// `sql` uses `$1, $2, ...` placeholders matching `values` in order. Errors
/// are passed back to the caller unchanged.
#[async_trait]
pub trait QueryClient: Send + Sync {
    async fn query(&self, sql: &str, values: &[String]) -> Result<Vec<Row>>;

    async fn query_compiled(&self, compiled: &CompiledQuery) -> Result<Vec<Row>> {
        self.query(&compiled.sql, &compiled.values).await
    }
}

/// Reads a JSON value as an entity id. Strings are taken as is and integers
/// in decimal, so integer keys decoded from the database match the text ids
/// they were bound from. Anything else is not an id.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

/// Ids in `column` across `rows`, see [`id_string`].
pub fn string_column(rows: &[Row], column: &str) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row.get(column))
        .filter_map(id_string)
        .collect()
}
