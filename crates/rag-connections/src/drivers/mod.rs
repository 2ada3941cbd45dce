//! Per-type driver dispatch.
//!
//! Each driver implements three verbs — `test`, `execute_query`,
//! `get_schema` — and is stateless per call except for an optional pooled
//! handle cache keyed by connection id.

mod mongodb_driver;
mod mysql_driver;
mod postgres_driver;
mod weaviate_driver;

pub use mongodb_driver::MongoDriver;
pub use mysql_driver::MySqlDriver;
pub use postgres_driver::PostgresDriver;
pub use weaviate_driver::WeaviateDriver;

use async_trait::async_trait;
use ragcore::{ConnectionTestResult, Error, Schema};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::ops::Range;
use std::time::Duration;

/// Parameters accepted by `execute_query`. Exactly one of `params`
/// (already positional) or `named` (named placeholders, rewritten to the
/// target dialect's positional syntax before binding) is populated.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub params: Vec<Value>,
    pub named: HashMap<String, Value>,
    pub timeout: Option<Duration>,
}

impl QueryParams {
    /// Resolves this call's parameters against `statement`. Positional
    /// params pass the statement through unchanged; named params are
    /// rewritten with `rewrite`, the dialect-specific rewriter.
    pub(crate) fn resolve(
        &self,
        statement: &str,
        rewrite: fn(&str, &HashMap<String, Value>) -> ragcore::Result<(String, Vec<Value>)>,
    ) -> ragcore::Result<(String, Vec<Value>)> {
        if self.named.is_empty() {
            Ok((statement.to_string(), self.params.clone()))
        } else {
            rewrite(statement, &self.named)
        }
    }
}

/// Finds every `:name` placeholder in `statement` outside string literals
/// and comments, in order of appearance. A doubled colon (Postgres's `::`
/// cast operator) is never mistaken for a placeholder start.
fn find_named_placeholders(statement: &str) -> Vec<(String, Range<usize>)> {
    let masked = crate::security::strip_sql_comments_and_strings(statement);
    let bytes = masked.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b':' {
            i += 1;
            continue;
        }
        if i + 1 < bytes.len() && bytes[i + 1] == b':' {
            i += 2;
            continue;
        }
        let start = i;
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j].is_ascii_alphabetic() || bytes[j] == b'_') {
            j += 1;
            while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
                j += 1;
            }
            out.push((masked[start + 1..j].to_string(), start..j));
            i = j;
        } else {
            i += 1;
        }
    }
    out
}

fn missing_param(name: &str) -> Error {
    Error::Validation(format!("missing value for named parameter ':{name}'"))
}

/// Rewrites named placeholders to Postgres-style `$1`, `$2`, ... . Bind
/// order is the order each distinct name first appears; a name repeated
/// later in the statement reuses its original bind position, matching how
/// Postgres lets a single `$n` be referenced more than once.
pub(crate) fn rewrite_named_postgres(
    statement: &str,
    named: &HashMap<String, Value>,
) -> ragcore::Result<(String, Vec<Value>)> {
    let occurrences = find_named_placeholders(statement);
    let mut order: Vec<String> = Vec::new();
    let mut rewritten = String::with_capacity(statement.len());
    let mut last = 0;
    for (name, range) in &occurrences {
        let idx = match order.iter().position(|n| n == name) {
            Some(idx) => idx,
            None => {
                order.push(name.clone());
                order.len() - 1
            }
        };
        rewritten.push_str(&statement[last..range.start]);
        rewritten.push_str(&format!("${}", idx + 1));
        last = range.end;
    }
    rewritten.push_str(&statement[last..]);

    let mut values = Vec::with_capacity(order.len());
    for name in &order {
        values.push(named.get(name).cloned().ok_or_else(|| missing_param(name))?);
    }
    Ok((rewritten, values))
}

/// Rewrites named placeholders to MySQL-style `?` markers, one per
/// occurrence — MySQL has no way to reference a bind position twice, so a
/// name repeated in the statement contributes its value once per use.
pub(crate) fn rewrite_named_mysql(
    statement: &str,
    named: &HashMap<String, Value>,
) -> ragcore::Result<(String, Vec<Value>)> {
    let occurrences = find_named_placeholders(statement);
    let mut rewritten = String::with_capacity(statement.len());
    let mut values = Vec::with_capacity(occurrences.len());
    let mut last = 0;
    for (name, range) in &occurrences {
        values.push(named.get(name).cloned().ok_or_else(|| missing_param(name))?);
        rewritten.push_str(&statement[last..range.start]);
        rewritten.push('?');
        last = range.end;
    }
    rewritten.push_str(&statement[last..]);
    Ok((rewritten, values))
}

/// Discovery options recognized by `get_schema`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiscoveryOptions {
    pub schemas: Vec<String>,
    pub excluded_tables: Vec<String>,
    pub excluded_collections: Vec<String>,
    pub database: Option<String>,
    pub sample_size: Option<u64>,
    /// Run the foreign-key insight pass once discovery completes, storing
    /// its `SchemaQuerySuggestion`s on the resulting Schema.
    pub analyze: bool,
}

/// A type-specific database driver.
#[async_trait]
pub trait ConnectionDriver: Send + Sync {
    /// Resolve credentials and ping the target, updating caller-visible status.
    async fn test(&self, connection_id: &str, dsn: &str) -> ragcore::Result<ConnectionTestResult>;

    /// Execute a single statement, bounded by `params.timeout`.
    async fn execute_query(
        &self,
        connection_id: &str,
        dsn: &str,
        statement: &str,
        params: QueryParams,
    ) -> ragcore::Result<(Value, u64)>;

    /// Extract structural metadata into a [`Schema`].
    async fn get_schema(
        &self,
        connection_id: &str,
        dsn: &str,
        options: DiscoveryOptions,
    ) -> ragcore::Result<Schema>;
}

pub(crate) fn elapsed_ms(start: std::time::Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn postgres_rewrite_orders_by_first_appearance() {
        let params = named(&[("id", Value::from(7)), ("status", Value::from("active"))]);
        let (statement, values) = rewrite_named_postgres(
            "SELECT * FROM orders WHERE status = :status AND id = :id",
            &params,
        )
        .unwrap();
        assert_eq!(statement, "SELECT * FROM orders WHERE status = $1 AND id = $2");
        assert_eq!(values, vec![Value::from("active"), Value::from(7)]);
    }

    #[test]
    fn postgres_rewrite_reuses_bind_position_for_repeated_name() {
        let params = named(&[("id", Value::from(7))]);
        let (statement, values) =
            rewrite_named_postgres("SELECT * FROM orders WHERE id = :id OR parent_id = :id", &params).unwrap();
        assert_eq!(statement, "SELECT * FROM orders WHERE id = $1 OR parent_id = $1");
        assert_eq!(values, vec![Value::from(7)]);
    }

    #[test]
    fn postgres_rewrite_ignores_double_colon_cast() {
        let params = named(&[("id", Value::from(7))]);
        let (statement, values) =
            rewrite_named_postgres("SELECT id::text FROM orders WHERE id = :id", &params).unwrap();
        assert_eq!(statement, "SELECT id::text FROM orders WHERE id = $1");
        assert_eq!(values, vec![Value::from(7)]);
    }

    #[test]
    fn mysql_rewrite_emits_one_placeholder_per_occurrence() {
        let params = named(&[("id", Value::from(7))]);
        let (statement, values) =
            rewrite_named_mysql("SELECT * FROM orders WHERE id = :id OR parent_id = :id", &params).unwrap();
        assert_eq!(statement, "SELECT * FROM orders WHERE id = ? OR parent_id = ?");
        assert_eq!(values, vec![Value::from(7), Value::from(7)]);
    }

    #[test]
    fn rewrite_rejects_statement_with_unbound_name() {
        let err = rewrite_named_postgres("SELECT * FROM orders WHERE id = :id", &HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn placeholder_inside_string_literal_is_not_rewritten() {
        let params = named(&[("id", Value::from(7))]);
        let (statement, values) = rewrite_named_postgres(
            "SELECT * FROM orders WHERE note = ':id' AND id = :id",
            &params,
        )
        .unwrap();
        assert_eq!(statement, "SELECT * FROM orders WHERE note = ':id' AND id = $1");
        assert_eq!(values, vec![Value::from(7)]);
    }
}
