//! Postgres driver — the richest of the four, since it is the primary
//! type exercised in integration tests.

use async_trait::async_trait;
use dashmap::DashMap;
use ragcore::{Column, ConnectionStatus, ConnectionTestResult, Error, Result, Schema, Table};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Column as _, PgPool, Row, TypeInfo};
use std::time::Instant;
use tracing::warn;

use super::{elapsed_ms, ConnectionDriver, DiscoveryOptions, QueryParams};

/// Lazily-created, per-connection-id pool cache.
#[derive(Default)]
pub struct PostgresDriver {
    pools: DashMap<String, PgPool>,
}

impl PostgresDriver {
    pub fn new() -> Self {
        Self::default()
    }

    async fn pool_for(&self, connection_id: &str, dsn: &str) -> Result<PgPool> {
        if let Some(pool) = self.pools.get(connection_id) {
            return Ok(pool.clone());
        }
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(dsn)
            .await
            .map_err(map_sqlx_err)?;
        self.pools.insert(connection_id.to_string(), pool.clone());
        Ok(pool)
    }
}

fn map_sqlx_err(err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::PoolTimedOut => Error::Timeout("postgres pool timed out".into()),
        other => Error::Upstream(format!("postgres error: {other}")),
    }
}

#[async_trait]
impl ConnectionDriver for PostgresDriver {
    async fn test(&self, connection_id: &str, dsn: &str) -> Result<ConnectionTestResult> {
        let start = Instant::now();
        let result = async {
            let pool = self.pool_for(connection_id, dsn).await?;
            sqlx::query("SELECT 1").execute(&pool).await.map_err(map_sqlx_err)?;
            Ok::<(), Error>(())
        }
        .await;
        let elapsed = elapsed_ms(start);
        match result {
            Ok(()) => Ok(ConnectionTestResult {
                status: ConnectionStatus::Active,
                elapsed_ms: elapsed,
                error: None,
            }),
            Err(e) => {
                // Open Question (c): record AND propagate — the registry
                // layer persists this Ok-shaped result from the Err arm too.
                Ok(ConnectionTestResult {
                    status: ConnectionStatus::Error,
                    elapsed_ms: elapsed,
                    error: Some(e.to_string()),
                })
            }
        }
    }

    async fn execute_query(
        &self,
        connection_id: &str,
        dsn: &str,
        statement: &str,
        params: QueryParams,
    ) -> Result<(Value, u64)> {
        let start = Instant::now();
        let pool = self.pool_for(connection_id, dsn).await?;
        let timeout = params.timeout.unwrap_or(std::time::Duration::from_secs(30));
        let (statement, bind_values) = params.resolve(statement, super::rewrite_named_postgres)?;

        let mut query = sqlx::query(&statement);
        for p in &bind_values {
            query = bind_json_param(query, p);
        }

        let fut = query.fetch_all(&pool);
        let rows = tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| Error::Timeout(format!("query on '{connection_id}' exceeded {timeout:?}")))?
            .map_err(map_sqlx_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut obj = serde_json::Map::new();
            for (i, col) in row.columns().iter().enumerate() {
                let value = row_value_to_json(row, i, col.type_info().name());
                obj.insert(col.name().to_string(), value);
            }
            out.push(Value::Object(obj));
        }
        Ok((Value::Array(out), elapsed_ms(start)))
    }

    async fn get_schema(
        &self,
        connection_id: &str,
        dsn: &str,
        options: DiscoveryOptions,
    ) -> Result<Schema> {
        let pool = self.pool_for(connection_id, dsn).await?;
        let namespaces = if options.schemas.is_empty() {
            vec!["public".to_string()]
        } else {
            options.schemas
        };

        let mut tables = Vec::new();
        for namespace in &namespaces {
            let table_rows = sqlx::query(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE'",
            )
            .bind(namespace)
            .fetch_all(&pool)
            .await
            .map_err(map_sqlx_err)?;

            for trow in table_rows {
                let table_name: String = trow.try_get("table_name").map_err(map_sqlx_err)?;
                if options.excluded_tables.contains(&table_name) {
                    continue;
                }

                let column_rows = sqlx::query(
                    "SELECT c.column_name, c.data_type, c.is_nullable, \
                            COALESCE(pk.is_pk, false) AS is_pk, \
                            fk.foreign_table, fk.foreign_column \
                     FROM information_schema.columns c \
                     LEFT JOIN ( \
                         SELECT kcu.column_name, true AS is_pk \
                         FROM information_schema.table_constraints tc \
                         JOIN information_schema.key_column_usage kcu \
                           ON tc.constraint_name = kcu.constraint_name \
                          AND tc.table_schema = kcu.table_schema \
                         WHERE tc.constraint_type = 'PRIMARY KEY' \
                           AND tc.table_schema = $1 AND tc.table_name = $2 \
                     ) pk ON pk.column_name = c.column_name \
                     LEFT JOIN ( \
                         SELECT kcu.column_name, \
                                ccu.table_name AS foreign_table, \
                                ccu.column_name AS foreign_column \
                         FROM information_schema.table_constraints tc \
                         JOIN information_schema.key_column_usage kcu \
                           ON tc.constraint_name = kcu.constraint_name \
                          AND tc.table_schema = kcu.table_schema \
                         JOIN information_schema.constraint_column_usage ccu \
                           ON tc.constraint_name = ccu.constraint_name \
                         WHERE tc.constraint_type = 'FOREIGN KEY' \
                           AND tc.table_schema = $1 AND tc.table_name = $2 \
                     ) fk ON fk.column_name = c.column_name \
                     WHERE c.table_schema = $1 AND c.table_name = $2 \
                     ORDER BY c.ordinal_position",
                )
                .bind(namespace)
                .bind(&table_name)
                .fetch_all(&pool)
                .await
                .map_err(map_sqlx_err)?;

                let mut columns = Vec::new();
                for crow in column_rows {
                    let name: String = crow.try_get("column_name").map_err(map_sqlx_err)?;
                    let data_type: String = crow.try_get("data_type").map_err(map_sqlx_err)?;
                    let nullable: String = crow.try_get("is_nullable").map_err(map_sqlx_err)?;
                    let is_pk: bool = crow.try_get("is_pk").unwrap_or(false);
                    let foreign_table: Option<String> = crow.try_get("foreign_table").ok();
                    let foreign_column: Option<String> = crow.try_get("foreign_column").ok();
                    let references = match (&foreign_table, &foreign_column) {
                        (Some(ft), Some(fc)) => Some(format!("{namespace}.{ft}.{fc}")),
                        _ => None,
                    };
                    columns.push(Column {
                        name,
                        data_type,
                        nullable: nullable == "YES",
                        primary_key: is_pk,
                        foreign_key: references.is_some(),
                        references,
                    });
                }

                tables.push(Table {
                    name: table_name,
                    schema_namespace: Some(namespace.clone()),
                    row_count: None,
                    description: None,
                    columns,
                    community: None,
                });
            }
        }

        let mut schema = Schema {
            connection_id: connection_id.to_string(),
            name: options.database.unwrap_or_else(|| connection_id.to_string()),
            db_type: "postgresql".to_string(),
            version: None,
            status: ragcore::SchemaStatus::Completed,
            discovery_date: Some(chrono::Utc::now()),
            vector_id: None,
            error: None,
            vectorization_error: None,
            tables,
            query_suggestions: Vec::new(),
        };
        schema.enforce_caps();
        Ok(schema)
    }
}

fn bind_json_param<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    value: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    match value {
        Value::String(s) => query.bind(s.clone()),
        Value::Number(n) if n.is_i64() => query.bind(n.as_i64()),
        Value::Number(n) => query.bind(n.as_f64()),
        Value::Bool(b) => query.bind(*b),
        Value::Null => query.bind(Option::<String>::None),
        other => {
            warn!(value = %other, "binding non-scalar query parameter as its JSON text");
            query.bind(other.to_string())
        }
    }
}

fn row_value_to_json(row: &sqlx::postgres::PgRow, idx: usize, type_name: &str) -> Value {
    match type_name {
        "INT2" | "INT4" | "INT8" => row
            .try_get::<i64, _>(idx)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
        "FLOAT4" | "FLOAT8" | "NUMERIC" => row
            .try_get::<f64, _>(idx)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
        "BOOL" => row
            .try_get::<bool, _>(idx)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<String, _>(idx)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
    }
}
