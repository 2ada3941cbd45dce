//! MySQL driver.

use async_trait::async_trait;
use dashmap::DashMap;
use ragcore::{Column, ConnectionStatus, ConnectionTestResult, Error, Result, Schema, Table};
use serde_json::{json, Value};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{Column as _, MySqlPool, Row};
use std::time::Instant;

use super::{elapsed_ms, ConnectionDriver, DiscoveryOptions, QueryParams};

#[derive(Default)]
pub struct MySqlDriver {
    pools: DashMap<String, MySqlPool>,
}

impl MySqlDriver {
    pub fn new() -> Self {
        Self::default()
    }

    async fn pool_for(&self, connection_id: &str, dsn: &str) -> Result<MySqlPool> {
        if let Some(pool) = self.pools.get(connection_id) {
            return Ok(pool.clone());
        }
        let pool = MySqlPoolOptions::new()
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
        sqlx::Error::PoolTimedOut => Error::Timeout("mysql pool timed out".into()),
        other => Error::Upstream(format!("mysql error: {other}")),
    }
}

#[async_trait]
impl ConnectionDriver for MySqlDriver {
    async fn test(&self, connection_id: &str, dsn: &str) -> Result<ConnectionTestResult> {
        let start = Instant::now();
        let result = async {
            let pool = self.pool_for(connection_id, dsn).await?;
            sqlx::query("SELECT 1").execute(&pool).await.map_err(map_sqlx_err)?;
            Ok::<(), Error>(())
        }
        .await;
        let elapsed = elapsed_ms(start);
        Ok(match result {
            Ok(()) => ConnectionTestResult {
                status: ConnectionStatus::Active,
                elapsed_ms: elapsed,
                error: None,
            },
            Err(e) => ConnectionTestResult {
                status: ConnectionStatus::Error,
                elapsed_ms: elapsed,
                error: Some(e.to_string()),
            },
        })
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
        let (statement, bind_values) = params.resolve(statement, super::rewrite_named_mysql)?;

        let mut query = sqlx::query(&statement);
        for p in &bind_values {
            query = match p {
                Value::String(s) => query.bind(s.clone()),
                Value::Number(n) if n.is_i64() => query.bind(n.as_i64()),
                Value::Number(n) => query.bind(n.as_f64()),
                Value::Bool(b) => query.bind(*b),
                _ => query.bind(p.to_string()),
            };
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
                let value = row
                    .try_get::<String, _>(i)
                    .map(|v| json!(v))
                    .unwrap_or(Value::Null);
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
        let database = options
            .database
            .clone()
            .ok_or_else(|| Error::Validation("mysql discovery requires 'database' option".into()))?;

        let table_rows = sqlx::query(
            "SELECT table_name FROM information_schema.tables WHERE table_schema = ?",
        )
        .bind(&database)
        .fetch_all(&pool)
        .await
        .map_err(map_sqlx_err)?;

        let mut tables = Vec::new();
        for trow in table_rows {
            let table_name: String = trow.try_get("table_name").map_err(map_sqlx_err)?;
            if options.excluded_tables.contains(&table_name) {
                continue;
            }

            let column_rows = sqlx::query(
                "SELECT c.column_name, c.data_type, c.is_nullable, \
                        c.column_key, k.referenced_table_name, k.referenced_column_name \
                 FROM information_schema.columns c \
                 LEFT JOIN information_schema.key_column_usage k \
                   ON k.table_schema = c.table_schema AND k.table_name = c.table_name \
                  AND k.column_name = c.column_name AND k.referenced_table_name IS NOT NULL \
                 WHERE c.table_schema = ? AND c.table_name = ? \
                 ORDER BY c.ordinal_position",
            )
            .bind(&database)
            .bind(&table_name)
            .fetch_all(&pool)
            .await
            .map_err(map_sqlx_err)?;

            let mut columns = Vec::new();
            for crow in column_rows {
                let name: String = crow.try_get("column_name").map_err(map_sqlx_err)?;
                let data_type: String = crow.try_get("data_type").map_err(map_sqlx_err)?;
                let nullable: String = crow.try_get("is_nullable").map_err(map_sqlx_err)?;
                let key: String = crow.try_get("column_key").unwrap_or_default();
                let ref_table: Option<String> = crow.try_get("referenced_table_name").ok();
                let ref_column: Option<String> = crow.try_get("referenced_column_name").ok();
                let references = match (&ref_table, &ref_column) {
                    (Some(t), Some(c)) => Some(format!("{database}.{t}.{c}")),
                    _ => None,
                };
                columns.push(Column {
                    name,
                    data_type,
                    nullable: nullable == "YES",
                    primary_key: key == "PRI",
                    foreign_key: references.is_some(),
                    references,
                });
            }

            tables.push(Table {
                name: table_name,
                schema_namespace: Some(database.clone()),
                row_count: None,
                description: None,
                columns,
                community: None,
            });
        }

        let mut schema = Schema {
            connection_id: connection_id.to_string(),
            name: database,
            db_type: "mysql".to_string(),
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
